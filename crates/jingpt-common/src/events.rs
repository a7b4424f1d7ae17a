//! Frames streamed to the chat UI while a request is orchestrated.
//!
//! Each frame is one JSON object on the wire, tagged by `type`. A stream is
//! any number of `status` and `progress` frames followed by exactly one
//! `final` frame.

use serde::{Deserialize, Serialize};

use crate::chat::ContentBlock;
use crate::tools::DocumentRef;

/// Why an orchestration run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum StopReason {
    /// The model answered without requesting more tools.
    Completed,
    /// The round cap was reached while the model still wanted tools.
    RoundLimit,
    /// The run failed before producing an answer.
    Error,
}

/// The final answer of a run, as returned by the non-streaming endpoint
/// and embedded in the `final` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAnswer {
    /// Answer content, always at least one non-empty text block.
    pub content: Vec<ContentBlock>,
    /// Documents the answer drew on, deduplicated by URL.
    pub citations: Vec<DocumentRef>,
    /// Number of tool rounds that ran.
    pub rounds: usize,
    /// How the run ended.
    pub stop_reason: StopReason,
}

/// One server-sent event frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum StreamFrame {
    /// A human-readable status line, e.g. `Searching SharePoint for "Acme"`.
    Status {
        /// The status text.
        message: String,
    },

    /// A tool call finished.
    Progress {
        /// The current round, starting at 1.
        round: usize,
        /// The configured round cap.
        max_rounds: usize,
        /// The tool that finished.
        tool: String,
        /// Whether it succeeded.
        success: bool,
    },

    /// The answer. Always the last frame of a stream.
    Final {
        /// The answer itself.
        #[serde(flatten)]
        answer: ChatAnswer,
        /// Set when the run failed; the content is then a generic apology.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl StreamFrame {
    /// Creates a status frame.
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }

    /// Returns `true` for the terminal frame.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        matches!(self, Self::Final { .. })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_frame_wire_format() {
        let frame = StreamFrame::status("Searching SharePoint for \"Acme\"");
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"type": "status", "message": "Searching SharePoint for \"Acme\""})
        );
        assert!(!frame.is_final());
    }

    #[test]
    fn test_final_frame_flattens_answer() {
        let frame = StreamFrame::Final {
            answer: ChatAnswer {
                content: vec![ContentBlock::text("Acme holds 12%.")],
                citations: vec![],
                rounds: 2,
                stop_reason: StopReason::Completed,
            },
            error: None,
        };

        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "final");
        assert_eq!(value["rounds"], 2);
        assert_eq!(value["stop_reason"], "completed");
        assert_eq!(value["content"][0]["text"], "Acme holds 12%.");
        assert!(value.get("error").is_none());
        assert!(frame.is_final());
    }

    #[test]
    fn test_progress_frame_wire_format() {
        let frame = StreamFrame::Progress {
            round: 1,
            max_rounds: 8,
            tool: "read_pdf".into(),
            success: false,
        };
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"type": "progress", "round": 1, "max_rounds": 8, "tool": "read_pdf", "success": false})
        );
    }
}
