//! Turning a finished run into the answer the user sees.

use std::collections::HashSet;

use jingpt_common::{ChatAnswer, ContentBlock, DocumentRef, MessageRole, StopReason};

use crate::core::RunOutcome;

/// Used when the model produced no text at all.
pub const FALLBACK_ANSWER: &str =
    "I couldn't find enough information to answer that. Please try rephrasing your question.";

/// Shown instead of an answer when the run failed.
pub const ERROR_ANSWER: &str =
    "Sorry, something went wrong while answering your question. Please try again.";

/// Assembles the answer for a finished run.
///
/// A completed run answers with the final assistant turn. A run stopped at
/// the round cap answers with the last assistant turn that had text, since
/// the final turn only asked for more tools. Either way the content is
/// never empty.
#[must_use]
pub fn assemble(outcome: &RunOutcome) -> ChatAnswer {
    let assistant_turns = outcome
        .messages
        .iter()
        .rev()
        .filter(|m| m.role == MessageRole::Assistant);

    let text = match outcome.stop {
        StopReason::RoundLimit => assistant_turns
            .filter(|m| m.has_text())
            .map(|m| m.content.trim())
            .next(),
        _ => assistant_turns
            .map(|m| m.content.trim())
            .next()
            .filter(|t| !t.is_empty()),
    };

    ChatAnswer {
        content: vec![ContentBlock::text(text.unwrap_or(FALLBACK_ANSWER))],
        citations: citations(outcome),
        rounds: outcome.rounds,
        stop_reason: outcome.stop,
    }
}

/// Documents read successfully during the run, first occurrence per URL.
fn citations(outcome: &RunOutcome) -> Vec<DocumentRef> {
    let mut seen = HashSet::new();
    outcome
        .tool_results
        .iter()
        .filter_map(jingpt_common::ToolResult::document)
        .filter(|doc| !doc.url.is_empty() && seen.insert(doc.url.clone()))
        .collect()
}

/// The answer reported when a run fails.
#[must_use]
pub fn error_answer() -> ChatAnswer {
    ChatAnswer {
        content: vec![ContentBlock::text(ERROR_ANSWER)],
        citations: Vec::new(),
        rounds: 0,
        stop_reason: StopReason::Error,
    }
}
