//! Event types for Core orchestration
//!
//! Events are **observability**: fire-and-forget notifications about what the
//! loop is doing. The server turns them into status and progress frames; the
//! loop never waits on them and cannot be failed by them.

use jingpt_common::StopReason;

/// Events emitted by Core during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    /// About to call the model. `round` counts model turns from 1.
    ModelTurn { round: usize },

    /// A tool call is about to be dispatched.
    ToolStarted {
        round: usize,
        call_id: String,
        name: String,
        /// Human-readable activity line from the tool.
        status: String,
    },

    /// A tool call finished.
    ToolFinished {
        round: usize,
        call_id: String,
        name: String,
        success: bool,
    },

    /// The run ended.
    Done { rounds: usize, stop: StopReason },
}

/// Synchronous callback receiving Core events.
pub type EventCallback = Box<dyn Fn(CoreEvent) + Send + Sync>;
