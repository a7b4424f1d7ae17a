//! Bounding the replayed chat history.

use jingpt_common::{ContentBlock, InboundContent, InboundMessage};

/// Default number of inbound messages kept.
pub const DEFAULT_HISTORY_WINDOW: usize = 20;

/// A user message with text and no tool results: a safe place to start.
fn opens_turn(message: &InboundMessage) -> bool {
    message.is_user_text()
        && match &message.content {
            InboundContent::Text(_) => true,
            InboundContent::Blocks(blocks) => !blocks
                .iter()
                .any(|b| matches!(b, ContentBlock::ToolResult { .. })),
        }
}

/// Keeps the last `size` messages, then advances to the first one that
/// opens a user turn so the window never starts mid tool exchange.
///
/// If the last `size` messages contain no such turn, the window reaches
/// back to the nearest earlier one instead. An empty result means the
/// history has no usable user turn at all.
#[must_use]
pub fn window(mut messages: Vec<InboundMessage>, size: usize) -> Vec<InboundMessage> {
    let tail_start = messages.len().saturating_sub(size.max(1));

    let start = messages[tail_start..]
        .iter()
        .position(opens_turn)
        .map(|offset| tail_start + offset)
        .or_else(|| messages[..tail_start].iter().rposition(opens_turn));

    match start {
        Some(start) => messages.split_off(start),
        None => Vec::new(),
    }
}
