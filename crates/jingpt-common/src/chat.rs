//! Conversation and message types for LLM interactions.
//!
//! Two shapes of conversation live here:
//!
//! - [`InboundMessage`]: what the chat UI posts. Roles are `user` or
//!   `assistant` and content is either a plain string or a list of typed
//!   [`ContentBlock`]s.
//! - [`Message`] / [`Conversation`]: the internal, role-tagged form the
//!   orchestration loop and the LLM clients work with.
//!
//! [`Conversation::from_inbound`] converts the first into the second and
//! enforces the tool pairing invariant: every `tool_result` block must sit in
//! the user turn immediately after the assistant turn that issued the matching
//! `tool_use`, and every call identifier is unique within the conversation.
//!
//! # Example
//!
//! ```
//! use jingpt_common::chat::{Conversation, InboundMessage};
//!
//! let inbound: Vec<InboundMessage> = serde_json::from_str(
//!     r#"[{"role": "user", "content": "What is Acme's equity stake?"}]"#,
//! ).unwrap();
//!
//! let conversation = Conversation::from_inbound(inbound).unwrap();
//! assert_eq!(conversation.get_messages().len(), 1);
//! ```

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::tools::{FunctionCall, ToolCall};

/// Represents the role of a message sender in a conversation.
///
/// Roles are serialized to lowercase strings. `Tool` messages carry the
/// result of one tool call and are sent to Anthropic as `tool_result` blocks
/// inside a user turn.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum MessageRole {
    /// System-level instructions.
    System,
    /// Input from the end user.
    User,
    /// Responses from the model, possibly requesting tool calls.
    Assistant,
    /// The result of executing a tool call.
    Tool,
}

/// A typed content block, as exchanged with the chat UI.
///
/// This mirrors the content block vocabulary of the Anthropic Messages API
/// closely enough that UI clients can round-trip model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// A tool invocation requested by the assistant.
    ToolUse {
        /// Call identifier, unique within the conversation.
        id: String,
        /// Name of the tool to call.
        name: String,
        /// Input arguments.
        #[serde(default)]
        input: serde_json::Value,
    },
    /// The result of a previous tool invocation.
    ToolResult {
        /// Identifier of the `tool_use` block this answers.
        tool_use_id: String,
        /// Result payload: a string or any JSON value.
        #[serde(default)]
        content: serde_json::Value,
        /// Whether the tool reported a failure.
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    /// Creates a text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolResult { .. } => "tool_result",
        }
    }
}

/// Role of an inbound message. Only users and the assistant speak in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboundRole {
    /// A user turn.
    User,
    /// An assistant turn replayed from client-side history.
    Assistant,
}

/// Inbound message content: plain text or a list of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InboundContent {
    /// Plain text shorthand.
    Text(String),
    /// Typed content blocks.
    Blocks(Vec<ContentBlock>),
}

/// A message as posted by the chat UI.
///
/// Unknown fields (such as the UI's `timestamp`) are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Who sent the message.
    pub role: InboundRole,
    /// What was said.
    pub content: InboundContent,
}

impl InboundMessage {
    /// Creates a plain-text user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: InboundRole::User,
            content: InboundContent::Text(text.into()),
        }
    }

    /// Creates a plain-text assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: InboundRole::Assistant,
            content: InboundContent::Text(text.into()),
        }
    }

    /// Returns `true` if this is a user message carrying non-empty text.
    #[must_use]
    pub fn is_user_text(&self) -> bool {
        if self.role != InboundRole::User {
            return false;
        }
        match &self.content {
            InboundContent::Text(text) => !text.trim().is_empty(),
            InboundContent::Blocks(blocks) => blocks
                .iter()
                .any(|b| matches!(b, ContentBlock::Text { text } if !text.trim().is_empty())),
        }
    }
}

/// Errors raised when an inbound conversation violates the message invariants.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConversationError {
    /// No messages were supplied.
    #[error("conversation is empty")]
    Empty,

    /// A `tool_result` does not answer a `tool_use` in the preceding assistant turn.
    #[error("tool result '{0}' does not follow a matching tool call")]
    OrphanToolResult(String),

    /// An assistant `tool_use` was not answered in the next user turn.
    #[error("tool call '{0}' has no result in the following turn")]
    UnansweredToolCall(String),

    /// A call identifier appears more than once.
    #[error("duplicate tool call id '{0}'")]
    DuplicateCallId(String),

    /// A block type appeared in a role that cannot carry it.
    #[error("{block} block is not allowed in a {role} message")]
    MisplacedBlock {
        /// The offending role.
        role: &'static str,
        /// The offending block type.
        block: &'static str,
    },

    /// The last message must be a user turn for the model to answer.
    #[error("the last message must come from the user")]
    LastMessageNotUser,
}

/// A single message in a conversation.
///
/// Tool calls only appear on assistant messages; `tool_call_id` and `name`
/// are only set on tool messages.
#[derive(Debug, Serialize, Deserialize, Clone, TypedBuilder)]
pub struct Message {
    /// Unique identifier for this message.
    #[builder(default = Uuid::new_v4())]
    pub id: Uuid,

    /// ID of the conversation this message belongs to.
    pub conversation_id: Uuid,

    /// The role of the message sender.
    pub role: MessageRole,

    /// The text content of the message. For tool messages this is the
    /// serialized tool result. May be empty for assistant messages that only
    /// request tools.
    pub content: String,

    /// When this message was created.
    #[builder(default = Utc::now())]
    pub timestamp: DateTime<Utc>,

    /// Tool calls requested by this message (assistant only).
    ///
    /// Uses `SmallVec` since most turns request one or two tools.
    #[builder(default)]
    pub tool_calls: SmallVec<[ToolCall; 2]>,

    /// The call this message answers (tool only).
    #[builder(default)]
    pub tool_call_id: Option<String>,

    /// Name of the tool that produced this result (tool only).
    #[builder(default)]
    pub name: Option<String>,

    /// Whether this tool result represents a failure (tool only).
    #[builder(default)]
    #[serde(default)]
    pub is_error: bool,
}

impl Message {
    /// Creates a new message with the specified role and content.
    pub fn new(conversation_id: Uuid, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content: content.into(),
            timestamp: Utc::now(),
            tool_calls: SmallVec::new(),
            tool_call_id: None,
            name: None,
            is_error: false,
        }
    }

    /// Creates a new system message.
    pub fn system(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(conversation_id, MessageRole::System, content)
    }

    /// Creates a new user message.
    pub fn user(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(conversation_id, MessageRole::User, content)
    }

    /// Creates a new assistant message.
    pub fn assistant(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self::new(conversation_id, MessageRole::Assistant, content)
    }

    /// Creates a new tool result message.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool call id or function name is empty.
    pub fn tool(
        conversation_id: Uuid,
        content: impl Into<String>,
        tool_call_id: String,
        function_name: String,
    ) -> anyhow::Result<Self> {
        if tool_call_id.is_empty() {
            anyhow::bail!("Tool call ID cannot be empty");
        }
        if function_name.is_empty() {
            anyhow::bail!("Function name cannot be empty for tool messages");
        }
        let mut msg = Self::new(conversation_id, MessageRole::Tool, content);
        msg.tool_call_id = Some(tool_call_id);
        msg.name = Some(function_name);
        Ok(msg)
    }

    /// Marks a tool message as carrying a failure.
    #[must_use]
    pub const fn with_error_flag(mut self, is_error: bool) -> Self {
        self.is_error = is_error;
        self
    }

    /// Sets the tool calls for this message.
    ///
    /// # Errors
    ///
    /// Returns an error if this message is not an assistant message.
    pub fn with_tool_calls(
        mut self,
        tool_calls: impl Into<SmallVec<[ToolCall; 2]>>,
    ) -> anyhow::Result<Self> {
        if self.role != MessageRole::Assistant {
            anyhow::bail!(
                "Tool calls can only be added to assistant messages, found {:?}",
                self.role
            );
        }
        self.tool_calls = tool_calls.into();
        Ok(self)
    }

    /// Returns `true` if the message has non-whitespace text.
    #[must_use]
    pub fn has_text(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

/// An ordered, request-scoped thread of messages.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Conversation {
    /// Unique identifier, shared by every message in the thread.
    pub id: Uuid,

    /// When this conversation was created.
    pub created_at: DateTime<Utc>,

    /// Messages in chronological order.
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Creates a new empty conversation with a generated ID.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            messages: Vec::new(),
        }
    }

    /// Adds a message to this conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if the message belongs to another conversation.
    pub fn add_message(&mut self, message: Message) -> anyhow::Result<()> {
        if message.conversation_id != self.id {
            anyhow::bail!(
                "Message conversation_id {} does not match conversation id {}",
                message.conversation_id,
                self.id
            );
        }
        self.messages.push(message);
        Ok(())
    }

    /// Returns a reference to the messages in this conversation.
    pub fn get_messages(&self) -> &[Message] {
        &self.messages
    }

    /// Consumes the conversation, returning its messages.
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Creates a new user message for this conversation.
    pub fn user_message(&self, content: impl Into<String>) -> Message {
        Message::user(self.id, content)
    }

    /// Creates a new assistant message for this conversation.
    pub fn assistant_message(&self, content: impl Into<String>) -> Message {
        Message::assistant(self.id, content)
    }

    /// Creates a new system message for this conversation.
    pub fn system_message(&self, content: impl Into<String>) -> Message {
        Message::system(self.id, content)
    }

    /// Builds a conversation from UI messages, validating tool pairing.
    ///
    /// Within a user turn, tool results are emitted before the turn's text so
    /// the wire conversion can place `tool_result` blocks first.
    ///
    /// # Errors
    ///
    /// Returns a [`ConversationError`] if the messages are empty, break the
    /// tool pairing invariant, or do not end with a user turn.
    pub fn from_inbound(inbound: Vec<InboundMessage>) -> Result<Self, ConversationError> {
        if inbound.is_empty() {
            return Err(ConversationError::Empty);
        }
        if inbound.last().map(|m| m.role) != Some(InboundRole::User) {
            return Err(ConversationError::LastMessageNotUser);
        }

        let mut conversation = Self::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut pending: Vec<(String, String)> = Vec::new();

        for message in inbound {
            let blocks = match message.content {
                InboundContent::Text(text) => vec![ContentBlock::Text { text }],
                InboundContent::Blocks(blocks) => blocks,
            };

            match message.role {
                InboundRole::Assistant => {
                    if let Some((id, _)) = pending.first() {
                        return Err(ConversationError::UnansweredToolCall(id.clone()));
                    }
                    let mut text = Vec::new();
                    let mut calls: SmallVec<[ToolCall; 2]> = SmallVec::new();
                    for block in blocks {
                        match block {
                            ContentBlock::Text { text: t } => text.push(t),
                            ContentBlock::ToolUse { id, name, input } => {
                                if !seen_ids.insert(id.clone()) {
                                    return Err(ConversationError::DuplicateCallId(id));
                                }
                                pending.push((id.clone(), name.clone()));
                                calls.push(ToolCall {
                                    id,
                                    function: FunctionCall {
                                        name,
                                        arguments: input.to_string(),
                                    },
                                    call_type: "function".to_string(),
                                });
                            }
                            other @ ContentBlock::ToolResult { .. } => {
                                return Err(ConversationError::MisplacedBlock {
                                    role: "assistant",
                                    block: other.kind(),
                                });
                            }
                        }
                    }
                    let mut msg = conversation.assistant_message(text.join("\n"));
                    msg.tool_calls = calls;
                    conversation.messages.push(msg);
                }
                InboundRole::User => {
                    let mut text = Vec::new();
                    for block in blocks {
                        match block {
                            ContentBlock::Text { text: t } => text.push(t),
                            ContentBlock::ToolResult {
                                tool_use_id,
                                content,
                                is_error,
                            } => {
                                let position = pending
                                    .iter()
                                    .position(|(id, _)| *id == tool_use_id)
                                    .ok_or_else(|| {
                                        ConversationError::OrphanToolResult(tool_use_id.clone())
                                    })?;
                                let (id, name) = pending.remove(position);
                                let body = match content {
                                    serde_json::Value::String(s) => s,
                                    other => other.to_string(),
                                };
                                let mut msg = Message::new(conversation.id, MessageRole::Tool, body);
                                msg.tool_call_id = Some(id);
                                msg.name = Some(name);
                                msg.is_error = is_error;
                                conversation.messages.push(msg);
                            }
                            other @ ContentBlock::ToolUse { .. } => {
                                return Err(ConversationError::MisplacedBlock {
                                    role: "user",
                                    block: other.kind(),
                                });
                            }
                        }
                    }
                    if let Some((id, _)) = pending.first() {
                        return Err(ConversationError::UnansweredToolCall(id.clone()));
                    }
                    let text = text.join("\n");
                    if !text.trim().is_empty() {
                        conversation.messages.push(conversation.user_message(text));
                    }
                }
            }
        }

        // Blank user text is dropped above, which can leave an assistant tail.
        match conversation.messages.last().map(|m| m.role) {
            Some(MessageRole::User | MessageRole::Tool) => Ok(conversation),
            Some(_) => Err(ConversationError::LastMessageNotUser),
            None => Err(ConversationError::Empty),
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use serde_json::json;

    fn inbound(value: serde_json::Value) -> Vec<InboundMessage> {
        serde_json::from_value(value).expect("valid inbound messages")
    }

    #[test]
    fn test_message_creation() {
        let conv_id = Uuid::new_v4();
        let msg = Message::user(conv_id, "Hello");
        assert_eq!(msg.role, MessageRole::User);
        assert_eq!(msg.content, "Hello");
        assert!(msg.tool_calls.is_empty());
        assert!(!msg.is_error);
    }

    #[test]
    fn test_message_tool_call_validation() {
        let conv_id = Uuid::new_v4();
        let tool_call = ToolCall::new("search_sharepoint", r#"{"query":"Acme"}"#);

        let user = Message::user(conv_id, "hi").with_tool_calls(vec![tool_call.clone()]);
        assert!(user.is_err());

        let assistant = Message::assistant(conv_id, "").with_tool_calls(vec![tool_call]);
        assert!(assistant.is_ok());
    }

    #[test]
    fn test_tool_message_validation() {
        let conv_id = Uuid::new_v4();
        assert!(Message::tool(conv_id, "{}", String::new(), "search".into()).is_err());
        assert!(Message::tool(conv_id, "{}", "call_1".into(), String::new()).is_err());

        let msg = Message::tool(conv_id, "{}", "call_1".into(), "search".into()).unwrap();
        assert_eq!(msg.role, MessageRole::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_conversation_add_message_wrong_id() {
        let mut conv = Conversation::new();
        let other = Conversation::new();
        assert!(conv.add_message(other.user_message("Hello")).is_err());
        assert!(conv.add_message(conv.user_message("Hello")).is_ok());
    }

    #[test]
    fn test_from_inbound_plain_text_history() {
        let messages = inbound(json!([
            {"role": "user", "content": "Hi", "timestamp": 1_700_000_000},
            {"role": "assistant", "content": "Hello! How can I help?"},
            {"role": "user", "content": "Show me Acme's cap table"}
        ]));

        let conv = Conversation::from_inbound(messages).unwrap();
        let roles: Vec<MessageRole> = conv.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![MessageRole::User, MessageRole::Assistant, MessageRole::User]
        );
        assert!(conv.messages.iter().all(|m| m.conversation_id == conv.id));
    }

    #[test]
    fn test_from_inbound_tool_round_trip() {
        let messages = inbound(json!([
            {"role": "user", "content": "Find the Acme cap table"},
            {"role": "assistant", "content": [
                {"type": "text", "text": "Searching."},
                {"type": "tool_use", "id": "toolu_1", "name": "search_sharepoint", "input": {"query": "Acme"}}
            ]},
            {"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "toolu_1", "content": "{\"count\":0}"},
                {"type": "text", "text": "Try Confluence too"}
            ]}
        ]));

        let conv = Conversation::from_inbound(messages).unwrap();
        assert_eq!(conv.messages.len(), 4);

        let assistant = &conv.messages[1];
        assert_eq!(assistant.tool_calls.len(), 1);
        assert_eq!(assistant.tool_calls[0].function.arguments, r#"{"query":"Acme"}"#);

        let tool = &conv.messages[2];
        assert_eq!(tool.role, MessageRole::Tool);
        assert_eq!(tool.tool_call_id.as_deref(), Some("toolu_1"));
        assert_eq!(tool.name.as_deref(), Some("search_sharepoint"));
        assert_eq!(tool.content, "{\"count\":0}");

        assert_eq!(conv.messages[3].content, "Try Confluence too");
    }

    #[test]
    fn test_from_inbound_rejects_orphan_tool_result() {
        let messages = inbound(json!([
            {"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "toolu_missing", "content": "x"}
            ]}
        ]));

        assert_eq!(
            Conversation::from_inbound(messages).unwrap_err(),
            ConversationError::OrphanToolResult("toolu_missing".into())
        );
    }

    #[test]
    fn test_from_inbound_rejects_unanswered_tool_call() {
        let messages = inbound(json!([
            {"role": "user", "content": "q"},
            {"role": "assistant", "content": [
                {"type": "tool_use", "id": "toolu_1", "name": "search_sharepoint", "input": {}}
            ]},
            {"role": "user", "content": "never mind"}
        ]));

        assert_eq!(
            Conversation::from_inbound(messages).unwrap_err(),
            ConversationError::UnansweredToolCall("toolu_1".into())
        );
    }

    #[test]
    fn test_from_inbound_rejects_result_after_intervening_turn() {
        let messages = inbound(json!([
            {"role": "user", "content": "q"},
            {"role": "assistant", "content": [
                {"type": "tool_use", "id": "toolu_1", "name": "search_sharepoint", "input": {}}
            ]},
            {"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "toolu_1", "content": "a"}
            ]},
            {"role": "assistant", "content": "done"},
            {"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "toolu_1", "content": "again"}
            ]}
        ]));

        assert_eq!(
            Conversation::from_inbound(messages).unwrap_err(),
            ConversationError::OrphanToolResult("toolu_1".into())
        );
    }

    #[test]
    fn test_from_inbound_rejects_duplicate_ids() {
        let messages = inbound(json!([
            {"role": "user", "content": "q"},
            {"role": "assistant", "content": [
                {"type": "tool_use", "id": "dup", "name": "a", "input": {}},
                {"type": "tool_use", "id": "dup", "name": "b", "input": {}}
            ]},
            {"role": "user", "content": "x"}
        ]));

        assert_eq!(
            Conversation::from_inbound(messages).unwrap_err(),
            ConversationError::DuplicateCallId("dup".into())
        );
    }

    #[test]
    fn test_from_inbound_requires_user_last() {
        assert_eq!(
            Conversation::from_inbound(vec![]).unwrap_err(),
            ConversationError::Empty
        );
        let messages = vec![InboundMessage::user("q"), InboundMessage::assistant("a")];
        assert_eq!(
            Conversation::from_inbound(messages).unwrap_err(),
            ConversationError::LastMessageNotUser
        );
    }

    #[test]
    fn test_from_inbound_blank_final_turn_rejected() {
        let messages = vec![
            InboundMessage::user("hi"),
            InboundMessage::assistant("hello"),
            InboundMessage::user("   "),
        ];
        assert_eq!(
            Conversation::from_inbound(messages).unwrap_err(),
            ConversationError::LastMessageNotUser
        );

        assert_eq!(
            Conversation::from_inbound(vec![InboundMessage::user("  \n ")]).unwrap_err(),
            ConversationError::Empty
        );
    }

    #[test]
    fn test_is_user_text() {
        assert!(InboundMessage::user("hello").is_user_text());
        assert!(!InboundMessage::user("   ").is_user_text());
        assert!(!InboundMessage::assistant("hello").is_user_text());

        let results_only = InboundMessage {
            role: InboundRole::User,
            content: InboundContent::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: "t".into(),
                content: json!("x"),
                is_error: false,
            }]),
        };
        assert!(!results_only.is_user_text());
    }

    #[test]
    fn test_content_block_serialization() {
        let block = ContentBlock::text("hello");
        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({"type": "text", "text": "hello"})
        );
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn plain_text_histories_always_convert(
                turns in prop::collection::vec("[a-zA-Z ]{1,40}", 1..12)
            ) {
                // Alternate user/assistant, ending on a user turn.
                let len = turns.len();
                let messages: Vec<InboundMessage> = turns
                    .into_iter()
                    .enumerate()
                    .map(|(i, text)| {
                        let text = format!("x{text}");
                        if (len - 1 - i) % 2 == 0 {
                            InboundMessage::user(text)
                        } else {
                            InboundMessage::assistant(text)
                        }
                    })
                    .collect();

                let conv = Conversation::from_inbound(messages).unwrap();
                prop_assert_eq!(conv.messages.len(), len);
                prop_assert_eq!(conv.messages.last().map(|m| m.role), Some(MessageRole::User));
            }

            #[test]
            fn fuzz_inbound_deserialization(data in prop::collection::vec(any::<u8>(), 0..512)) {
                // Arbitrary bytes must never panic the decoder or validator.
                if let Ok(messages) = serde_json::from_slice::<Vec<InboundMessage>>(&data) {
                    let _ = Conversation::from_inbound(messages);
                }
            }
        }
    }
}
