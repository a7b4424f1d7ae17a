//! Anthropic Messages API types and client implementation.
//!
//! The request side converts the internal [`Message`] list into Anthropic's
//! alternating user/assistant turns. Tool messages become `tool_result`
//! blocks, and consecutive user-side messages (all results of one round plus
//! any trailing user text) are merged into a single user turn.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use jingpt_common::chat::{Message, MessageRole};
use jingpt_common::client::{ChatRequest, Config, FinishReason, ToolChoice, Usage};
use jingpt_common::tools::Tool;

pub mod client;
pub use client::AnthropicClient;

/// The required API version header value for Anthropic API.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default base URL for the Anthropic API.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Anthropic requires `max_tokens`; this is used when neither the request
/// nor the config sets one.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

// ============================================================================
// Request Types
// ============================================================================

/// Cache control configuration for prompt caching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheControl {
    /// Type of cache control, always "ephemeral".
    #[serde(rename = "type")]
    pub cache_type: String,
}

impl CacheControl {
    /// Creates ephemeral cache control.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self {
            cache_type: "ephemeral".to_string(),
        }
    }
}

/// Content block types that can appear in request messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestContentBlock {
    /// Text content block.
    Text {
        /// The text content.
        text: String,
    },
    /// Tool result content block.
    ToolResult {
        /// ID of the tool use this is responding to.
        tool_use_id: String,
        /// Serialized result payload.
        content: String,
        /// Whether the tool execution resulted in an error.
        #[serde(skip_serializing_if = "std::ops::Not::not", default)]
        is_error: bool,
    },
    /// Tool use content block (for assistant messages with tool calls).
    ToolUse {
        /// Unique ID for this tool use.
        id: String,
        /// Name of the tool to call.
        name: String,
        /// Input arguments as JSON.
        input: serde_json::Value,
    },
}

/// An Anthropic message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicMessage {
    /// Role of the message author.
    pub role: AnthropicRole,
    /// Content of the message - either a string or array of content blocks.
    pub content: MessageContent,
}

/// Message content - can be a simple string or array of content blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content (shorthand for single text block).
    Text(String),
    /// Array of content blocks.
    Blocks(Vec<RequestContentBlock>),
}

impl MessageContent {
    fn into_blocks(self) -> Vec<RequestContentBlock> {
        match self {
            Self::Text(text) if text.is_empty() => Vec::new(),
            Self::Text(text) => vec![RequestContentBlock::Text { text }],
            Self::Blocks(blocks) => blocks,
        }
    }
}

/// Role of message author in Anthropic API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnthropicRole {
    /// User message.
    User,
    /// Assistant message.
    Assistant,
}

impl From<MessageRole> for AnthropicRole {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::Assistant => Self::Assistant,
            // Tool results travel inside user turns
            _ => Self::User,
        }
    }
}

/// Content blocks for system prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemContentBlock {
    /// Text content block.
    Text {
        /// The text content.
        text: String,
        /// Optional cache control.
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
}

/// Anthropic tool definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicTool {
    /// Tool name (must match regex: ^[a-zA-Z0-9_-]{1,64}$).
    pub name: String,
    /// Description of what the tool does.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: serde_json::Value,
    /// Optional cache control.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

impl From<&Tool> for AnthropicTool {
    fn from(tool: &Tool) -> Self {
        Self {
            name: tool.function.name.clone(),
            description: tool.function.description.clone(),
            input_schema: tool.function.parameters.clone(),
            cache_control: None,
        }
    }
}

/// Tool choice configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicToolChoice {
    /// Let the model decide whether to use tools.
    Auto,
    /// Force the model to use at least one tool.
    Any,
    /// Force the model to use a specific tool.
    Tool {
        /// Name of the tool to use.
        name: String,
    },
    /// Disable tool use entirely.
    None,
}

impl From<&ToolChoice> for AnthropicToolChoice {
    fn from(choice: &ToolChoice) -> Self {
        match choice {
            ToolChoice::None => Self::None,
            ToolChoice::Required => Self::Any,
            ToolChoice::Function { name } => Self::Tool { name: name.clone() },
            _ => Self::Auto,
        }
    }
}

/// Request for the Anthropic Messages API.
#[derive(Debug, Clone, Serialize, TypedBuilder)]
pub struct CreateMessageRequest {
    /// Model identifier.
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<AnthropicMessage>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// System prompt blocks.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<Vec<SystemContentBlock>>,
    /// Sampling temperature (0.0-1.0).
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Available tools.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<AnthropicTool>>,
    /// Tool selection strategy.
    #[builder(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<AnthropicToolChoice>,
}

// ============================================================================
// Response Types
// ============================================================================

/// Content block types that can appear in responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseContentBlock {
    /// Text content block.
    Text {
        /// The text content.
        text: String,
    },
    /// Tool use request from the model.
    ToolUse {
        /// Unique ID for this tool use.
        id: String,
        /// Name of the tool to call.
        name: String,
        /// Input arguments as JSON.
        #[serde(default)]
        input: serde_json::Value,
    },
    /// Any block type this client does not consume (thinking and friends).
    #[serde(other)]
    Unsupported,
}

/// Reason why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of turn.
    EndTurn,
    /// Maximum tokens reached.
    MaxTokens,
    /// Stop sequence encountered.
    StopSequence,
    /// Model wants to use a tool.
    ToolUse,
    /// Model paused a long-running turn.
    PauseTurn,
    /// Model refused to respond.
    Refusal,
}

impl From<StopReason> for FinishReason {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::MaxTokens => Self::Length,
            StopReason::ToolUse => Self::ToolCalls,
            StopReason::Refusal => Self::ContentFilter,
            StopReason::EndTurn | StopReason::StopSequence | StopReason::PauseTurn => Self::Stop,
        }
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicUsage {
    /// Input tokens consumed.
    pub input_tokens: u32,
    /// Output tokens generated.
    pub output_tokens: u32,
}

impl From<AnthropicUsage> for Usage {
    fn from(usage: AnthropicUsage) -> Self {
        Self {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            total_tokens: usage.input_tokens + usage.output_tokens,
        }
    }
}

/// Response from the Messages API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Unique message ID.
    pub id: String,
    /// Content blocks in the response.
    pub content: Vec<ResponseContentBlock>,
    /// Model that generated the response.
    pub model: String,
    /// Why generation stopped.
    pub stop_reason: Option<StopReason>,
    /// Token usage statistics.
    pub usage: AnthropicUsage,
}

// ============================================================================
// Error Types
// ============================================================================

/// API error detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error type (e.g., "`invalid_request_error`").
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message.
    pub message: String,
}

/// Full error response from the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error details.
    pub error: ApiError,
}

// ============================================================================
// Conversion Helpers
// ============================================================================

/// Convert one internal message into Anthropic format.
impl From<&Message> for AnthropicMessage {
    fn from(message: &Message) -> Self {
        let role = AnthropicRole::from(message.role);

        let content = match message.role {
            MessageRole::Tool => MessageContent::Blocks(vec![RequestContentBlock::ToolResult {
                tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
                content: message.content.clone(),
                is_error: message.is_error,
            }]),
            MessageRole::Assistant if !message.tool_calls.is_empty() => {
                let mut blocks = Vec::with_capacity(message.tool_calls.len() + 1);

                if message.has_text() {
                    blocks.push(RequestContentBlock::Text {
                        text: message.content.clone(),
                    });
                }

                for tool_call in &message.tool_calls {
                    // Arguments are replayed verbatim; unparseable ones become {}
                    let input = serde_json::from_str(tool_call.function.arguments_json())
                        .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()));

                    blocks.push(RequestContentBlock::ToolUse {
                        id: tool_call.id.clone(),
                        name: tool_call.function.name.clone(),
                        input,
                    });
                }

                MessageContent::Blocks(blocks)
            }
            _ => MessageContent::Text(message.content.clone()),
        };

        Self { role, content }
    }
}

/// Converts the non-system messages of a request into alternating turns.
///
/// Adjacent messages that map to the same Anthropic role are merged into a
/// single turn, which keeps every `tool_result` of a round together and
/// ahead of any user text that follows them.
#[must_use]
pub fn convert_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
    let mut turns: Vec<AnthropicMessage> = Vec::with_capacity(messages.len());

    for message in messages.iter().filter(|m| m.role != MessageRole::System) {
        let converted = AnthropicMessage::from(message);
        match turns.last_mut() {
            Some(last) if last.role == converted.role => {
                let mut blocks = std::mem::replace(&mut last.content, MessageContent::Blocks(vec![]))
                    .into_blocks();
                blocks.extend(converted.content.into_blocks());
                last.content = MessageContent::Blocks(blocks);
            }
            _ => turns.push(converted),
        }
    }

    turns
}

/// Converts tools to Anthropic format with cache control on the last tool.
///
/// Everything up to and including the marked block is cached, so marking the
/// last tool caches the whole definition set across rounds.
fn convert_tools_with_caching(tools: &[Tool]) -> Vec<AnthropicTool> {
    let mut anthropic_tools: Vec<AnthropicTool> = tools.iter().map(AnthropicTool::from).collect();

    if let Some(last) = anthropic_tools.last_mut() {
        last.cache_control = Some(CacheControl::ephemeral());
    }

    anthropic_tools
}

/// Conversion from `ChatRequest` to Anthropic request format.
impl From<(&ChatRequest, &Config)> for CreateMessageRequest {
    fn from((request, config): (&ChatRequest, &Config)) -> Self {
        let mut system_blocks: Vec<SystemContentBlock> = request
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| SystemContentBlock::Text {
                text: m.content.clone(),
                cache_control: None,
            })
            .collect();

        if let Some(SystemContentBlock::Text { cache_control, .. }) = system_blocks.last_mut() {
            *cache_control = Some(CacheControl::ephemeral());
        }

        let system = if system_blocks.is_empty() {
            None
        } else {
            Some(system_blocks)
        };

        let tools = request
            .tools
            .as_ref()
            .filter(|t| !t.is_empty())
            .map(|t| convert_tools_with_caching(t));

        let max_tokens = request
            .max_tokens
            .or(config.max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS);

        Self::builder()
            .model(
                request
                    .model
                    .clone()
                    .unwrap_or_else(|| config.model.clone()),
            )
            .messages(convert_messages(&request.messages))
            .max_tokens(max_tokens)
            .system(system)
            .temperature(request.temperature)
            .tools(tools)
            .tool_choice(request.tool_choice.as_ref().map(AnthropicToolChoice::from))
            .build()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;
    use jingpt_common::chat::Conversation;
    use jingpt_common::tools::{Function, ToolCall};
    use serde_json::json;

    fn round_trip_conversation() -> Conversation {
        let mut conv = Conversation::new();
        let id = conv.id;
        conv.messages.push(Message::system(id, "You are JinGPT."));
        conv.messages.push(Message::user(id, "Acme cap table?"));
        conv.messages.push(
            Message::assistant(id, "Let me look.")
                .with_tool_calls(vec![
                    ToolCall::with_id("toolu_a", "search_sharepoint", r#"{"query":"Acme"}"#),
                    ToolCall::with_id("toolu_b", "search_confluence", r#"{"query":"Acme"}"#),
                ])
                .unwrap(),
        );
        conv.messages.push(
            Message::tool(id, r#"{"count":1}"#, "toolu_a".into(), "search_sharepoint".into())
                .unwrap(),
        );
        conv.messages.push(
            Message::tool(id, r#"{"error":"x"}"#, "toolu_b".into(), "search_confluence".into())
                .unwrap()
                .with_error_flag(true),
        );
        conv
    }

    #[test]
    fn test_tool_results_merge_into_one_user_turn() {
        let conv = round_trip_conversation();
        let turns = convert_messages(conv.get_messages());

        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role, AnthropicRole::User);
        assert_eq!(turns[1].role, AnthropicRole::Assistant);
        assert_eq!(turns[2].role, AnthropicRole::User);

        let MessageContent::Blocks(blocks) = &turns[2].content else {
            panic!("expected blocks");
        };
        assert_eq!(blocks.len(), 2);
        assert_eq!(
            blocks[1],
            RequestContentBlock::ToolResult {
                tool_use_id: "toolu_b".into(),
                content: r#"{"error":"x"}"#.into(),
                is_error: true,
            }
        );
    }

    #[test]
    fn test_tool_results_precede_followup_text() {
        let mut conv = round_trip_conversation();
        let followup = conv.user_message("Also check Confluence");
        conv.messages.push(followup);

        let turns = convert_messages(conv.get_messages());
        let MessageContent::Blocks(blocks) = &turns[2].content else {
            panic!("expected blocks");
        };
        assert_eq!(blocks.len(), 3);
        assert!(matches!(blocks[0], RequestContentBlock::ToolResult { .. }));
        assert!(matches!(blocks[2], RequestContentBlock::Text { .. }));
    }

    #[test]
    fn test_assistant_tool_use_serialization() {
        let conv = round_trip_conversation();
        let turns = convert_messages(conv.get_messages());
        let value = serde_json::to_value(&turns[1]).unwrap();

        assert_eq!(value["role"], "assistant");
        assert_eq!(value["content"][0], json!({"type": "text", "text": "Let me look."}));
        assert_eq!(
            value["content"][1],
            json!({"type": "tool_use", "id": "toolu_a", "name": "search_sharepoint", "input": {"query": "Acme"}})
        );
    }

    #[test]
    fn test_successful_tool_result_omits_is_error() {
        let block = RequestContentBlock::ToolResult {
            tool_use_id: "t".into(),
            content: "{}".into(),
            is_error: false,
        };
        let value = serde_json::to_value(&block).unwrap();
        assert!(value.get("is_error").is_none());
    }

    #[test]
    fn test_request_conversion_lifts_system_and_caches() {
        let conv = round_trip_conversation();
        let tool = Tool::builder()
            .function(Function {
                name: "search_sharepoint".into(),
                description: "Search".into(),
                parameters: json!({"type": "object", "properties": {}, "required": []}),
            })
            .build();
        let request = ChatRequest::new(conv.get_messages().to_vec())
            .with_tools(vec![tool])
            .with_tool_choice(ToolChoice::Auto);
        let config = Config::new("anthropic", "claude-sonnet-4-5");

        let body = CreateMessageRequest::from((&request, &config));
        assert_eq!(body.model, "claude-sonnet-4-5");
        assert_eq!(body.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(body.messages.len(), 3);

        let system = body.system.unwrap();
        assert_eq!(
            system[0],
            SystemContentBlock::Text {
                text: "You are JinGPT.".into(),
                cache_control: Some(CacheControl::ephemeral()),
            }
        );

        let tools = body.tools.unwrap();
        assert_eq!(tools[0].cache_control, Some(CacheControl::ephemeral()));
        assert_eq!(body.tool_choice, Some(AnthropicToolChoice::Auto));
    }

    #[test]
    fn test_unknown_response_blocks_are_tolerated() {
        let response: MessageResponse = serde_json::from_value(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "thinking", "thinking": "hmm", "signature": "sig"},
                {"type": "text", "text": "Done."}
            ],
            "model": "claude",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 1, "output_tokens": 2}
        }))
        .unwrap();

        assert!(matches!(response.content[0], ResponseContentBlock::Unsupported));
        assert_eq!(FinishReason::from(response.stop_reason.unwrap()), FinishReason::Stop);
    }
}
