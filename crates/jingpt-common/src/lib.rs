//! # jingpt-common
//!
//! Shared types for the JinGPT orchestration service:
//! - Conversations, messages and UI content blocks
//! - Tool descriptors, invocations and results
//! - LLM client configuration and request/response types
//! - Frames streamed to the chat UI
//!
//! ## Example
//!
//! ```
//! use jingpt_common::{Conversation, Function, Message, Tool, ToolCall};
//!
//! let conv = Conversation::new();
//! let msg = Message::user(conv.id, "What is Acme's latest valuation?");
//!
//! let tool = Tool::builder()
//!     .function(Function {
//!         name: "search_sharepoint".to_string(),
//!         description: "Search SharePoint documents".to_string(),
//!         parameters: serde_json::json!({
//!             "type": "object",
//!             "properties": {"query": {"type": "string", "description": "Search terms"}},
//!             "required": ["query"],
//!         }),
//!     })
//!     .build();
//!
//! let call = ToolCall::new("search_sharepoint", r#"{"query":"Acme valuation"}"#);
//! ```

/// Chat conversation and message types.
pub mod chat;
/// Client configuration and request/response types.
pub mod client;
/// Stream frames and answer types.
pub mod events;
/// Tool calling and result types.
pub mod tools;

pub use chat::{
    ContentBlock, Conversation, ConversationError, InboundContent, InboundMessage, InboundRole,
    Message, MessageRole,
};
pub use client::{ChatRequest, ChatResponse, Config, FinishReason, RetryConfig, ToolChoice, Usage};
pub use events::{ChatAnswer, StopReason, StreamFrame};
pub use tools::{
    DocumentRef, Function, FunctionCall, Parameters, Property, SearchHit, Tool, ToolCall,
    ToolErrorKind, ToolFailure, ToolOutcome, ToolResult,
};
