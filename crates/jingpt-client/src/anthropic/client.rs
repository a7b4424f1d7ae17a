//! Anthropic client implementation.
//!
//! # Features
//!
//! - **Messages API**: non-streaming calls to `/messages`
//! - **Tool Use**: tool definitions out, `tool_use` blocks back as [`ToolCall`]s
//! - **Automatic Retries**: exponential backoff plus `Retry-After` handling
//! - **Secure API Keys**: the key is a `SecretString` and is never logged
//!
//! # Example
//!
//! ```no_run
//! use jingpt_client::{AnthropicClient, LLMClient};
//! use jingpt_common::client::{ChatRequest, Config};
//! use jingpt_common::chat::Conversation;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::new("anthropic", "claude-sonnet-4-5")
//!     .with_api_key("sk-ant-...");
//!
//! let client = AnthropicClient::new(config)?;
//!
//! let mut conversation = Conversation::new();
//! conversation.add_message(conversation.system_message("You are a helpful assistant"))?;
//! conversation.add_message(conversation.user_message("Hello!"))?;
//!
//! let request = ChatRequest::new(conversation.get_messages().to_vec()).with_max_tokens(1024);
//! let response = client.chat(&request).await?;
//!
//! println!("Response: {}", response.message.content);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, warn};
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use reqwest_retry_after::RetryAfterMiddleware;
use secrecy::{ExposeSecret, SecretString};
use smallvec::SmallVec;
use uuid::Uuid;

use jingpt_common::chat::Message;
use jingpt_common::client::{ChatRequest, ChatResponse, Config, Usage};
use jingpt_common::tools::ToolCall;

use crate::LLMClient;
use crate::error::ClientError;

use super::{
    ANTHROPIC_VERSION, CreateMessageRequest, DEFAULT_BASE_URL, MessageResponse,
    ResponseContentBlock,
};

/// Client for Anthropic's Messages API.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct AnthropicClient {
    client: ClientWithMiddleware,
    api_key: Arc<SecretString>,
    base_url: String,
    config: Arc<Config>,
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AnthropicClient {
    /// Create a new Anthropic client from a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or HTTP client creation fails.
    pub fn new(config: Config) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ClientError::ConfigurationError("API key is required".to_string()))?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(
                config.retry_config.initial_delay,
                config.retry_config.max_delay,
            )
            .build_with_max_retries(u32::try_from(config.retry_config.max_retries).unwrap_or(3));

        let reqwest_client = match config.timeout_seconds {
            Some(timeout) => reqwest::Client::builder()
                .timeout(Duration::from_secs(timeout))
                .build()?,
            None => reqwest::Client::builder().build()?,
        };

        let client = reqwest_middleware::ClientBuilder::new(reqwest_client)
            .with(RetryAfterMiddleware::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            api_key: Arc::new(api_key),
            base_url,
            config: Arc::new(config),
        })
    }

    async fn make_request(&self, body: &CreateMessageRequest) -> Result<MessageResponse, ClientError> {
        let url = format!("{}/messages", self.base_url);

        reqwest::Url::parse(&url)
            .map_err(|e| ClientError::ConfigurationError(format!("Invalid URL '{url}': {e}")))?;

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .body(serde_json::to_string(body).map_err(ClientError::SerializationError)?)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            let error_text = response.text().await.map_err(|e| {
                warn!("Failed to read error response body: {e}");
                ClientError::NetworkError(e)
            })?;

            let error_message = match serde_json::from_str::<super::ErrorResponse>(&error_text) {
                Ok(parsed) => {
                    debug!("Parsed structured error response: {:?}", parsed.error);
                    parsed.error.message
                }
                Err(parse_err) => {
                    debug!(
                        "Failed to parse error response as JSON: {parse_err}. Using raw text instead."
                    );
                    error_text
                }
            };

            error!(
                "API request failed with status {}: {}",
                status.as_u16(),
                error_message
            );

            return Err(match status.as_u16() {
                401 | 403 => ClientError::AuthenticationError(error_message),
                400 => ClientError::InvalidRequest(error_message),
                429 => ClientError::RateLimitError { retry_after },
                500..=599 => ClientError::ServiceUnavailable(error_message),
                _ => ClientError::ModelError(error_message),
            });
        }

        let response_text = response.text().await?;
        debug!(
            "Raw API response: {}",
            &response_text.chars().take(500).collect::<String>()
        );

        serde_json::from_str(&response_text).map_err(ClientError::SerializationError)
    }

    /// Convert an Anthropic response to the internal assistant message.
    fn convert_response_to_message(response: &MessageResponse, conversation_id: Uuid) -> Message {
        let mut content = String::new();
        let mut tool_calls: SmallVec<[ToolCall; 2]> = SmallVec::new();

        for block in &response.content {
            match block {
                ResponseContentBlock::Text { text } => {
                    if !content.is_empty() {
                        content.push('\n');
                    }
                    content.push_str(text);
                }
                ResponseContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall::with_id(id, name, input.to_string()));
                }
                ResponseContentBlock::Unsupported => {}
            }
        }

        let mut message = Message::assistant(conversation_id, content);
        message.tool_calls = tool_calls;
        message
    }
}

#[async_trait]
impl LLMClient for AnthropicClient {
    fn config(&self) -> &Config {
        &self.config
    }

    fn supports_tools(&self) -> bool {
        true
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.validate_request(request)?;

        let anthropic_request = CreateMessageRequest::from((request, self.config.as_ref()));
        let response = self.make_request(&anthropic_request).await?;

        let conversation_id = request
            .messages
            .first()
            .ok_or_else(|| {
                error!("Request has no messages despite passing validation");
                ClientError::InvalidRequest("Request must contain at least one message".to_string())
            })?
            .conversation_id;

        let message = Self::convert_response_to_message(&response, conversation_id);
        debug!(
            "Anthropic turn {}: {} chars, {} tool calls",
            response.id,
            message.content.len(),
            message.tool_calls.len()
        );

        Ok(ChatResponse {
            message,
            model: response.model,
            usage: Some(Usage::from(response.usage)),
            finish_reason: response.stop_reason.map(Into::into),
            created_at: Utc::now(),
            response_id: Some(response.id),
        })
    }
}
