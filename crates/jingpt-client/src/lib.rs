//! # jingpt-client
//!
//! Client library for the LLM provider behind JinGPT.
//!
//! The [`LLMClient`] trait is the seam the orchestration loop calls through;
//! [`AnthropicClient`] implements it against the Anthropic Messages API with
//! tool use and retry middleware.
//!
//! ## Example
//!
//! ```no_run
//! use jingpt_client::{AnthropicClient, LLMClient};
//! use jingpt_common::{ChatRequest, Config, Message};
//! use uuid::Uuid;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::new("anthropic", "claude-sonnet-4-5")
//!     .with_api_key("sk-ant-...")
//!     .with_max_tokens(4096);
//!
//! let client = AnthropicClient::new(config)?;
//!
//! let message = Message::user(Uuid::new_v4(), "Hello!");
//! let request: ChatRequest = (client.config(), vec![message]).into();
//!
//! let response = client.chat(&request).await?;
//! println!("Response: {}", response.message.content);
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use async_trait::async_trait;

use jingpt_common::{ChatRequest, ChatResponse, Config};

pub mod anthropic;
pub mod error;

pub use anthropic::AnthropicClient;
pub use error::ClientError;

/// Trait for LLM client implementations.
///
/// Implementations must be thread-safe: one client is built at startup and
/// shared by every request.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Get the client's configuration.
    fn config(&self) -> &Config;

    /// Send a chat completion request to the LLM.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The request fails validation
    /// - Network communication fails
    /// - The API returns an error (authentication, rate limit, etc.)
    /// - The response cannot be parsed
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Check if the client supports tool/function calling.
    fn supports_tools(&self) -> bool;

    /// Validate a configuration object.
    ///
    /// # Errors
    ///
    /// Returns an error if the temperature is out of range.
    fn validate_config(&self, config: &Config) -> Result<()> {
        if config
            .temperature
            .is_some_and(|t| !(0.0..=1.0).contains(&t))
        {
            return Err(ClientError::InvalidTemperature.into());
        }

        Ok(())
    }

    /// Validate a chat request before sending.
    ///
    /// # Errors
    ///
    /// Returns an error if the request is malformed or asks for tools the
    /// client cannot use.
    fn validate_request(&self, request: &ChatRequest) -> Result<()> {
        request
            .validate()
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;

        if !self.supports_tools() && request.has_tools() {
            return Err(ClientError::ToolsNotSupported.into());
        }

        Ok(())
    }
}
