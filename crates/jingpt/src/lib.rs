//! # jingpt
//!
//! Tool-use orchestration for the JinGPT document assistant.
//!
//! A question goes through [`Core::run`]: the model is called with the
//! conversation and the request's tools, every tool call it makes is
//! dispatched, and the results go back to the model until it answers or the
//! round cap is reached. [`answer::assemble`] then turns the run into the
//! answer and citations the user sees.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use jingpt::{Core, InboundMessage, Conversation};
//! use jingpt::answer::assemble;
//! use jingpt::prompt::{Sources, system_prompt};
//! use jingpt_client::{AnthropicClient, LLMClient};
//! use jingpt_common::Config;
//! use jingpt_tools::ToolExecutor;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client: Arc<dyn LLMClient> = Arc::new(AnthropicClient::new(Config::default())?);
//! let core = Core::new(client).with_max_rounds(8);
//!
//! let conversation = Conversation::from_inbound(vec![InboundMessage::user("Acme cap table?")])?;
//! let prompt = system_prompt(Sources { confluence: false }, chrono::Utc::now().date_naive());
//!
//! let outcome = core.run(&ToolExecutor::new(), &prompt, conversation).await?;
//! let answer = assemble(&outcome);
//! println!("{:?}", answer.content);
//! # Ok(())
//! # }
//! ```

pub mod answer;
pub mod core;
pub mod error;
pub mod events;
pub mod history;
pub mod prompt;

pub use jingpt_client::*;
pub use jingpt_common::*;
pub use jingpt_tools::*;

pub use crate::core::{Core, DEFAULT_MAX_ROUNDS, RunOutcome};
pub use error::CoreError;
pub use events::{CoreEvent, EventCallback};
