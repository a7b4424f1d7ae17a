//! HTTP routes.

pub mod auth;
pub mod chat;
pub mod health;

pub use chat::{ChatBody, FrameSink, chat};
pub use health::{HealthResponse, health};
