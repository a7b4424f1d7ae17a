//! Application state shared across handlers.

use std::sync::Arc;

use jingpt::{LLMClient, SourcesConfig};

use crate::config::{AtlassianApp, ServerConfig};

/// Application state shared across all handlers.
///
/// Built once at startup and never mutated.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,

    /// The LLM client used by every request.
    pub llm: Arc<dyn LLMClient>,

    /// Pooled HTTP client for Graph, Confluence and Atlassian OAuth.
    pub http: reqwest::Client,

    /// Adapter configuration derived from `config`.
    pub sources: Arc<SourcesConfig>,

    /// Atlassian OAuth client (None when Confluence login is not configured).
    pub atlassian: Option<Arc<AtlassianApp>>,
}

impl AppState {
    /// Create a new application state.
    pub fn new(config: ServerConfig, llm: Arc<dyn LLMClient>, http: reqwest::Client) -> Self {
        Self {
            sources: Arc::new(config.sources()),
            config: Arc::new(config),
            llm,
            http,
            atlassian: None,
        }
    }

    /// Enables Atlassian login.
    #[must_use]
    pub fn with_atlassian(mut self, app: AtlassianApp) -> Self {
        self.atlassian = Some(Arc::new(app));
        self
    }
}
