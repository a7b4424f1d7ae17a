//! Server configuration.
//!
//! Configuration is loaded from a TOML file, `jingpt.toml` by default.
//! Secrets never appear in the file: it names the environment variables
//! that hold them.
//!
//! ## Example Configuration
//!
//! ```toml
//! bind = "0.0.0.0:8080"
//! public_url = "https://jingpt.example.com"
//!
//! [model]
//! provider = "anthropic"
//! model = "claude-sonnet-4-5"
//! api_key_env = "ANTHROPIC_API_KEY"
//! max_tokens = 4096
//!
//! [orchestration]
//! max_rounds = 8
//! history_window = 20
//!
//! [sharepoint]
//! allowed_paths = ["/sites/Portfolio/"]
//!
//! [confluence]
//! site_hint = "acme"
//!
//! [atlassian]
//! client_id_env = "ATLASSIAN_CLIENT_ID"
//! client_secret_env = "ATLASSIAN_CLIENT_SECRET"
//! ```

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use jingpt::history::DEFAULT_HISTORY_WINDOW;
use jingpt::{AdapterLimits, DEFAULT_MAX_ROUNDS, SourcesConfig};
use jingpt_common::Config;
use jingpt_tools::confluence::DEFAULT_API_BASE_URL;
use jingpt_tools::sharepoint::DEFAULT_GRAPH_BASE_URL;

use crate::error::{Result, ServerError};

// Upper bounds for `[limits]`; both upstream search APIs page at 100.
const MAX_SEARCH_HITS: usize = 100;
const MAX_SHEET_ROWS: usize = 10_000;
const MAX_DOCUMENT_CHARS: usize = 1_000_000;
const MAX_EXCERPT_CHARS: usize = 10_000;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "jingpt.toml";

const SUPPORTED_PROVIDERS: &[&str] = &["anthropic"];

/// Server configuration loaded from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub bind: SocketAddr,

    /// Externally visible base URL, used for OAuth redirects and to decide
    /// whether cookies are marked `Secure`.
    pub public_url: String,

    pub model: ModelConfig,
    pub orchestration: OrchestrationConfig,
    pub sharepoint: SharePointConfig,
    pub confluence: ConfluenceConfig,
    pub atlassian: AtlassianConfig,
    pub limits: AdapterLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            public_url: "http://localhost:8080".to_string(),
            model: ModelConfig::default(),
            orchestration: OrchestrationConfig::default(),
            sharepoint: SharePointConfig::default(),
            confluence: ConfluenceConfig::default(),
            atlassian: AtlassianConfig::default(),
            limits: AdapterLimits::default(),
        }
    }
}

/// The LLM the loop talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            max_tokens: 4096,
            timeout_seconds: 120,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Cap on tool rounds per request.
    pub max_rounds: usize,
    /// Number of inbound messages replayed to the model.
    pub history_window: usize,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharePointConfig {
    pub graph_base_url: String,
    /// URL fragments a search hit must contain; empty allows every hit.
    pub allowed_paths: Vec<String>,
}

impl Default for SharePointConfig {
    fn default() -> Self {
        Self {
            graph_base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            allowed_paths: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfluenceConfig {
    pub api_base_url: String,
    /// Preferred Atlassian site when the token reaches several.
    pub site_hint: Option<String>,
}

impl Default for ConfluenceConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            site_hint: None,
        }
    }
}

/// Atlassian OAuth 2.0 (3LO) application settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlassianConfig {
    pub client_id_env: String,
    pub client_secret_env: String,
    pub authorize_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
}

impl Default for AtlassianConfig {
    fn default() -> Self {
        Self {
            client_id_env: "ATLASSIAN_CLIENT_ID".to_string(),
            client_secret_env: "ATLASSIAN_CLIENT_SECRET".to_string(),
            authorize_url: "https://auth.atlassian.com/authorize".to_string(),
            token_url: "https://auth.atlassian.com/oauth/token".to_string(),
            scopes: [
                "read:confluence-space.summary",
                "read:confluence-content.all",
                "read:confluence-content.summary",
                "search:confluence",
                "offline_access",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

/// Resolved Atlassian OAuth client, secrets included.
#[derive(Debug, Clone)]
pub struct AtlassianApp {
    pub client_id: String,
    pub client_secret: SecretString,
    pub authorize_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    pub redirect_uri: String,
}

impl ServerConfig {
    /// Loads and validates the configuration at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, does not parse, or
    /// fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ServerError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Parses and validates a configuration document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not parse or fails validation.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `max_rounds` or `history_window` is zero
    /// - The provider is not supported
    /// - The model name is empty
    /// - `public_url` is not an absolute URL
    pub fn validate(&self) -> Result<()> {
        if self.orchestration.max_rounds == 0 {
            return Err(ServerError::Config(
                "orchestration.max_rounds must be at least 1".to_string(),
            ));
        }

        if self.orchestration.history_window == 0 {
            return Err(ServerError::Config(
                "orchestration.history_window must be at least 1".to_string(),
            ));
        }

        if !SUPPORTED_PROVIDERS.contains(&self.model.provider.as_str()) {
            return Err(ServerError::Config(format!(
                "Unsupported model provider '{}' (supported: {})",
                self.model.provider,
                SUPPORTED_PROVIDERS.join(", ")
            )));
        }

        if self.model.model.trim().is_empty() {
            return Err(ServerError::Config("model.model cannot be empty".to_string()));
        }

        url::Url::parse(&self.public_url)
            .map_err(|e| ServerError::Config(format!("Invalid public_url: {e}")))?;

        self.validate_limits()
    }

    fn validate_limits(&self) -> Result<()> {
        let limits = &self.limits;
        let checks = [
            ("max_hits", limits.max_hits, MAX_SEARCH_HITS),
            ("sheet_rows", limits.sheet_rows, MAX_SHEET_ROWS),
            ("document_chars", limits.document_chars, MAX_DOCUMENT_CHARS),
            ("excerpt_chars", limits.excerpt_chars, MAX_EXCERPT_CHARS),
            (
                "confluence_max_results",
                limits.confluence_max_results,
                MAX_SEARCH_HITS,
            ),
        ];

        for (name, value, max) in checks {
            if value == 0 || value > max {
                return Err(ServerError::Config(format!(
                    "limits.{name} must be between 1 and {max} (got {value})"
                )));
            }
        }

        Ok(())
    }

    /// Whether cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.public_url.starts_with("https://")
    }

    /// Builds the LLM client configuration, reading the API key through `env`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key variable is unset or empty.
    pub fn client_config(&self, env: impl Fn(&str) -> Option<String>) -> Result<Config> {
        let api_key = env(&self.model.api_key_env)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                ServerError::Config(format!(
                    "API key not found: set {}",
                    self.model.api_key_env
                ))
            })?;

        let mut config = Config::new(&self.model.provider, &self.model.model)
            .with_api_key(api_key)
            .with_max_tokens(self.model.max_tokens)
            .with_timeout(self.model.timeout_seconds);
        if let Some(base_url) = &self.model.base_url {
            config = config.with_base_url(base_url);
        }
        Ok(config)
    }

    /// Resolves the Atlassian OAuth client, reading its secrets through `env`.
    ///
    /// Returns `None` when either variable is unset: Confluence login is
    /// then unavailable, SharePoint still works.
    pub fn atlassian_app(&self, env: impl Fn(&str) -> Option<String>) -> Option<AtlassianApp> {
        let present = |name: &str| env(name).filter(|v| !v.trim().is_empty());
        let client_id = present(&self.atlassian.client_id_env)?;
        let client_secret = present(&self.atlassian.client_secret_env)?;

        Some(AtlassianApp {
            client_id,
            client_secret: SecretString::from(client_secret),
            authorize_url: self.atlassian.authorize_url.clone(),
            token_url: self.atlassian.token_url.clone(),
            scopes: self.atlassian.scopes.clone(),
            redirect_uri: format!(
                "{}/api/auth/atlassian/callback",
                self.public_url.trim_end_matches('/')
            ),
        })
    }

    /// The adapter configuration shared by every request.
    #[must_use]
    pub fn sources(&self) -> SourcesConfig {
        SourcesConfig {
            graph_base_url: self.sharepoint.graph_base_url.clone(),
            allowed_paths: self.sharepoint.allowed_paths.clone(),
            confluence_api_base_url: self.confluence.api_base_url.clone(),
            site_hint: self.confluence.site_hint.clone(),
            limits: self.limits,
        }
    }
}
