//! Per-request tool wiring.
//!
//! The tool set depends on which credentials the request carries:
//! SharePoint tools are always present, Confluence tools only when an
//! Atlassian token is available.

use std::sync::Arc;

use log::debug;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::confluence::{self, ConfluenceContext, ReadConfluencePageTool, SearchConfluenceTool};
use crate::shaping::{AdapterLimits, PathFilter};
use crate::sharepoint::{self, GraphContext, ReadExcelSheetTool, ReadPdfTool, SearchSharePointTool};
use crate::{RegistryError, ToolExecutor};

/// Static adapter configuration, shared by every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub graph_base_url: String,
    /// URL fragments a SharePoint hit must contain; empty allows all.
    pub allowed_paths: Vec<String>,
    pub confluence_api_base_url: String,
    /// Preferred Atlassian site, matched against the site URL.
    pub site_hint: Option<String>,
    pub limits: AdapterLimits,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            graph_base_url: sharepoint::DEFAULT_GRAPH_BASE_URL.to_string(),
            allowed_paths: Vec::new(),
            confluence_api_base_url: confluence::DEFAULT_API_BASE_URL.to_string(),
            site_hint: None,
            limits: AdapterLimits::default(),
        }
    }
}

/// Tokens carried by one request.
#[derive(Debug, Clone)]
pub struct SourceCredentials {
    pub graph_token: SecretString,
    pub atlassian_token: Option<SecretString>,
}

impl SourceCredentials {
    #[must_use]
    pub const fn confluence_connected(&self) -> bool {
        self.atlassian_token.is_some()
    }
}

/// Builds the executor for one request.
///
/// # Errors
/// Returns [`RegistryError`] if two tools share a name.
pub fn build_executor(
    http: &reqwest::Client,
    config: &SourcesConfig,
    credentials: SourceCredentials,
) -> Result<ToolExecutor, RegistryError> {
    let mut executor = ToolExecutor::new();

    let graph = Arc::new(GraphContext::new(
        http.clone(),
        credentials.graph_token,
        config.graph_base_url.clone(),
        config.limits,
        PathFilter::new(&config.allowed_paths),
    ));
    executor.add_tool(SearchSharePointTool::new(Arc::clone(&graph)))?;
    executor.add_tool(ReadExcelSheetTool::new(Arc::clone(&graph)))?;
    executor.add_tool(ReadPdfTool::new(graph))?;

    if let Some(token) = credentials.atlassian_token {
        let confluence = Arc::new(ConfluenceContext::new(
            http.clone(),
            token,
            config.confluence_api_base_url.clone(),
            config.site_hint.clone(),
            config.limits,
        ));
        executor.add_tool(SearchConfluenceTool::new(Arc::clone(&confluence)))?;
        executor.add_tool(ReadConfluencePageTool::new(confluence))?;
    }

    debug!("Tool set for request: {:?}", executor.tool_names());
    Ok(executor)
}
