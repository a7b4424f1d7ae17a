//! SharePoint adapters over Microsoft Graph.
//!
//! All three tools share one [`GraphContext`]: the pooled HTTP client, the
//! caller's Graph token, the path allow-list and the output caps.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use jingpt_common::{DocumentRef, Property, ToolFailure};

use crate::http;
use crate::shaping::{AdapterLimits, PathFilter};

mod pdf;
mod search;
mod workbook;

pub use pdf::ReadPdfTool;
pub use search::SearchSharePointTool;
pub use workbook::ReadExcelSheetTool;

pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

pub(crate) const SOURCE: &str = "sharepoint";

/// Request-scoped state shared by the SharePoint tools.
pub struct GraphContext {
    http: reqwest::Client,
    token: SecretString,
    base_url: String,
    limits: AdapterLimits,
    filter: PathFilter,
}

impl std::fmt::Debug for GraphContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphContext")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .field("limits", &self.limits)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl GraphContext {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        token: SecretString,
        base_url: impl Into<String>,
        limits: AdapterLimits,
        filter: PathFilter,
    ) -> Self {
        Self {
            http,
            token,
            base_url: base_url.into(),
            limits,
            filter,
        }
    }

    /// Builds `{base_url}/{segments...}`, percent-encoding each segment.
    fn url(&self, segments: &[&str]) -> Result<Url, ToolFailure> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            ToolFailure::invalid_input("Graph base URL is invalid").with_detail(e.to_string())
        })?;
        url.path_segments_mut()
            .map_err(|()| ToolFailure::invalid_input("Graph base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        self.http.get(url).bearer_auth(self.token.expose_secret())
    }

    fn post(&self, url: Url) -> reqwest::RequestBuilder {
        self.http.post(url).bearer_auth(self.token.expose_secret())
    }

    /// Fetches name and web URL of a drive item, for citations.
    async fn item_document(&self, drive_id: &str, item_id: &str) -> Result<DocumentRef, ToolFailure> {
        let url = self.url(&["drives", drive_id, "items", item_id])?;
        let item: ItemMetadata =
            http::fetch_json(self.get(url), "Reading SharePoint file metadata").await?;
        Ok(DocumentRef {
            title: item.name.unwrap_or_else(|| item_id.to_string()),
            url: item.web_url.unwrap_or_default(),
            source: SOURCE.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemMetadata {
    name: Option<String>,
    web_url: Option<String>,
}

/// Shared schema fragment for tools addressing one drive item.
fn item_properties() -> Vec<(String, Property)> {
    vec![
        (
            "drive_id".to_string(),
            Property::string("Drive id from a search_sharepoint result"),
        ),
        (
            "item_id".to_string(),
            Property::string("Item id from a search_sharepoint result"),
        ),
    ]
}

fn document_value(document: &DocumentRef) -> Value {
    json!({
        "title": document.title,
        "url": document.url,
        "source": document.source,
    })
}


#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::test_support::context;

    #[test]
    fn test_url_encodes_segments() {
        let ctx = context("https://graph.example.com/v1.0/");
        let url = ctx
            .url(&["drives", "b!x y", "items", "01AB", "workbook", "worksheets('Cap Table')"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://graph.example.com/v1.0/drives/b!x%20y/items/01AB/workbook/worksheets('Cap%20Table')"
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let debug = format!("{:?}", context("https://graph.example.com/v1.0"));
        assert!(!debug.contains("graph-token"));
        assert!(debug.contains("[REDACTED]"));
    }
}
