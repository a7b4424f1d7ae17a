//! Confluence adapters over the Atlassian Cloud REST API.
//!
//! Atlassian tokens are not bound to one site, so each request first asks
//! which sites the token can reach and picks one. The choice is cached in
//! the [`ConfluenceContext`] for the rest of that request only.

use log::{debug, warn};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use url::Url;

use jingpt_common::{DocumentRef, ToolErrorKind, ToolFailure};

use crate::http;
use crate::shaping::AdapterLimits;

mod page;
mod search;

pub use page::ReadConfluencePageTool;
pub use search::SearchConfluenceTool;

pub const DEFAULT_API_BASE_URL: &str = "https://api.atlassian.com";

const SOURCE: &str = "confluence";
const CONTENT_EXPAND: &str = "body.storage,space,version";
const RECONNECT_MESSAGE: &str =
    "Could not connect to Confluence. Please reconnect your Atlassian account and try again.";

/// A Confluence site the token can reach.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Site {
    /// Cloud id used in API paths.
    pub id: String,
    /// Browser URL, e.g. `https://acme.atlassian.net`.
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Request-scoped state shared by the Confluence tools.
pub struct ConfluenceContext {
    http: reqwest::Client,
    token: SecretString,
    api_base: String,
    site_hint: Option<String>,
    limits: AdapterLimits,
    site: OnceCell<Site>,
}

impl std::fmt::Debug for ConfluenceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfluenceContext")
            .field("api_base", &self.api_base)
            .field("token", &"[REDACTED]")
            .field("site_hint", &self.site_hint)
            .field("site", &self.site.get())
            .finish_non_exhaustive()
    }
}

/// Picks the site whose URL contains `hint`, else the first one.
fn choose_site(sites: Vec<Site>, hint: Option<&str>) -> Option<Site> {
    let hint = hint.map(str::to_lowercase).filter(|h| !h.is_empty());
    if let Some(hint) = hint {
        if let Some(site) = sites.iter().find(|s| s.url.to_lowercase().contains(&hint)) {
            return Some(site.clone());
        }
        debug!("No Atlassian site matches '{hint}', using the first one");
    }
    sites.into_iter().next()
}

impl ConfluenceContext {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        token: SecretString,
        api_base: impl Into<String>,
        site_hint: Option<String>,
        limits: AdapterLimits,
    ) -> Self {
        Self {
            http,
            token,
            api_base: api_base.into(),
            site_hint,
            limits,
            site: OnceCell::new(),
        }
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .bearer_auth(self.token.expose_secret())
            .header(reqwest::header::ACCEPT, "application/json")
    }

    fn api_url(&self, segments: &[&str]) -> Result<Url, ToolFailure> {
        let mut url = Url::parse(&self.api_base).map_err(|e| {
            ToolFailure::invalid_input("Atlassian API base URL is invalid").with_detail(e.to_string())
        })?;
        url.path_segments_mut()
            .map_err(|()| ToolFailure::invalid_input("Atlassian API base URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// The site for this request, resolved on first use.
    ///
    /// # Errors
    /// Returns `unauthorized` with a reconnect message if the sites cannot
    /// be listed or the token reaches none.
    pub async fn site(&self) -> Result<&Site, ToolFailure> {
        self.site.get_or_try_init(|| self.resolve_site()).await
    }

    async fn resolve_site(&self) -> Result<Site, ToolFailure> {
        let url = self.api_url(&["oauth", "token", "accessible-resources"])?;
        let sites: Vec<Site> = http::fetch_json(self.get(url), "Listing Atlassian sites")
            .await
            .map_err(|failure| {
                warn!("Atlassian site lookup failed: {failure}");
                ToolFailure::new(ToolErrorKind::Unauthorized, RECONNECT_MESSAGE)
                    .with_detail(failure.to_string())
            })?;

        let site = choose_site(sites, self.site_hint.as_deref()).ok_or_else(|| {
            ToolFailure::new(ToolErrorKind::Unauthorized, RECONNECT_MESSAGE)
                .with_detail("token has no accessible Confluence sites")
        })?;
        debug!("Using Atlassian site {} ({})", site.url, site.id);
        Ok(site)
    }

    /// `{api_base}/ex/confluence/{cloud_id}/wiki/rest/api/content/{segments...}`
    fn content_url(&self, site: &Site, segments: &[&str]) -> Result<Url, ToolFailure> {
        let mut all = vec!["ex", "confluence", site.id.as_str(), "wiki", "rest", "api", "content"];
        all.extend_from_slice(segments);
        self.api_url(&all)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ContentPage {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default, rename = "type")]
    content_type: String,
    #[serde(default)]
    space: Option<Space>,
    #[serde(default)]
    version: Option<Version>,
    #[serde(default)]
    body: Option<Body>,
    #[serde(default, rename = "_links")]
    links: Option<Links>,
}

#[derive(Debug, Default, Deserialize)]
struct Space {
    #[serde(default)]
    name: String,
    #[serde(default)]
    key: String,
}

#[derive(Debug, Default, Deserialize)]
struct Version {
    when: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Body {
    storage: Option<Storage>,
}

#[derive(Debug, Default, Deserialize)]
struct Storage {
    #[serde(default)]
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    webui: Option<String>,
}

impl ContentPage {
    fn web_url(&self, site: &Site) -> String {
        format!(
            "{}/wiki{}",
            site.url.trim_end_matches('/'),
            self.links.as_ref().and_then(|l| l.webui.as_deref()).unwrap_or_default()
        )
    }

    fn storage_html(&self) -> &str {
        self.body
            .as_ref()
            .and_then(|b| b.storage.as_ref())
            .map_or("", |s| s.value.as_str())
    }

    fn space_name(&self) -> &str {
        self.space.as_ref().map_or("", |s| s.name.as_str())
    }

    fn space_key(&self) -> &str {
        self.space.as_ref().map_or("", |s| s.key.as_str())
    }

    fn last_modified(&self) -> Option<&str> {
        self.version.as_ref().and_then(|v| v.when.as_deref())
    }

    fn document(&self, site: &Site) -> DocumentRef {
        DocumentRef {
            title: self.title.clone(),
            url: self.web_url(site),
            source: SOURCE.to_string(),
        }
    }
}

fn document_value(document: &DocumentRef) -> Value {
    json!({
        "title": document.title,
        "url": document.url,
        "source": document.source,
    })
}
