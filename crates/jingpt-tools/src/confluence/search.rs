use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::{Value, json};

use jingpt_common::{Function, Parameters, Property, Tool, ToolOutcome};

use super::{CONTENT_EXPAND, ConfluenceContext, ContentPage};
use crate::shaping::{strip_html, truncate_chars};
use crate::{ToolImplementation, http, optional_str, required_str};

pub struct SearchConfluenceTool {
    ctx: Arc<ConfluenceContext>,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    results: Vec<ContentPage>,
}

/// Quotes `text` as a CQL string literal.
fn cql_string(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn build_cql(query: &str) -> String {
    let quoted = cql_string(query);
    format!("text ~ {quoted} OR title ~ {quoted}")
}

impl SearchConfluenceTool {
    #[must_use]
    pub const fn new(ctx: Arc<ConfluenceContext>) -> Self {
        Self { ctx }
    }

    async fn search(&self, query: &str) -> ToolOutcome {
        let site = self.ctx.site().await?;
        let url = self.ctx.content_url(site, &["search"])?;
        let limit = self.ctx.limits.confluence_max_results.to_string();
        let request = self.ctx.get(url).query(&[
            ("cql", build_cql(query).as_str()),
            ("limit", limit.as_str()),
            ("expand", CONTENT_EXPAND),
        ]);

        let response: SearchResults = http::fetch_json(request, "Confluence search").await?;
        debug!("Confluence search '{query}' returned {} pages", response.results.len());

        if response.results.is_empty() {
            return Ok(json!({ "message": format!("no results for {query}") }));
        }

        let results: Vec<Value> = response
            .results
            .iter()
            .take(self.ctx.limits.confluence_max_results)
            .map(|page| {
                let (excerpt, _) =
                    truncate_chars(&strip_html(page.storage_html()), self.ctx.limits.excerpt_chars);
                json!({
                    "id": page.id,
                    "title": page.title,
                    "type": page.content_type,
                    "space": page.space_name(),
                    "space_key": page.space_key(),
                    "url": page.web_url(site),
                    "last_modified": page.last_modified(),
                    "excerpt": excerpt,
                })
            })
            .collect();

        Ok(json!({
            "query": query,
            "count": results.len(),
            "results": results,
        }))
    }
}

#[async_trait]
impl ToolImplementation for SearchConfluenceTool {
    fn get_definition(&self) -> Tool {
        let properties = HashMap::from([(
            "query".to_string(),
            Property::string("Search terms, e.g. a company or project name"),
        )]);

        Tool::builder()
            .function(Function {
                name: "search_confluence".to_string(),
                description: "Search Confluence wiki pages (investment memos, meeting notes, \
                    company profiles). Returns page ids, titles and short excerpts."
                    .to_string(),
                parameters: Parameters::new(properties, vec!["query".to_string()]).into(),
            })
            .build()
    }

    async fn execute(&self, args: &Value) -> ToolOutcome {
        let query = required_str(args, "query")?;
        self.search(query).await
    }

    fn status_message(&self, args: &Value) -> String {
        format!(
            "Searching Confluence for \"{}\"",
            optional_str(args, "query").unwrap_or_default()
        )
    }
}
