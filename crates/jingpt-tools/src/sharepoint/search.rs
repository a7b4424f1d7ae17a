use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::{Value, json};

use jingpt_common::{Function, Parameters, Property, SearchHit, Tool, ToolOutcome};

use super::GraphContext;
use crate::shaping::{classify_category, classify_file_type};
use crate::{ToolImplementation, http, optional_str, required_str};

// Graph caps a single search page at this size.
const GRAPH_MAX_PAGE: usize = 100;
// Over-fetch so the allow-list still leaves enough hits.
const OVERFETCH_FACTOR: usize = 3;

pub struct SearchSharePointTool {
    ctx: Arc<GraphContext>,
}

impl SearchSharePointTool {
    #[must_use]
    pub const fn new(ctx: Arc<GraphContext>) -> Self {
        Self { ctx }
    }

    async fn search(&self, query: &str) -> ToolOutcome {
        let url = self.ctx.url(&["search", "query"])?;
        let size = self
            .ctx
            .limits
            .max_hits
            .saturating_mul(OVERFETCH_FACTOR)
            .clamp(1, GRAPH_MAX_PAGE);
        let body = json!({
            "requests": [{
                "entityTypes": ["driveItem"],
                "query": { "queryString": query },
                "from": 0,
                "size": size,
            }]
        });

        let response: SearchResponse =
            http::fetch_json(self.ctx.post(url).json(&body), "SharePoint search").await?;

        let hits: Vec<SearchHit> = response
            .value
            .into_iter()
            .flat_map(|entry| entry.hits_containers)
            .flat_map(|container| container.hits)
            .filter_map(|hit| self.to_search_hit(hit.resource))
            .take(self.ctx.limits.max_hits)
            .collect();

        debug!("SharePoint search '{query}' returned {} allowed hits", hits.len());

        if hits.is_empty() {
            return Ok(json!({ "message": format!("no results for {query}") }));
        }

        Ok(json!({
            "query": query,
            "count": hits.len(),
            "results": hits,
        }))
    }

    fn to_search_hit(&self, item: DriveItem) -> Option<SearchHit> {
        let url = item.web_url?;
        if !self.ctx.filter.allows(&url) {
            return None;
        }
        let name = item.name.unwrap_or_default();
        let parent_path = item
            .parent_reference
            .as_ref()
            .and_then(|p| p.path.as_deref())
            .unwrap_or(&url);

        let hit = SearchHit::builder()
            .category(classify_category(&name, parent_path))
            .file_type(classify_file_type(&name))
            .name(name)
            .url(url);

        Some(match (
            item.parent_reference.and_then(|p| p.drive_id),
            item.id,
            item.last_modified_date_time,
        ) {
            (Some(drive_id), Some(item_id), Some(modified)) => hit
                .drive_id(drive_id)
                .item_id(item_id)
                .last_modified(modified)
                .build(),
            (Some(drive_id), Some(item_id), None) => hit.drive_id(drive_id).item_id(item_id).build(),
            (_, _, Some(modified)) => hit.last_modified(modified).build(),
            _ => hit.build(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<SearchResponseEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponseEntry {
    #[serde(default)]
    hits_containers: Vec<HitsContainer>,
}

#[derive(Debug, Deserialize)]
struct HitsContainer {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    resource: DriveItem,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItem {
    id: Option<String>,
    name: Option<String>,
    web_url: Option<String>,
    last_modified_date_time: Option<String>,
    parent_reference: Option<ParentReference>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParentReference {
    drive_id: Option<String>,
    path: Option<String>,
}

#[async_trait]
impl ToolImplementation for SearchSharePointTool {
    fn get_definition(&self) -> Tool {
        let properties = HashMap::from([(
            "query".to_string(),
            Property::string("Search terms, e.g. a company name plus 'cap table'"),
        )]);

        Tool::builder()
            .function(Function {
                name: "search_sharepoint".to_string(),
                description: "Search SharePoint for documents (cap tables, financials, contracts). \
                    Returns file names, types and the drive_id/item_id needed to read a file."
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
            "Searching SharePoint for \"{}\"",
            optional_str(args, "query").unwrap_or_default()
        )
    }
}
