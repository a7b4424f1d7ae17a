use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use jingpt_common::{Function, Parameters, Property, Tool, ToolOutcome};

use super::{CONTENT_EXPAND, ConfluenceContext, ContentPage, document_value};
use crate::shaping::{strip_html, truncate_chars};
use crate::{ToolImplementation, http, required_str};

pub struct ReadConfluencePageTool {
    ctx: Arc<ConfluenceContext>,
}

impl ReadConfluencePageTool {
    #[must_use]
    pub const fn new(ctx: Arc<ConfluenceContext>) -> Self {
        Self { ctx }
    }

    async fn read(&self, page_id: &str) -> ToolOutcome {
        let site = self.ctx.site().await?;
        let url = self.ctx.content_url(site, &[page_id])?;
        let request = self.ctx.get(url).query(&[("expand", CONTENT_EXPAND)]);
        let page: ContentPage = http::fetch_json(request, "Reading Confluence page").await?;

        let (text, truncated) =
            truncate_chars(&strip_html(page.storage_html()), self.ctx.limits.document_chars);
        let document = page.document(site);

        Ok(json!({
            "title": page.title,
            "space": page.space_name(),
            "url": document.url,
            "last_modified": page.last_modified(),
            "text": text,
            "truncated": truncated,
            "document": document_value(&document),
        }))
    }
}

#[async_trait]
impl ToolImplementation for ReadConfluencePageTool {
    fn get_definition(&self) -> Tool {
        let properties = HashMap::from([(
            "page_id".to_string(),
            Property::string("Page id from a search_confluence result"),
        )]);

        Tool::builder()
            .function(Function {
                name: "read_confluence_page".to_string(),
                description: "Read the full text of a Confluence page.".to_string(),
                parameters: Parameters::new(properties, vec!["page_id".to_string()]).into(),
            })
            .build()
    }

    async fn execute(&self, args: &Value) -> ToolOutcome {
        let page_id = required_str(args, "page_id")?;
        self.read(page_id).await
    }

    fn status_message(&self, _args: &Value) -> String {
        "Reading Confluence page".to_string()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::confluence::test_support::{CLOUD_ID, context, mount_sites};
    use crate::shaping::AdapterLimits;
    use jingpt_common::ToolErrorKind;
    use secrecy::SecretString;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn page_path(id: &str) -> String {
        format!("/ex/confluence/{CLOUD_ID}/wiki/rest/api/content/{id}")
    }

    #[tokio::test]
    async fn test_read_page_strips_storage_format() {
        let server = MockServer::start().await;
        mount_sites(&server).await;
        Mock::given(method("GET"))
            .and(path(page_path("42")))
            .and(query_param("expand", "body.storage,space,version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "42",
                "title": "Acme Investment Memo",
                "space": {"name": "Investments", "key": "INV"},
                "version": {"when": "2024-03-02T10:00:00.000Z"},
                "body": {"storage": {"value":
                    "<h2>Terms</h2><ac:structured-macro ac:name=\"info\"><ac:parameter ac:name=\"title\">Note</ac:parameter></ac:structured-macro><p>Pre-money &amp; post-money: $80M / $100M</p>"
                }},
                "_links": {"webui": "/spaces/INV/pages/42"}
            })))
            .mount(&server)
            .await;

        let tool = ReadConfluencePageTool::new(Arc::new(context(&server.uri(), Some("acme"))));
        let value = tool.execute(&json!({"page_id": "42"})).await.unwrap();

        assert_eq!(value["title"], "Acme Investment Memo");
        assert_eq!(value["space"], "Investments");
        assert_eq!(value["text"], "Terms\nPre-money & post-money: $80M / $100M");
        assert_eq!(value["truncated"], false);
        assert_eq!(value["document"]["source"], "confluence");
        assert_eq!(
            value["document"]["url"],
            "https://acme.atlassian.net/wiki/spaces/INV/pages/42"
        );
    }

    #[tokio::test]
    async fn test_read_page_truncates() {
        let server = MockServer::start().await;
        mount_sites(&server).await;
        Mock::given(method("GET"))
            .and(path(page_path("7")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "7",
                "title": "Long",
                "body": {"storage": {"value": format!("<p>{}</p>", "x".repeat(500))}}
            })))
            .mount(&server)
            .await;

        let ctx = ConfluenceContext::new(
            reqwest::Client::new(),
            SecretString::from("atlassian-token"),
            server.uri(),
            Some("acme".to_string()),
            AdapterLimits {
                document_chars: 100,
                ..AdapterLimits::default()
            },
        );
        let tool = ReadConfluencePageTool::new(Arc::new(ctx));
        let value = tool.execute(&json!({"page_id": "7"})).await.unwrap();
        assert_eq!(value["text"].as_str().unwrap().len(), 100);
        assert_eq!(value["truncated"], true);
    }

    #[tokio::test]
    async fn test_read_missing_page() {
        let server = MockServer::start().await;
        mount_sites(&server).await;
        Mock::given(method("GET"))
            .and(path(page_path("999")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tool = ReadConfluencePageTool::new(Arc::new(context(&server.uri(), Some("acme"))));
        let failure = tool.execute(&json!({"page_id": "999"})).await.unwrap_err();
        assert_eq!(failure.kind, ToolErrorKind::NotFound);
    }
}
