use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::{Value, json};

use jingpt_common::{Function, Parameters, Tool, ToolErrorKind, ToolFailure, ToolOutcome};

use super::{GraphContext, document_value, item_properties};
use crate::shaping::{normalize_whitespace, truncate_chars};
use crate::{ToolImplementation, http, required_str};

pub struct ReadPdfTool {
    ctx: Arc<GraphContext>,
}

fn parse_failed(detail: impl Into<String>) -> ToolFailure {
    ToolFailure::new(ToolErrorKind::Parse, "parse failed").with_detail(detail)
}

/// Extracts text off the async runtime.
///
/// The extractor can panic on malformed input; a panic surfaces as a
/// `JoinError` and is reported like any other parse failure.
async fn extract_text(bytes: Vec<u8>) -> Result<String, ToolFailure> {
    match tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes)).await {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(parse_failed(e.to_string())),
        Err(e) => {
            warn!("PDF extraction task failed: {e}");
            Err(parse_failed(format!("extractor aborted: {e}")))
        }
    }
}

impl ReadPdfTool {
    #[must_use]
    pub const fn new(ctx: Arc<GraphContext>) -> Self {
        Self { ctx }
    }

    async fn read(&self, drive_id: &str, item_id: &str) -> ToolOutcome {
        let document = self.ctx.item_document(drive_id, item_id).await?;
        let url = self.ctx.url(&["drives", drive_id, "items", item_id, "content"])?;
        let bytes = http::fetch_bytes(self.ctx.get(url), "Downloading PDF").await?;
        debug!("Downloaded {} bytes for PDF '{}'", bytes.len(), document.title);

        let text = normalize_whitespace(&extract_text(bytes).await?);
        let (text, truncated) = truncate_chars(&text, self.ctx.limits.document_chars);

        Ok(json!({
            "file": document.title,
            "text": text,
            "truncated": truncated,
            "document": document_value(&document),
        }))
    }
}

#[async_trait]
impl ToolImplementation for ReadPdfTool {
    fn get_definition(&self) -> Tool {
        let properties: HashMap<_, _> = item_properties().into_iter().collect();
        Tool::builder()
            .function(Function {
                name: "read_pdf".to_string(),
                description: "Read the text of a PDF file from SharePoint (contracts, reports)."
                    .to_string(),
                parameters: Parameters::new(
                    properties,
                    vec!["drive_id".to_string(), "item_id".to_string()],
                )
                .into(),
            })
            .build()
    }

    async fn execute(&self, args: &Value) -> ToolOutcome {
        let drive_id = required_str(args, "drive_id")?;
        let item_id = required_str(args, "item_id")?;
        self.read(drive_id, item_id).await
    }

    fn status_message(&self, _args: &Value) -> String {
        "Reading PDF document".to_string()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::shaping::{AdapterLimits, PathFilter};
    use crate::sharepoint::test_support::{context, context_with};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_item(server: &MockServer, content: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path("/drives/d1/items/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "Acme SHA.pdf",
                "webUrl": "https://t.sharepoint.com/sites/Portfolio/Acme%20SHA.pdf"
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/drives/d1/items/p1/content"))
            .respond_with(content)
            .mount(server)
            .await;
    }

    const AGREEMENT_TEXT: &str = "Acme Holdings shareholders agreement. Drag along rights apply.";

    /// A one-page PDF showing `text` in Helvetica, with a valid xref table.
    fn single_page_pdf(text: &str) -> Vec<u8> {
        let content = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
             /Resources << /Font << /F1 5 0 R >> >> >>"
                .to_string(),
            format!("<< /Length {} >>\nstream\n{content}\nendstream", content.len()),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
                .to_string(),
        ];

        let mut pdf = String::from("%PDF-1.4\n");
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.push_str(&format!("{} 0 obj\n{body}\nendobj\n", i + 1));
        }
        let xref = pdf.len();
        pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
        for offset in offsets {
            pdf.push_str(&format!("{offset:010} 00000 n \n"));
        }
        pdf.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
            objects.len() + 1
        ));
        pdf.into_bytes()
    }

    #[tokio::test]
    async fn test_reads_pdf_text() {
        let server = MockServer::start().await;
        mount_item(
            &server,
            ResponseTemplate::new(200).set_body_bytes(single_page_pdf(AGREEMENT_TEXT)),
        )
        .await;

        let tool = ReadPdfTool::new(Arc::new(context(&server.uri())));
        let value = tool
            .execute(&json!({"drive_id": "d1", "item_id": "p1"}))
            .await
            .unwrap();

        assert_eq!(value["file"], "Acme SHA.pdf");
        assert!(value["text"].as_str().unwrap().contains("Drag along rights"));
        assert_eq!(value["truncated"], false);
        assert_eq!(value["document"]["source"], "sharepoint");
    }

    #[tokio::test]
    async fn test_pdf_text_truncated_to_document_limit() {
        let server = MockServer::start().await;
        mount_item(
            &server,
            ResponseTemplate::new(200).set_body_bytes(single_page_pdf(AGREEMENT_TEXT)),
        )
        .await;

        let limits = AdapterLimits {
            document_chars: 20,
            ..AdapterLimits::default()
        };
        let ctx = context_with(&server.uri(), limits, PathFilter::default());
        let tool = ReadPdfTool::new(Arc::new(ctx));
        let value = tool
            .execute(&json!({"drive_id": "d1", "item_id": "p1"}))
            .await
            .unwrap();

        let text = value["text"].as_str().unwrap();
        assert_eq!(text.chars().count(), 20);
        assert!(text.starts_with("Acme"));
        assert_eq!(value["truncated"], true);
    }

    #[tokio::test]
    async fn test_unparseable_pdf_is_parse_failure() {
        let server = MockServer::start().await;
        mount_item(
            &server,
            ResponseTemplate::new(200).set_body_bytes(b"this is not a pdf at all".to_vec()),
        )
        .await;

        let tool = ReadPdfTool::new(Arc::new(context(&server.uri())));
        let failure = tool
            .execute(&json!({"drive_id": "d1", "item_id": "p1"}))
            .await
            .unwrap_err();

        assert_eq!(failure.kind, ToolErrorKind::Parse);
        assert_eq!(failure.message, "parse failed");
        assert!(failure.detail.is_some());
        let rendered = failure.to_value();
        assert_eq!(rendered["error"], "parse failed");
        assert_eq!(rendered["kind"], "parse");
    }

    #[tokio::test]
    async fn test_download_error_is_classified() {
        let server = MockServer::start().await;
        mount_item(&server, ResponseTemplate::new(403)).await;

        let tool = ReadPdfTool::new(Arc::new(context(&server.uri())));
        let failure = tool
            .execute(&json!({"drive_id": "d1", "item_id": "p1"}))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, ToolErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_extract_text_garbage() {
        let failure = extract_text(vec![0u8; 64]).await.unwrap_err();
        assert_eq!(failure.kind, ToolErrorKind::Parse);
    }
}
