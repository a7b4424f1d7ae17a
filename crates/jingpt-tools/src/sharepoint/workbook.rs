use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use jingpt_common::{Function, Parameters, Property, Tool, ToolOutcome};

use super::{GraphContext, document_value, item_properties};
use crate::shaping::render_rows;
use crate::{ToolImplementation, http, optional_str, required_str};

pub struct ReadExcelSheetTool {
    ctx: Arc<GraphContext>,
}

#[derive(Debug, Deserialize)]
struct WorksheetList {
    #[serde(default)]
    value: Vec<Worksheet>,
}

#[derive(Debug, Deserialize)]
struct Worksheet {
    name: String,
}

#[derive(Debug, Deserialize)]
struct UsedRange {
    #[serde(default)]
    values: Value,
}

/// Graph addresses a sheet as `worksheets('name')`; quotes inside the name are doubled.
fn worksheet_segment(sheet_name: &str) -> String {
    format!("worksheets('{}')", sheet_name.replace('\'', "''"))
}

impl ReadExcelSheetTool {
    #[must_use]
    pub const fn new(ctx: Arc<GraphContext>) -> Self {
        Self { ctx }
    }

    async fn list_sheets(&self, drive_id: &str, item_id: &str) -> ToolOutcome {
        let document = self.ctx.item_document(drive_id, item_id).await?;
        let url = self
            .ctx
            .url(&["drives", drive_id, "items", item_id, "workbook", "worksheets"])?;
        let list: WorksheetList =
            http::fetch_json(self.ctx.get(url), "Listing Excel worksheets").await?;

        let sheets: Vec<String> = list.value.into_iter().map(|s| s.name).collect();
        Ok(json!({
            "file": document.title,
            "sheets": sheets,
            "document": document_value(&document),
        }))
    }

    async fn read_sheet(&self, drive_id: &str, item_id: &str, sheet_name: &str) -> ToolOutcome {
        let document = self.ctx.item_document(drive_id, item_id).await?;
        let worksheet = worksheet_segment(sheet_name);
        let url = self.ctx.url(&[
            "drives",
            drive_id,
            "items",
            item_id,
            "workbook",
            &worksheet,
            "usedRange(valuesOnly=true)",
        ])?;
        let range: UsedRange = http::fetch_json(self.ctx.get(url), "Reading Excel sheet").await?;

        let rendered = render_rows(&range.values, self.ctx.limits.sheet_rows);
        Ok(json!({
            "file": document.title,
            "sheet": sheet_name,
            "rows": rendered.text,
            "total_rows": rendered.total_rows,
            "returned_rows": rendered.returned_rows,
            "truncated": rendered.truncated,
            "document": document_value(&document),
        }))
    }
}

#[async_trait]
impl ToolImplementation for ReadExcelSheetTool {
    fn get_definition(&self) -> Tool {
        let mut properties: HashMap<String, Property> = item_properties().into_iter().collect();
        properties.insert(
            "sheet_name".to_string(),
            Property::string("Worksheet to read. Omit to list the worksheet names first."),
        );

        Tool::builder()
            .function(Function {
                name: "read_excel_sheet".to_string(),
                description: "Read an Excel file from SharePoint. Without sheet_name, lists the \
                    worksheets; with sheet_name, returns the sheet's rows."
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
        match optional_str(args, "sheet_name") {
            Some(sheet) => self.read_sheet(drive_id, item_id, sheet).await,
            None => self.list_sheets(drive_id, item_id).await,
        }
    }

    fn status_message(&self, args: &Value) -> String {
        optional_str(args, "sheet_name").map_or_else(
            || "Listing Excel worksheets".to_string(),
            |sheet| format!("Reading Excel sheet \"{sheet}\""),
        )
    }
}
