//! Bounding and cleanup of upstream payloads before they reach the model.
//!
//! Everything an adapter returns passes through one of these caps, so the
//! size of a tool result never depends on the size of the document behind it.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Caps applied by the search and read adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterLimits {
    /// Maximum SharePoint search hits returned.
    pub max_hits: usize,
    /// Maximum spreadsheet rows rendered.
    pub sheet_rows: usize,
    /// Maximum characters of document text (PDF, Confluence page).
    pub document_chars: usize,
    /// Maximum characters of a Confluence search excerpt.
    pub excerpt_chars: usize,
    /// Maximum Confluence search results requested.
    pub confluence_max_results: usize,
}

impl Default for AdapterLimits {
    fn default() -> Self {
        Self {
            max_hits: 20,
            sheet_rows: 150,
            document_chars: 15_000,
            excerpt_chars: 300,
            confluence_max_results: 10,
        }
    }
}

/// Cuts `text` to at most `max` characters on a char boundary.
///
/// Returns the kept prefix and whether anything was cut.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> (String, bool) {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => (text[..byte_idx].to_string(), true),
        None => (text.to_string(), false),
    }
}

/// Collapses runs of whitespace to single spaces, keeping line structure.
///
/// Blank lines disappear, so any run of paragraph breaks becomes one newline.
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// Patterns are literals, so compilation failure is a programming error.
#[allow(clippy::expect_used)]
fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("static pattern compiles")
}

static MACRO_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?s)<ac:structured-macro\b.*?</ac:structured-macro>|<ac:structured-macro\b[^>]*/>")
});
static PARAMETER: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?s)<ac:parameter\b.*?</ac:parameter>"));
static RESOURCE_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| pattern(r"</?ri:[^>]*>"));
static BLOCK_TAG: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)</?(p|br|div|li|ul|ol|tr|table|h[1-6]|blockquote|pre)\b[^>]*>")
});
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| pattern(r"<[^>]*>"));
static NUMERIC_ENTITY: LazyLock<Regex> = LazyLock::new(|| pattern(r"&#(x[0-9a-fA-F]+|[0-9]+);"));

/// Strips Confluence storage-format markup down to readable text.
///
/// Macro blocks, macro parameters and `ri:` resource identifiers are
/// dropped along with their content. Other tags are removed, block-level
/// tags becoming line breaks. Common entities are decoded and whitespace
/// is normalized.
#[must_use]
pub fn strip_html(html: &str) -> String {
    let text = MACRO_BLOCK.replace_all(html, " ");
    let text = PARAMETER.replace_all(&text, " ");
    let text = RESOURCE_IDENTIFIER.replace_all(&text, " ");
    let text = BLOCK_TAG.replace_all(&text, "\n");
    let text = ANY_TAG.replace_all(&text, " ");
    normalize_whitespace(&decode_entities(&text))
}

fn decode_entities(text: &str) -> String {
    let named = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&rsquo;", "\u{2019}")
        .replace("&lsquo;", "\u{2018}")
        .replace("&ndash;", "\u{2013}")
        .replace("&mdash;", "\u{2014}");

    let numeric = NUMERIC_ENTITY.replace_all(&named, |caps: &regex::Captures<'_>| {
        let code = &caps[1];
        let parsed = code
            .strip_prefix('x')
            .map_or_else(|| code.parse::<u32>().ok(), |hex| u32::from_str_radix(hex, 16).ok());
        parsed
            .and_then(char::from_u32)
            .map_or_else(|| caps[0].to_string(), String::from)
    });

    // Last, so "&amp;lt;" decodes to "&lt;" rather than "<"
    numeric.replace("&amp;", "&")
}

/// A rendered slice of a 2-D cell array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRows {
    /// Pipe-delimited rows, one per line.
    pub text: String,
    /// Number of rows in the source.
    pub total_rows: usize,
    /// Number of rows rendered.
    pub returned_rows: usize,
    /// Whether rows were dropped.
    pub truncated: bool,
}

/// Renders a JSON array of row arrays as ` | `-joined lines.
///
/// Anything that is not an array of arrays renders as zero rows.
#[must_use]
pub fn render_rows(values: &Value, max_rows: usize) -> RenderedRows {
    let rows = values.as_array().map_or(&[][..], Vec::as_slice);
    let total_rows = rows.len();

    let lines: Vec<String> = rows
        .iter()
        .take(max_rows)
        .map(|row| {
            row.as_array()
                .map(|cells| cells.iter().map(render_cell).collect::<Vec<_>>().join(" | "))
                .unwrap_or_else(|| render_cell(row))
        })
        .collect();

    RenderedRows {
        returned_rows: lines.len(),
        text: lines.join("\n"),
        total_rows,
        truncated: total_rows > max_rows,
    }
}

/// Longest rendered worksheet cell, in characters.
pub const MAX_CELL_CHARS: usize = 500;

fn render_cell(cell: &Value) -> String {
    let text = match cell {
        Value::Null => return String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    match truncate_chars(&text, MAX_CELL_CHARS) {
        (kept, true) => format!("{kept}..."),
        (kept, false) => kept,
    }
}

/// Classifies a file by extension: `excel`, `pdf`, `word`, `powerpoint` or `other`.
#[must_use]
pub fn classify_file_type(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "xlsx" | "xlsm" | "xls" | "csv" => "excel",
        "pdf" => "pdf",
        "docx" | "doc" => "word",
        "pptx" | "ppt" => "powerpoint",
        _ => "other",
    }
}

const CAP_TABLE_KEYWORDS: &[&str] = &["cap table", "captable", "cap_table", "shareholder", "주주명부", "지분"];
const FINANCIAL_KEYWORDS: &[&str] = &[
    "financial",
    "balance sheet",
    "income statement",
    "p&l",
    "audit",
    "재무",
    "감사보고서",
];
const CONTRACT_KEYWORDS: &[&str] = &["contract", "agreement", "term sheet", "termsheet", "계약"];

/// Classifies a document by keywords in its name or path.
///
/// Returns `cap_table`, `financials`, `contract` or `other`; the first
/// matching category in that order wins.
#[must_use]
pub fn classify_category(name: &str, path: &str) -> &'static str {
    let haystack = format!("{} {}", name.to_lowercase(), path.to_lowercase());
    let matches = |keywords: &[&str]| keywords.iter().any(|k| haystack.contains(k));

    if matches(CAP_TABLE_KEYWORDS) {
        "cap_table"
    } else if matches(FINANCIAL_KEYWORDS) {
        "financials"
    } else if matches(CONTRACT_KEYWORDS) {
        "contract"
    } else {
        "other"
    }
}

/// Allow-list of path fragments a search hit's URL must contain.
///
/// Matching is a case-insensitive substring test. An empty list allows
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathFilter {
    allowed: Vec<String>,
}

impl PathFilter {
    /// Builds a filter from configured fragments; blank entries are ignored.
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: allowed
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// Returns `true` if `url` passes the filter.
    #[must_use]
    pub fn allows(&self, url: &str) -> bool {
        if self.allowed.is_empty() {
            return true;
        }
        let url = url.to_lowercase();
        self.allowed.iter().any(|fragment| url.contains(fragment))
    }
}
