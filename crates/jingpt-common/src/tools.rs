//! Tool descriptors, invocations and results.
//!
//! A [`Tool`] describes something the model may call. A [`ToolCall`] is one
//! request from the model to call it. A [`ToolResult`] carries the
//! [`ToolOutcome`] back, correlated by call id.
//!
//! Outcomes are values, not errors: every failure a tool can hit is folded
//! into a [`ToolFailure`] so the model can see it and recover.

use std::collections::HashMap;
use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// Describes a single property in a function parameter schema.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Property {
    /// The JSON type (`string`, `number` or `boolean`).
    #[serde(rename = "type")]
    pub prop_type: String,
    /// Human-readable description of this property.
    pub description: String,
    /// Allowed enum values for this property.
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl Property {
    fn primitive(prop_type: &str, description: impl Into<String>) -> Self {
        Self {
            prop_type: prop_type.to_string(),
            description: description.into(),
            enum_values: None,
        }
    }

    /// Creates a string property.
    #[must_use]
    pub fn string(description: impl Into<String>) -> Self {
        Self::primitive("string", description)
    }

    /// Creates a number property.
    #[must_use]
    pub fn number(description: impl Into<String>) -> Self {
        Self::primitive("number", description)
    }

    /// Creates a boolean property.
    #[must_use]
    pub fn boolean(description: impl Into<String>) -> Self {
        Self::primitive("boolean", description)
    }

    /// Creates a string property with allowed enum values.
    #[must_use]
    pub fn string_enum(description: impl Into<String>, values: Vec<&str>) -> Self {
        Self {
            enum_values: Some(values.into_iter().map(String::from).collect()),
            ..Self::string(description)
        }
    }
}

/// Defines the parameter schema for a function using JSON Schema conventions.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Parameters {
    /// The JSON type, always "object".
    #[serde(rename = "type")]
    pub param_type: String,
    /// Map of parameter names to their property definitions.
    pub properties: HashMap<String, Property>,
    /// List of required parameter names.
    pub required: Vec<String>,
}

impl Parameters {
    /// Creates a new `Parameters` with type "object".
    #[must_use]
    pub fn new(properties: HashMap<String, Property>, required: Vec<String>) -> Self {
        Self {
            param_type: "object".to_string(),
            properties,
            required,
        }
    }
}

impl From<Parameters> for Value {
    fn from(params: Parameters) -> Self {
        match serde_json::to_value(params) {
            Ok(value) => value,
            Err(e) => {
                warn!("Parameters serialization unexpectedly failed: {e}");
                Self::Null
            }
        }
    }
}

/// Describes a function that can be called by an LLM.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Function {
    /// The name of the function.
    pub name: String,
    /// Human-readable description of what the function does.
    pub description: String,
    /// JSON Schema definition of the function's parameters.
    pub parameters: Value,
}

/// Represents a tool available to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, Eq, PartialEq)]
pub struct Tool {
    /// The type of tool (defaults to "function").
    #[serde(rename = "type")]
    #[builder(default = "function".to_string())]
    pub r#type: String,
    /// The function definition.
    pub function: Function,
}

/// Represents an invocation of a function with arguments.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    /// The name of the function being called.
    pub name: String,
    /// The arguments as a single JSON string.
    pub arguments: String,
}

impl FunctionCall {
    /// Returns the arguments as a JSON string slice.
    ///
    /// Returns `"{}"` if the arguments string is empty.
    #[must_use]
    pub fn arguments_json(&self) -> &str {
        if self.arguments.is_empty() {
            "{}"
        } else {
            &self.arguments
        }
    }
}

/// A tool call requested by the model.
///
/// Arguments in `function.arguments` are passed through as-is from the
/// provider; the executor parses and validates them before dispatch.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ToolCall {
    /// Unique identifier for this tool call.
    pub id: String,
    /// The function being invoked.
    pub function: FunctionCall,
    /// The type of call, typically "function".
    pub call_type: String,
}

impl ToolCall {
    /// Creates a new tool call with a generated ID.
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), name, arguments)
    }

    /// Creates a new tool call with a provider-assigned ID.
    pub fn with_id(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
            call_type: "function".to_string(),
        }
    }
}

/// Classification of a tool failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ToolErrorKind {
    /// Arguments were malformed or failed schema validation.
    InvalidInput,
    /// No tool with the requested name is registered.
    UnknownTool,
    /// The upstream rejected the credentials (401/403).
    Unauthorized,
    /// The requested resource does not exist (404).
    NotFound,
    /// Any other non-success status from the upstream.
    HttpStatus,
    /// The request never produced a response.
    Network,
    /// The response could not be decoded or had an unexpected shape.
    Parse,
}

impl ToolErrorKind {
    /// Returns the wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::UnknownTool => "unknown_tool",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::HttpStatus => "http_status",
            Self::Network => "network",
            Self::Parse => "parse",
        }
    }
}

impl fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed tool execution, rendered to the model as an error payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFailure {
    /// What went wrong, broadly.
    pub kind: ToolErrorKind,
    /// Human-readable message.
    #[serde(rename = "error")]
    pub message: String,
    /// Optional upstream detail (status code, parser message).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ToolFailure {
    /// Creates a failure without detail.
    pub fn new(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    /// Attaches detail to the failure.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Shorthand for an `invalid_input` failure.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::InvalidInput, message)
    }

    /// Renders the failure as the JSON payload shown to the model.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut value = json!({
            "error": self.message,
            "kind": self.kind.as_str(),
        });
        if let (Some(detail), Some(obj)) = (&self.detail, value.as_object_mut()) {
            obj.insert("detail".to_string(), Value::String(detail.clone()));
        }
        value
    }
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

/// The success/error union every tool execution resolves to.
pub type ToolOutcome = Result<Value, ToolFailure>;

/// A source document a tool read, used for citations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Display title.
    pub title: String,
    /// Web URL of the document.
    pub url: String,
    /// Where it came from (`sharepoint` or `confluence`).
    pub source: String,
}

/// One search hit, enough to display and to issue a follow-up read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
pub struct SearchHit {
    /// File or page name.
    #[builder(setter(into))]
    pub name: String,
    /// Source category (`cap_table`, `financials`, `contract`, `other`).
    #[builder(setter(into))]
    pub category: String,
    /// File type (`excel`, `pdf`, `word`, `powerpoint`, `other`).
    #[builder(setter(into))]
    pub file_type: String,
    /// Web URL.
    #[builder(setter(into))]
    pub url: String,
    /// Drive id for follow-up reads (SharePoint only).
    #[builder(default, setter(strip_option, into))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drive_id: Option<String>,
    /// Item id for follow-up reads (SharePoint only).
    #[builder(default, setter(strip_option, into))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    /// Last modification timestamp, as reported by the source.
    #[builder(default, setter(strip_option, into))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

/// The result of one tool call, correlated by call id.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    /// The call this answers.
    pub call_id: String,
    /// Name of the tool that was called.
    pub name: String,
    /// What happened.
    pub outcome: ToolOutcome,
}

impl ToolResult {
    /// Creates a successful result.
    pub fn success(call_id: impl Into<String>, name: impl Into<String>, value: Value) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            outcome: Ok(value),
        }
    }

    /// Creates a failed result.
    pub fn failure(
        call_id: impl Into<String>,
        name: impl Into<String>,
        failure: ToolFailure,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            outcome: Err(failure),
        }
    }

    /// Returns `true` if the outcome is a failure.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.outcome.is_err()
    }

    /// Renders the outcome as the text content of a `tool_result` block.
    #[must_use]
    pub fn to_content(&self) -> String {
        match &self.outcome {
            Ok(value) => value.to_string(),
            Err(failure) => failure.to_value().to_string(),
        }
    }

    /// Returns the document a successful read attached, if any.
    #[must_use]
    pub fn document(&self) -> Option<DocumentRef> {
        let value = self.outcome.as_ref().ok()?.get("document")?;
        serde_json::from_value(value.clone()).ok()
    }
}
