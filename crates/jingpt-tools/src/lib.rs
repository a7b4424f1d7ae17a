//! # jingpt-tools
//!
//! Tools the model can call while answering a question, and the machinery
//! that dispatches them.
//!
//! ## Core Components
//!
//! - [`ToolImplementation`]: Trait for a callable tool
//! - [`ToolRegistry`]: Thread-safe name → implementation table
//! - [`ToolExecutor`]: Validates arguments against the declared schema and
//!   folds every failure into a [`ToolResult`]
//! - [`shaping`]: Truncation and cleanup applied to upstream payloads
//!
//! ## Adapters
//!
//! - [`sharepoint`]: Microsoft Graph search, workbook and PDF reads
//! - [`confluence`]: Atlassian Confluence search and page reads
//!
//! [`toolset::build_executor`] wires the adapters for one request from the
//! credentials that request carries.
//!
//! ## Example: A Custom Tool
//!
//! ```rust
//! use std::collections::HashMap;
//!
//! use async_trait::async_trait;
//! use jingpt_common::{Function, Parameters, Property, Tool, ToolCall, ToolOutcome};
//! use jingpt_tools::{ToolExecutor, ToolImplementation};
//! use serde_json::{Value, json};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl ToolImplementation for Echo {
//!     fn get_definition(&self) -> Tool {
//!         let properties = HashMap::from([("text".to_string(), Property::string("Text to echo"))]);
//!         Tool::builder()
//!             .function(Function {
//!                 name: "echo".to_string(),
//!                 description: "Echo the input".to_string(),
//!                 parameters: Parameters::new(properties, vec!["text".to_string()]).into(),
//!             })
//!             .build()
//!     }
//!
//!     async fn execute(&self, args: &Value) -> ToolOutcome {
//!         Ok(json!({ "echo": args["text"] }))
//!     }
//! }
//!
//! # async fn example() -> Result<(), jingpt_tools::RegistryError> {
//! let mut executor = ToolExecutor::new();
//! executor.add_tool(Echo)?;
//!
//! let result = executor
//!     .execute_tool(&ToolCall::new("echo", r#"{"text":"hi"}"#))
//!     .await;
//! assert!(!result.is_error());
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! The [`ToolRegistry`] uses `DashMap` for concurrent access, so one executor
//! can serve every call of a round at once.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, warn};
use serde_json::{Map, Value};
use thiserror::Error;

use jingpt_common::{Tool, ToolCall, ToolErrorKind, ToolFailure, ToolOutcome, ToolResult};

pub mod confluence;
pub mod http;
pub mod shaping;
pub mod sharepoint;
pub mod toolset;

pub use shaping::{AdapterLimits, PathFilter};
pub use toolset::{SourceCredentials, SourcesConfig, build_executor};

/// A tool the model can call.
///
/// `execute` never fails in the `Err` sense of a Rust error: every problem
/// is reported as a [`ToolFailure`] inside the [`ToolOutcome`], so the model
/// sees it and can react.
#[async_trait]
pub trait ToolImplementation: Send + Sync {
    fn get_definition(&self) -> Tool;

    async fn execute(&self, args: &Value) -> ToolOutcome;

    /// Short description of what a call with `args` is doing, for status frames.
    fn status_message(&self, _args: &Value) -> String {
        format!("Running {}", self.get_definition().function.name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),
}

pub struct ToolRegistry {
    tools: Arc<DashMap<String, Arc<dyn ToolImplementation>>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: Arc::new(DashMap::new()),
        }
    }

    /// Registers a tool under its definition's name.
    ///
    /// # Errors
    /// Returns [`RegistryError::DuplicateTool`] if the name is taken.
    pub fn register(&self, tool: Arc<dyn ToolImplementation>) -> Result<(), RegistryError> {
        let name = tool.get_definition().function.name;
        match self.tools.entry(name) {
            Entry::Occupied(entry) => Err(RegistryError::DuplicateTool(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(tool);
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolImplementation>> {
        self.tools.get(name).map(|r| r.value().clone())
    }

    /// All definitions, sorted by name.
    #[must_use]
    pub fn get_all_definitions(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self.tools.iter().map(|t| t.get_definition()).collect();
        tools.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        tools
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.iter().map(|t| t.key().clone()).collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

pub struct ToolExecutor {
    registry: ToolRegistry,
}

impl ToolExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: ToolRegistry::new(),
        }
    }

    /// # Errors
    /// Returns [`RegistryError::DuplicateTool`] if the name is taken.
    pub fn add_tool<T: ToolImplementation + 'static>(&mut self, tool: T) -> Result<(), RegistryError> {
        self.registry.register(Arc::new(tool))
    }

    /// # Errors
    /// Returns [`RegistryError::DuplicateTool`] if the name is taken.
    pub fn add_tool_arc(&mut self, tool: Arc<dyn ToolImplementation>) -> Result<(), RegistryError> {
        self.registry.register(tool)
    }

    #[must_use]
    pub fn has_tool(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    #[must_use]
    pub fn get_all_tools(&self) -> Vec<Tool> {
        self.registry.get_all_definitions()
    }

    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// Status line for a pending call. Falls back to the bare tool name when
    /// the tool is unknown or the arguments do not parse.
    #[must_use]
    pub fn status_for(&self, tool_call: &ToolCall) -> String {
        let name = &tool_call.function.name;
        match (self.registry.get(name), Self::parse_arguments(tool_call)) {
            (Some(tool), Ok(args)) => tool.status_message(&args),
            _ => format!("Running {name}"),
        }
    }

    /// Execute a tool call.
    ///
    /// Unknown tools, malformed arguments and schema violations come back as
    /// failed results; this never returns early.
    pub async fn execute_tool(&self, tool_call: &ToolCall) -> ToolResult {
        let name = &tool_call.function.name;
        let outcome = self.dispatch(tool_call).await;
        if let Err(failure) = &outcome {
            warn!("Tool '{name}' ({}) failed: {failure}", tool_call.id);
        } else {
            debug!("Tool '{name}' ({}) succeeded", tool_call.id);
        }
        ToolResult {
            call_id: tool_call.id.clone(),
            name: name.clone(),
            outcome,
        }
    }

    async fn dispatch(&self, tool_call: &ToolCall) -> ToolOutcome {
        let name = &tool_call.function.name;
        let tool = self.registry.get(name).ok_or_else(|| {
            ToolFailure::new(ToolErrorKind::UnknownTool, format!("Unknown tool: '{name}'"))
        })?;

        let args = Self::parse_arguments(tool_call)?;
        validate_arguments(&tool.get_definition().function.parameters, &args)?;

        tool.execute(&args).await
    }

    fn parse_arguments(tool_call: &ToolCall) -> Result<Value, ToolFailure> {
        let json = tool_call.function.arguments_json().trim();
        if json.is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        serde_json::from_str(json).map_err(|e| {
            ToolFailure::invalid_input("Arguments are not valid JSON").with_detail(e.to_string())
        })
    }
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks `args` against an object schema's `required` list and primitive
/// property types. Properties the schema does not declare pass through.
///
/// # Errors
/// Returns an `invalid_input` failure naming the first violation.
pub fn validate_arguments(schema: &Value, args: &Value) -> Result<(), ToolFailure> {
    let Some(args) = args.as_object() else {
        return Err(ToolFailure::invalid_input("Arguments must be a JSON object"));
    };

    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice);
    for field in required.iter().filter_map(Value::as_str) {
        if args.get(field).is_none_or(Value::is_null) {
            return Err(ToolFailure::invalid_input(format!(
                "Missing required argument '{field}'"
            )));
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };
    for (field, value) in args {
        if value.is_null() {
            continue;
        }
        let expected = properties
            .get(field)
            .and_then(|p| p.get("type"))
            .and_then(Value::as_str);
        let matches = match expected {
            Some("string") => value.is_string(),
            Some("number") => value.is_number(),
            Some("integer") => value.is_i64() || value.is_u64(),
            Some("boolean") => value.is_boolean(),
            _ => true,
        };
        if !matches {
            return Err(ToolFailure::invalid_input(format!(
                "Argument '{field}' must be a {}",
                expected.unwrap_or("value")
            )));
        }
    }

    Ok(())
}

/// Reads a required, non-blank string argument.
///
/// # Errors
/// Returns an `invalid_input` failure if the argument is absent, not a
/// string, or blank.
pub fn required_str<'a>(args: &'a Value, field: &str) -> Result<&'a str, ToolFailure> {
    args.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolFailure::invalid_input(format!("Missing required argument '{field}'")))
}

/// Reads an optional string argument; blank strings count as absent.
#[must_use]
pub fn optional_str<'a>(args: &'a Value, field: &str) -> Option<&'a str> {
    args.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
