//! Name-keyed tool registry.
//!
//! The registry is built once at startup and shared read-only across sessions
//! behind an `Arc`. Dispatch never fails: every call yields a [`ToolResult`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::isolation::call_handler_safely;
use super::types::{
    STATUS_ERROR, STATUS_INVALID_ARGUMENTS, ToolCall, ToolDeclaration, ToolResult,
};

/// Tool names accepted by the upstream function-calling APIs.
static TOOL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]{0,63}$").unwrap());

/// Errors raised by tool handlers and registration.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The handler ran and reported a failure
    #[error("{0}")]
    Failed(String),

    /// Arguments were not usable by the handler
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The handler panicked
    #[error("tool handler panicked: {0}")]
    Panic(String),

    /// A declaration was rejected at registration time
    #[error("invalid tool declaration: {0}")]
    InvalidDeclaration(String),
}

/// Validated argument object passed to a handler.
pub type ToolArgs = Map<String, Value>;

/// What a handler returns: a result object or a failure.
pub type ToolOutcome = Result<Map<String, Value>, ToolError>;

/// A synchronous tool handler.
pub type ToolHandler = Arc<dyn Fn(ToolArgs) -> ToolOutcome + Send + Sync>;

struct RegisteredTool {
    declaration: ToolDeclaration,
    handler: ToolHandler,
}

/// Static mapping from tool name to declaration and handler.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under `declaration.name`.
    ///
    /// Registering an existing name replaces the earlier entry.
    ///
    /// # Errors
    /// Returns [`ToolError::InvalidDeclaration`] when the name is not a valid
    /// function name or the parameter schema is not an object.
    pub fn register<F>(&mut self, declaration: ToolDeclaration, handler: F) -> Result<(), ToolError>
    where
        F: Fn(ToolArgs) -> ToolOutcome + Send + Sync + 'static,
    {
        if !TOOL_NAME.is_match(&declaration.name) {
            return Err(ToolError::InvalidDeclaration(format!(
                "'{}' is not a valid tool name",
                declaration.name
            )));
        }
        if !declaration.parameters.is_object() {
            return Err(ToolError::InvalidDeclaration(format!(
                "parameters of '{}' must be an object schema, got {}",
                declaration.name,
                declaration.parameters.type_name()
            )));
        }

        let name = declaration.name.clone();
        let previous = self.tools.insert(
            name.clone(),
            RegisteredTool {
                declaration,
                handler: Arc::new(handler),
            },
        );
        if previous.is_some() {
            warn!(tool = %name, "Replacing previously registered tool");
        } else {
            info!(tool = %name, "Registered tool");
        }
        Ok(())
    }

    /// Resolve and execute a call.
    ///
    /// Unknown names, schema violations, handler errors and handler panics all
    /// produce an error-shaped result carrying the original call id.
    pub fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, call_id = %call.id, "Upstream called an unknown tool");
            return ToolResult::unknown_tool(call);
        };

        let args = match tool.declaration.parameters.validate(&call.args) {
            Ok(Value::Object(args)) => args,
            Ok(other) => {
                let detail = format!("arguments must be an object, got {other}");
                warn!(tool = %call.name, call_id = %call.id, "{detail}");
                return ToolResult::failure(call, STATUS_INVALID_ARGUMENTS, detail);
            }
            Err(violation) => {
                warn!(
                    tool = %call.name,
                    call_id = %call.id,
                    error = %violation,
                    "Rejected tool arguments"
                );
                return ToolResult::failure(call, STATUS_INVALID_ARGUMENTS, violation.to_string());
            }
        };

        let handler = tool.handler.clone();
        match call_handler_safely(move || handler(args)) {
            Ok(response) => {
                debug!(tool = %call.name, call_id = %call.id, "Tool call succeeded");
                ToolResult::success(call, response)
            }
            Err(ToolError::InvalidArguments(detail)) => {
                warn!(tool = %call.name, call_id = %call.id, error = %detail, "Tool rejected arguments");
                ToolResult::failure(call, STATUS_INVALID_ARGUMENTS, detail)
            }
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool call failed");
                ToolResult::failure(call, STATUS_ERROR, e.to_string())
            }
        }
    }

    /// Declarations of every registered tool, ordered by name.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools
            .values()
            .map(|tool| tool.declaration.clone())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}
