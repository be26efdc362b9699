use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::schema::Schema;

/// Status reported when a call names a tool that is not registered.
pub const STATUS_UNKNOWN_TOOL: &str = "unknown_tool";
/// Status reported when arguments do not satisfy the declared schema.
pub const STATUS_INVALID_ARGUMENTS: &str = "invalid_arguments";
/// Status reported when the handler fails or panics.
pub const STATUS_ERROR: &str = "error";

/// A tool the upstream model may call, as announced in the session handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// Parameter shape; always an object schema.
    pub parameters: Schema,
}

impl ToolDeclaration {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Schema) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A remote request to run a local tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque invocation id supplied by the upstream; echoed back unchanged.
    pub id: String,
    pub name: String,
    /// Argument object. Anything else is reported as invalid arguments.
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// The answer to a [`ToolCall`]. Failures are encoded in `response`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub name: String,
    pub response: Map<String, Value>,
}

impl ToolResult {
    pub fn success(call: &ToolCall, response: Map<String, Value>) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            response,
        }
    }

    pub fn unknown_tool(call: &ToolCall) -> Self {
        Self::with_status(call, STATUS_UNKNOWN_TOOL, None)
    }

    pub fn failure(call: &ToolCall, status: &str, detail: impl Into<String>) -> Self {
        Self::with_status(call, status, Some(detail.into()))
    }

    fn with_status(call: &ToolCall, status: &str, detail: Option<String>) -> Self {
        let mut response = Map::new();
        response.insert("status".to_string(), json!(status));
        if let Some(detail) = detail {
            response.insert("detail".to_string(), json!(detail));
        }
        Self::success(call, response)
    }

    /// The `status` field of the response, if the handler set one.
    pub fn status(&self) -> Option<&str> {
        self.response.get("status").and_then(Value::as_str)
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self.status(),
            Some(STATUS_UNKNOWN_TOOL | STATUS_INVALID_ARGUMENTS | STATUS_ERROR)
        )
    }
}
