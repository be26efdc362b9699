//! Local tools the upstream model can call.
//!
//! - [`ToolRegistry`] maps a tool name to its [`ToolDeclaration`] and handler
//! - [`Schema`] describes and validates tool arguments
//! - [`builtin`] holds the tools shipped with the relay (`save_order`)
//!
//! # Example
//!
//! ```rust
//! use relay_gateway::core::tools::{Schema, ToolCall, ToolDeclaration, ToolRegistry};
//! use serde_json::{Map, json};
//!
//! let mut registry = ToolRegistry::new();
//! registry
//!     .register(
//!         ToolDeclaration::new(
//!             "ping",
//!             "Health probe",
//!             Schema::object().property("target", Schema::string(), true),
//!         ),
//!         |_args| {
//!             let mut out = Map::new();
//!             out.insert("status".into(), json!("ok"));
//!             Ok(out)
//!         },
//!     )
//!     .unwrap();
//!
//! let result = registry.dispatch(&ToolCall::new("1", "ping", json!({"target": "kitchen"})));
//! assert_eq!(result.status(), Some("ok"));
//!
//! let missing = registry.dispatch(&ToolCall::new("2", "pong", json!({})));
//! assert_eq!(missing.status(), Some("unknown_tool"));
//! ```

pub mod builtin;
mod isolation;
mod registry;
mod schema;
mod types;

pub use registry::{ToolArgs, ToolError, ToolHandler, ToolOutcome, ToolRegistry};
pub use schema::{Schema, SchemaViolation};
pub use types::{
    STATUS_ERROR, STATUS_INVALID_ARGUMENTS, STATUS_UNKNOWN_TOOL, ToolCall, ToolDeclaration,
    ToolResult,
};
