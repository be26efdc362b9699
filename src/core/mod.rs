pub mod realtime;
pub mod tools;

// Re-export commonly used types for convenience
pub use realtime::{
    InboundEvent, RealtimeError, RealtimeResult, SessionSettings, SessionTranslator,
    SharedTranslator, UpstreamConnector, UpstreamProvider, create_connector, create_translator,
};

pub use tools::{ToolCall, ToolDeclaration, ToolError, ToolRegistry, ToolResult};
