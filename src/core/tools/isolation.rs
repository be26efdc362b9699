//! Panic isolation for tool handlers.
//!
//! Handlers run synchronously inside the session task. A panic in one of them is
//! caught here and turned into a [`ToolError::Panic`] so the session keeps running.
//!
//! `catch_unwind` only catches unwinding panics; the release profile must not set
//! `panic = "abort"`.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

use super::registry::{ToolError, ToolOutcome};

/// Run a handler call, converting a panic into [`ToolError::Panic`].
///
/// The closure is wrapped in `AssertUnwindSafe`: handlers receive owned arguments and
/// any shared state they capture is behind locks that tolerate poisoning.
pub fn call_handler_safely<F>(handler_call: F) -> ToolOutcome
where
    F: FnOnce() -> ToolOutcome,
{
    match catch_unwind(AssertUnwindSafe(handler_call)) {
        Ok(outcome) => outcome,
        Err(panic_info) => {
            let msg = extract_panic_message(&panic_info);
            tracing::error!(message = %msg, "Tool handler panicked");
            Err(ToolError::Panic(msg))
        }
    }
}

fn extract_panic_message(panic_info: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic (non-string payload)".to_string()
    }
}
