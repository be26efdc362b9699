//! Tools shipped with the relay.

pub mod order;

pub use order::{
    OrderBook, OrderItem, OrderRecord, SAVE_ORDER_TOOL, save_order_declaration,
    save_order_handler,
};

use super::registry::{ToolError, ToolRegistry};

/// Register every builtin tool into `registry`.
pub fn register_builtin_tools(registry: &mut ToolRegistry, orders: OrderBook) -> Result<(), ToolError> {
    registry.register(save_order_declaration(), save_order_handler(orders))?;
    Ok(())
}
