//! Drive-thru ordering tool.
//!
//! `save_order` is the tool the default persona uses to commit a customer's order.
//! Orders are kept in an in-memory [`OrderBook`] shared with the rest of the
//! process.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::info;
use uuid::Uuid;

use crate::core::tools::registry::{ToolArgs, ToolError, ToolOutcome};
use crate::core::tools::schema::Schema;
use crate::core::tools::types::ToolDeclaration;

pub const SAVE_ORDER_TOOL: &str = "save_order";

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub menu: String,
    pub qty: i64,
}

/// A saved order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub items: Vec<OrderItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Orders saved since process start.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    orders: Arc<Mutex<Vec<OrderRecord>>>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, items: Vec<OrderItem>, note: Option<String>) -> OrderRecord {
        let record = OrderRecord {
            order_id: Uuid::new_v4().to_string(),
            items,
            note,
        };
        self.orders.lock().push(record.clone());
        record
    }

    pub fn orders(&self) -> Vec<OrderRecord> {
        self.orders.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.orders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.lock().is_empty()
    }
}

pub fn save_order_declaration() -> ToolDeclaration {
    let item = Schema::object()
        .property(
            "menu",
            Schema::string().describe("Nama menu yang dipesan"),
            true,
        )
        .property("qty", Schema::integer().describe("Jumlah pesanan"), true);

    ToolDeclaration::new(
        SAVE_ORDER_TOOL,
        "Menyimpan pesanan makanan atau minuman pelanggan.",
        Schema::object()
            .property("items", Schema::array(item), true)
            .property(
                "note",
                Schema::string().describe("Catatan tambahan untuk pesanan"),
                false,
            ),
    )
}

/// Build the `save_order` handler writing into `book`.
///
/// The response echoes the accepted items under `pesanan`.
pub fn save_order_handler(book: OrderBook) -> impl Fn(ToolArgs) -> ToolOutcome + Send + Sync + 'static {
    move |args: ToolArgs| {
        let raw_items = args.get("items").cloned().unwrap_or(Value::Null);
        let items: Vec<OrderItem> = serde_json::from_value(raw_items.clone())
            .map_err(|e| ToolError::InvalidArguments(format!("items: {e}")))?;


        let note = args.get("note").and_then(Value::as_str).map(str::to_string);
        let record = book.record(items, note.clone());
        info!(
            order_id = %record.order_id,
            items = record.items.len(),
            "Order saved"
        );

        let mut response = Map::new();
        response.insert("status".to_string(), json!("ok"));
        response.insert("pesanan".to_string(), raw_items);
        if let Some(note) = note {
            response.insert("note".to_string(), json!(note));
        }
        Ok(response)
    }
}
