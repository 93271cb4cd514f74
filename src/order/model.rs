use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A completed purchase. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub book_id: u64,
    /// Frozen copy of the catalog's `GET /books/{id}` reply, taken after
    /// the decrement.
    pub book_info: Value,
    pub purchase_date: DateTime<Utc>,
    pub count: u32,
}

impl Order {
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "book_info": self.book_info,
            "purchase_date": self.purchase_date.to_rfc3339(),
            "count": self.count,
        })
    }

    /// Payload of an `order_confirmation_*` event.
    pub fn confirmation(&self) -> Value {
        json!({
            "order_info": {
                "order_id": self.id,
                "book_id": self.book_id,
                "book_info": self.book_info,
                "purchase_date": self.purchase_date.to_rfc3339(),
                "count": self.count,
            }
        })
    }

    /// Book name from the snapshot, when the snapshot has one.
    pub fn book_name(&self) -> Option<&str> {
        self.book_info
            .get("books")
            .and_then(|b| b.get("name"))
            .and_then(Value::as_str)
    }
}
