//! Order persistence.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::model::Order;
use crate::error::ServiceError;

/// Storage for recorded orders.
pub trait OrderRepository: Send + Sync {
    /// Persist a new order and return it with its assigned id.
    fn record(
        &self,
        book_id: u64,
        book_info: Value,
        purchase_date: DateTime<Utc>,
    ) -> Result<Order, ServiceError>;

    /// Every recorded order, oldest first.
    fn orders(&self) -> Result<Vec<Order>, ServiceError>;
}

/// In-memory order table.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<Vec<Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderRepository for InMemoryOrderStore {
    fn record(
        &self,
        book_id: u64,
        book_info: Value,
        purchase_date: DateTime<Utc>,
    ) -> Result<Order, ServiceError> {
        let mut orders = self
            .orders
            .write()
            .map_err(|_| ServiceError::poisoned("record"))?;
        let order = Order {
            id: orders.len() as u64 + 1,
            book_id,
            book_info,
            purchase_date,
            count: 1,
        };
        orders.push(order.clone());
        Ok(order)
    }

    fn orders(&self) -> Result<Vec<Order>, ServiceError> {
        self.orders
            .read()
            .map(|orders| orders.clone())
            .map_err(|_| ServiceError::poisoned("orders"))
    }
}
