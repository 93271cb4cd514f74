//! The catalog operations the purchase workflow depends on.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::catalog::CatalogService;
use crate::error::ServiceError;

/// Catalog calls made by the order workflow.
///
/// A non-success reply comes back as the catalog's own error (or
/// `Upstream` over HTTP); a call whose outcome is unknown is
/// `BackendUnavailable`.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Units left. Out of stock and unknown ids are errors.
    async fn availability(&self, id: u64) -> Result<u32, ServiceError>;

    /// Atomic decrement-if-positive. `Ok` means the unit was taken; the
    /// reply is the catalog's own and should carry the new `count`.
    async fn decrease(&self, id: u64) -> Result<Value, ServiceError>;

    /// Returns the new count.
    async fn increase(&self, id: u64) -> Result<u32, ServiceError>;

    /// The catalog's full `GET /books/{id}` reply.
    async fn book(&self, id: u64) -> Result<Value, ServiceError>;
}

/// Talks to a catalog service in the same process.
pub struct LocalCatalogClient {
    catalog: Arc<CatalogService>,
}

impl LocalCatalogClient {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl CatalogClient for LocalCatalogClient {
    async fn availability(&self, id: u64) -> Result<u32, ServiceError> {
        self.catalog.ready().await;
        count_field(&self.catalog.availability(id)?, "left")
    }

    async fn decrease(&self, id: u64) -> Result<Value, ServiceError> {
        self.catalog.ready().await;
        self.catalog.decrease(id)
    }

    async fn increase(&self, id: u64) -> Result<u32, ServiceError> {
        self.catalog.ready().await;
        count_field(&self.catalog.increase(id)?, "count")
    }

    async fn book(&self, id: u64) -> Result<Value, ServiceError> {
        self.catalog.ready().await;
        self.catalog.book(id)
    }
}

/// Read an integer count field out of a catalog reply.
pub(crate) fn count_field(reply: &Value, field: &str) -> Result<u32, ServiceError> {
    reply
        .get(field)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| {
            ServiceError::Internal(format!("catalog reply has no usable {:?}: {}", field, reply))
        })
}
