//! How the gateway reaches catalog and order instances.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::catalog::CatalogService;
use crate::error::ServiceError;
use crate::order::OrderService;
use crate::registry::Endpoint;

/// A backend reply, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    pub status: u16,
    pub body: Value,
}

impl BackendResponse {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Success body, or the reply itself as an `Upstream` error.
    pub fn into_result(self) -> Result<Value, ServiceError> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(ServiceError::Upstream {
                status: self.status,
                body: self.body,
            })
        }
    }
}

impl From<Result<Value, ServiceError>> for BackendResponse {
    fn from(result: Result<Value, ServiceError>) -> Self {
        match result {
            Ok(body) => BackendResponse::ok(body),
            Err(e) => BackendResponse {
                status: e.status_code(),
                body: e.body(),
            },
        }
    }
}

/// Forwarding calls made by the gateway router.
///
/// `Err` means the endpoint could not be reached at all; any reply,
/// including an error status, is a `BackendResponse`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// `GET {endpoint}/books/search/{term}`
    async fn search(&self, endpoint: &Endpoint, term: &str) -> Result<BackendResponse, ServiceError>;

    /// `GET {endpoint}/books/{id}`
    async fn info(&self, endpoint: &Endpoint, id: u64) -> Result<BackendResponse, ServiceError>;

    /// `POST {endpoint}/purchase/{id}`
    async fn purchase(&self, endpoint: &Endpoint, id: u64) -> Result<BackendResponse, ServiceError>;
}

/// Routes endpoints to services living in this process.
///
/// An endpoint with no registered service behaves like a dead host.
#[derive(Default)]
pub struct LocalBackend {
    catalogs: HashMap<Endpoint, Arc<CatalogService>>,
    orders: HashMap<Endpoint, Arc<OrderService>>,
}

impl LocalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(mut self, endpoint: impl Into<Endpoint>, service: Arc<CatalogService>) -> Self {
        self.catalogs.insert(endpoint.into(), service);
        self
    }

    pub fn with_order(mut self, endpoint: impl Into<Endpoint>, service: Arc<OrderService>) -> Self {
        self.orders.insert(endpoint.into(), service);
        self
    }

    fn catalog(&self, endpoint: &Endpoint) -> Result<&Arc<CatalogService>, ServiceError> {
        self.catalogs
            .get(endpoint)
            .ok_or_else(|| unreachable_endpoint(endpoint))
    }

    fn order(&self, endpoint: &Endpoint) -> Result<&Arc<OrderService>, ServiceError> {
        self.orders
            .get(endpoint)
            .ok_or_else(|| unreachable_endpoint(endpoint))
    }
}

fn unreachable_endpoint(endpoint: &Endpoint) -> ServiceError {
    ServiceError::BackendUnavailable(format!("{} is unreachable", endpoint))
}

#[async_trait]
impl Backend for LocalBackend {
    async fn search(&self, endpoint: &Endpoint, term: &str) -> Result<BackendResponse, ServiceError> {
        let catalog = self.catalog(endpoint)?;
        catalog.ready().await;
        Ok(catalog.search(term).into())
    }

    async fn info(&self, endpoint: &Endpoint, id: u64) -> Result<BackendResponse, ServiceError> {
        let catalog = self.catalog(endpoint)?;
        catalog.ready().await;
        Ok(catalog.book(id).into())
    }

    async fn purchase(&self, endpoint: &Endpoint, id: u64) -> Result<BackendResponse, ServiceError> {
        let order = self.order(endpoint)?;
        Ok(order.purchase(id).await.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_results_become_replies() {
        let reply = BackendResponse::from(Err::<Value, _>(ServiceError::OutOfStock(3)));
        assert_eq!(reply.status, 403);
        assert!(!reply.is_success());
        assert_eq!(
            reply.into_result(),
            Err(ServiceError::Upstream {
                status: 403,
                body: json!({ "success": false, "message": "Out of stock" })
            })
        );
    }

    #[tokio::test]
    async fn unknown_endpoint_is_unreachable() {
        let backend = LocalBackend::new();
        let err = backend.info(&Endpoint::new("mem://nowhere"), 1).await.unwrap_err();
        assert_eq!(err.status_code(), 502);
    }
}
