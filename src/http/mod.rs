//! HTTP transport - axum routers for each process, reqwest clients for the
//! calls between them, and the `/events` bridge that carries bus events
//! across processes.
//!
//! Requires the `http` feature.
//!
//! ## Routes
//!
//! | Process | Routes                                                              |
//! |---------|---------------------------------------------------------------------|
//! | gateway | `GET /search/:term`, `GET /info/:id`, `POST /purchase/:id`, `GET /cached_data`, `GET /health` |
//! | catalog | `GET/POST /catalogs`, `GET/POST /books`, `GET /books/search/:name`, `GET /books/find`, `GET /books/:id`, `GET /books/:id/stock/availability`, `PUT /books/:id/count/{decrease,increase}`, `PUT /books/:id/price` |
//! | order   | `POST /purchase/:id`, `GET /orders`                                 |
//!
//! Every router also accepts `POST /events`.

mod catalog;
mod client;
mod events;
mod gateway;
mod order;

use std::future::Future;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::Value;

use crate::error::ServiceError;

pub use catalog::router as catalog_router;
pub use client::{GatewayClient, HttpBackend, HttpBookSource, HttpCatalogClient};
pub use events::{router as events_router, HttpPublisher};
pub use gateway::router as gateway_router;
pub use order::router as order_router;

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.body())).into_response()
    }
}

/// Render a service result as a JSON response.
pub(crate) fn reply(result: Result<Value, ServiceError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Serve `app` at `addr` (e.g. `"0.0.0.0:5000"`) until `shutdown` resolves.
pub async fn serve<F>(app: Router, addr: &str, shutdown: F) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
