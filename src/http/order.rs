use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;

use super::{events, reply};
use crate::bus::InMemoryBus;
use crate::order::OrderService;

/// Order routes plus `POST /events` into `bus`.
pub fn router(service: Arc<OrderService>, bus: InMemoryBus) -> Router {
    Router::new()
        .route("/purchase/:id", post(purchase))
        .route("/orders", get(list_orders))
        .with_state(service)
        .merge(events::router(bus))
}

async fn purchase(State(service): State<Arc<OrderService>>, Path(id): Path<u64>) -> Response {
    reply(service.purchase(id).await)
}

async fn list_orders(State(service): State<Arc<OrderService>>) -> Response {
    reply(service.list_orders())
}
