use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use super::{events, reply};
use crate::bus::InMemoryBus;
use crate::gateway::Gateway;

/// Client-facing routes plus `POST /events` into `bus`.
pub fn router(gateway: Arc<Gateway>, bus: InMemoryBus) -> Router {
    Router::new()
        .route("/search/:term", get(search))
        .route("/info/:id", get(info))
        .route("/purchase/:id", post(purchase))
        .route("/cached_data", get(cached_data))
        .route("/health", get(health))
        .with_state(gateway)
        .merge(events::router(bus))
}

async fn search(State(gateway): State<Arc<Gateway>>, Path(term): Path<String>) -> Response {
    reply(gateway.search(&term).await)
}

async fn info(State(gateway): State<Arc<Gateway>>, Path(id): Path<u64>) -> Response {
    reply(gateway.info(id).await)
}

async fn purchase(State(gateway): State<Arc<Gateway>>, Path(id): Path<u64>) -> Response {
    reply(gateway.purchase(id).await)
}

async fn cached_data(State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    Json(gateway.cached_data())
}

async fn health(State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    Json(gateway.health())
}
