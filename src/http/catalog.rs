use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, put};
use axum::{Form, Router};
use serde::Deserialize;

use super::{events, reply};
use crate::bus::InMemoryBus;
use crate::catalog::{BookForm, CatalogForm, CatalogService, PriceForm};

/// Catalog routes plus `POST /events` into `bus`.
///
/// On a replica every catalog route first waits for the bootstrap copy.
/// `/events` does not, so bridged events never trigger a copy.
pub fn router(service: Arc<CatalogService>, bus: InMemoryBus) -> Router {
    Router::new()
        .route("/catalogs", get(list_catalogs).post(create_catalog))
        .route("/books", get(list_books).post(create_book))
        .route("/books/search/:name", get(search))
        .route("/books/find", get(find))
        .route("/books/:id", get(book))
        .route("/books/:id/stock/availability", get(availability))
        .route("/books/:id/count/decrease", put(decrease))
        .route("/books/:id/count/increase", put(increase))
        .route("/books/:id/price", put(set_price))
        .layer(middleware::from_fn_with_state(service.clone(), bootstrap_first))
        .with_state(service)
        .merge(events::router(bus))
}

async fn bootstrap_first(
    State(service): State<Arc<CatalogService>>,
    request: Request,
    next: Next,
) -> Response {
    service.ready().await;
    next.run(request).await
}

type Catalog = State<Arc<CatalogService>>;

async fn list_catalogs(State(service): Catalog) -> Response {
    reply(service.list_catalogs())
}

async fn create_catalog(State(service): Catalog, Form(form): Form<CatalogForm>) -> Response {
    reply(service.create_catalog(form))
}

async fn list_books(State(service): Catalog) -> Response {
    reply(service.list_books())
}

async fn create_book(State(service): Catalog, Form(form): Form<BookForm>) -> Response {
    reply(service.create_book(form))
}

async fn search(State(service): Catalog, Path(name): Path<String>) -> Response {
    reply(service.search(&name))
}

#[derive(Debug, Deserialize)]
struct FindQuery {
    #[serde(default)]
    name: String,
}

async fn find(State(service): Catalog, Query(query): Query<FindQuery>) -> Response {
    reply(service.find(&query.name))
}

async fn book(State(service): Catalog, Path(id): Path<u64>) -> Response {
    reply(service.book(id))
}

async fn availability(State(service): Catalog, Path(id): Path<u64>) -> Response {
    reply(service.availability(id))
}

async fn decrease(State(service): Catalog, Path(id): Path<u64>) -> Response {
    reply(service.decrease(id))
}

async fn increase(State(service): Catalog, Path(id): Path<u64>) -> Response {
    reply(service.increase(id))
}

async fn set_price(
    State(service): Catalog,
    Path(id): Path<u64>,
    Form(form): Form<PriceForm>,
) -> Response {
    reply(service.set_price(id, form))
}
