//! Catalog Service Pair - books and catalogs, primary plus lazy replica.
//!
//! The primary owns the authoritative copy. The replica copies the primary's
//! books once, before its first request, and from then on applies only the
//! writes routed to it. The two drift apart unless callers mirror writes.

mod model;
mod replica;
mod service;
mod store;

pub use model::{Book, BookForm, Catalog, CatalogForm, NewBook, PriceForm};
pub use replica::{BookSource, Bootstrap, StoreBookSource};
pub use service::CatalogService;
pub use store::CatalogStore;
