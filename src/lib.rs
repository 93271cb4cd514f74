//! bookstore - a three-tier bookstore.
//!
//! A gateway rotates client requests over redundant catalog and order
//! instances, caches read responses, and drops cache entries when change
//! events arrive. Catalog and order services each run as a primary/replica
//! pair, kept loosely in sync by a lazy bootstrap copy and best-effort
//! notifications.
//!
//! Everything runs in one process for tests (`LocalBackend`,
//! `LocalCatalogClient`, `StoreBookSource` over one `InMemoryBus`), or as
//! five processes over HTTP with the `http` feature.

pub mod bus;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod gateway;
pub mod order;
pub mod registry;
pub mod role;

#[cfg(feature = "http")]
pub mod http;

pub use cache::{CacheKey, LruCache};
pub use config::{Config, Process};
pub use error::{PurchaseStage, ServiceError};
pub use gateway::{Gateway, GatewayConfig};
pub use registry::{BackendRegistry, Endpoint, PoolClass};
pub use role::Role;
