//! Order Workflow - purchases against one catalog instance.
//!
//! The order primary runs the workflow against the catalog primary and the
//! order replica against the catalog replica, independently. Neither
//! forwards book data to the other.

mod client;
mod model;
mod service;
mod store;
mod workflow;

pub use client::{CatalogClient, LocalCatalogClient};
pub use model::Order;
pub use service::OrderService;
pub use store::{InMemoryOrderStore, OrderRepository};
pub use workflow::OrderWorkflow;

pub(crate) use client::count_field;
