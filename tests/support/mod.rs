//! Shared fixtures: a whole deployment wired together in one process.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bookstore::bus::InMemoryBus;
use bookstore::catalog::{BookForm, CatalogService, StoreBookSource};
use bookstore::gateway::{Gateway, GatewayConfig, LocalBackend};
use bookstore::order::{LocalCatalogClient, OrderService};
use bookstore::{BackendRegistry, Role};

pub const CATALOG_PRIMARY: &str = "mem://catalog-primary";
pub const CATALOG_REPLICA: &str = "mem://catalog-replica";
pub const ORDER_PRIMARY: &str = "mem://order-primary";
pub const ORDER_REPLICA: &str = "mem://order-replica";

/// Gateway, both catalog instances and both order instances sharing one bus.
pub struct Deployment {
    pub bus: InMemoryBus,
    pub catalog_primary: Arc<CatalogService>,
    pub catalog_replica: Arc<CatalogService>,
    pub order_primary: Arc<OrderService>,
    pub order_replica: Arc<OrderService>,
    pub gateway: Arc<Gateway>,
}

impl Deployment {
    pub fn new() -> Self {
        Self::with_gateway(GatewayConfig::default().with_origin("gw-a"))
    }

    pub fn with_gateway(config: GatewayConfig) -> Self {
        Self::build(config, vec![CATALOG_PRIMARY.into(), CATALOG_REPLICA.into()])
    }

    /// Like `with_gateway`, but with a custom catalog pool.
    pub fn build(config: GatewayConfig, catalog_pool: Vec<bookstore::Endpoint>) -> Self {
        let bus = InMemoryBus::new();
        let catalog_primary = Arc::new(CatalogService::primary(Arc::new(bus.clone())));
        let catalog_replica = Arc::new(CatalogService::replica(
            Arc::new(bus.clone()),
            Arc::new(StoreBookSource::new(Arc::clone(&catalog_primary))),
        ));
        let order_primary = Arc::new(OrderService::new(
            Role::Primary,
            Arc::new(LocalCatalogClient::new(Arc::clone(&catalog_primary))),
            Arc::new(bus.clone()),
        ));
        let order_replica = Arc::new(OrderService::new(
            Role::Replica,
            Arc::new(LocalCatalogClient::new(Arc::clone(&catalog_replica))),
            Arc::new(bus.clone()),
        ));

        let backend = LocalBackend::new()
            .with_catalog(CATALOG_PRIMARY, Arc::clone(&catalog_primary))
            .with_catalog(CATALOG_REPLICA, Arc::clone(&catalog_replica))
            .with_order(ORDER_PRIMARY, Arc::clone(&order_primary))
            .with_order(ORDER_REPLICA, Arc::clone(&order_replica));
        let gateway = Arc::new(Gateway::new(
            BackendRegistry::new(catalog_pool, vec![ORDER_PRIMARY.into(), ORDER_REPLICA.into()]),
            Arc::new(backend),
            Arc::new(bus.clone()),
            config,
        ));

        Self {
            bus,
            catalog_primary,
            catalog_replica,
            order_primary,
            order_replica,
            gateway,
        }
    }

    /// Create a book on the catalog primary and return its id.
    pub fn add_book(&self, name: &str, count: u32) -> u64 {
        let reply = self
            .catalog_primary
            .create_book(book_form(name, count))
            .unwrap();
        reply["book_id"].as_u64().unwrap()
    }
}

pub fn book_form(name: &str, count: u32) -> BookForm {
    BookForm {
        name: Some(name.to_string()),
        catalog: Some("1".to_string()),
        count: Some(count.to_string()),
        price: Some("9.99".to_string()),
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually<F: FnMut() -> bool>(mut condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
