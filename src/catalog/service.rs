//! Catalog service: the operations both catalog instances expose.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use super::model::{BookForm, CatalogForm, PriceForm};
use super::replica::{Bootstrap, BookSource};
use super::store::CatalogStore;
use crate::bus::{self, publish_best_effort, topic, Event, InMemoryBus, ListenerHandle, Publisher};
use crate::error::ServiceError;
use crate::role::Role;

/// One catalog instance, primary or replica.
///
/// Mutations apply to this instance's store only and publish change events
/// on the topics of its role. Nothing replays one instance's writes onto
/// the other; a replica only copies the primary once, on first use.
///
/// ## Example
///
/// ```
/// use std::sync::Arc;
/// use bookstore::bus::InMemoryBus;
/// use bookstore::catalog::{BookForm, CatalogService};
///
/// let bus = InMemoryBus::new();
/// let catalog = CatalogService::primary(Arc::new(bus.clone()));
///
/// let created = catalog
///     .create_book(BookForm {
///         name: Some("Dune".into()),
///         catalog: Some("1".into()),
///         count: Some("2".into()),
///         price: Some("9.5".into()),
///     })
///     .unwrap();
/// assert_eq!(created["book_id"], 1);
/// assert_eq!(catalog.decrease(1).unwrap()["count"], 1);
/// ```
pub struct CatalogService {
    role: Role,
    store: CatalogStore,
    publisher: Arc<dyn Publisher>,
    bootstrap: Option<Bootstrap>,
}

impl CatalogService {
    pub fn primary(publisher: Arc<dyn Publisher>) -> Self {
        Self {
            role: Role::Primary,
            store: CatalogStore::new(),
            publisher,
            bootstrap: None,
        }
    }

    /// A replica that copies `source` before serving its first request.
    pub fn replica(publisher: Arc<dyn Publisher>, source: Arc<dyn BookSource>) -> Self {
        Self {
            role: Role::Replica,
            store: CatalogStore::new(),
            publisher,
            bootstrap: Some(Bootstrap::new(source)),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrap.as_ref().map_or(true, Bootstrap::is_done)
    }

    /// Run the replica bootstrap if it has not happened yet. Must be awaited
    /// before every request a replica handles. A failed copy is logged and
    /// the request proceeds against whatever the store holds.
    pub async fn ready(&self) {
        if let Some(bootstrap) = &self.bootstrap {
            if let Err(e) = bootstrap.ensure(&self.store).await {
                tracing::warn!(error = %e, "replica bootstrap failed, retrying on next request");
            }
        }
    }

    pub fn list_catalogs(&self) -> Result<Value, ServiceError> {
        let catalogs: Vec<Value> = self.store.catalogs()?.iter().map(|c| c.to_json()).collect();
        Ok(json!({ "catalogs": catalogs }))
    }

    pub fn create_catalog(&self, form: CatalogForm) -> Result<Value, ServiceError> {
        let name = form.validate()?;
        let catalog = self.store.create_catalog(name)?;
        tracing::info!(role = %self.role, catalog_id = catalog.id, "catalog created");

        self.publish(
            topic::catalog_change(self.role),
            json!({ "catalog_info": catalog.to_json() }),
        );
        Ok(json!({ "success": true, "catalog": catalog.name, "catalog_id": catalog.id }))
    }

    pub fn list_books(&self) -> Result<Value, ServiceError> {
        let books: Vec<Value> = self.store.books()?.iter().map(|b| b.to_json()).collect();
        Ok(json!({ "books": books }))
    }

    pub fn create_book(&self, form: BookForm) -> Result<Value, ServiceError> {
        let new = form.validate()?;
        let book = self.store.create_book(new)?;
        tracing::info!(role = %self.role, book_id = book.id, name = %book.name, "book created");

        let catalog_name = self.store.catalog(book.catalog)?.map(|c| c.name);
        self.publish(
            topic::catalog_change(self.role),
            json!({ "catalog_info": { "id": book.catalog, "name": catalog_name } }),
        );
        self.publish(
            topic::book_change(self.role),
            json!({ "book_info": book.to_json() }),
        );
        Ok(json!({ "success": true, "book": book.name, "book_id": book.id }))
    }

    /// Exact-name search.
    pub fn search(&self, name: &str) -> Result<Value, ServiceError> {
        let hits: Vec<Value> = self.store.search_exact(name)?.iter().map(|b| b.search_hit()).collect();
        Ok(json!({ "books": hits }))
    }

    /// Substring search.
    pub fn find(&self, fragment: &str) -> Result<Value, ServiceError> {
        let hits: Vec<Value> = self
            .store
            .find_containing(fragment)?
            .iter()
            .map(|b| b.find_hit())
            .collect();
        Ok(json!({ "books": hits }))
    }

    pub fn book(&self, id: u64) -> Result<Value, ServiceError> {
        Ok(json!({ "books": self.store.book(id)?.to_json() }))
    }

    /// Advisory stock check. Only [`decrease`](Self::decrease) is
    /// authoritative under concurrency.
    pub fn availability(&self, id: u64) -> Result<Value, ServiceError> {
        let book = self.store.book(id)?;
        if book.count == 0 {
            return Err(ServiceError::OutOfStock(id));
        }
        Ok(json!({ "success": true, "left": book.count }))
    }

    /// Atomic decrement-if-positive.
    pub fn decrease(&self, id: u64) -> Result<Value, ServiceError> {
        let book = self.store.decrement_if_positive(id)?;
        tracing::debug!(role = %self.role, book_id = id, left = book.count, "stock decreased");
        self.publish(topic::book_change(self.role), json!({ "book_info": book.to_json() }));
        Ok(json!({ "count": book.count }))
    }

    pub fn increase(&self, id: u64) -> Result<Value, ServiceError> {
        let book = self.store.increment(id)?;
        tracing::debug!(role = %self.role, book_id = id, left = book.count, "stock increased");
        self.publish(topic::book_change(self.role), json!({ "book_info": book.to_json() }));
        Ok(json!({ "count": book.count }))
    }

    pub fn set_price(&self, id: u64, form: PriceForm) -> Result<Value, ServiceError> {
        let price = form.validate()?;
        let book = self.store.set_price(id, price)?;
        self.publish(topic::book_change(self.role), json!({ "book_info": book.to_json() }));
        Ok(json!({ "price": book.price }))
    }

    /// Log change events published by the other instance of the pair.
    /// Purely informational: the events never touch this store.
    pub fn watch_counterpart(&self, bus: &InMemoryBus) -> ListenerHandle {
        let counterpart = self.role.counterpart();
        let catalog_topic = topic::catalog_change(counterpart);
        let book_topic = topic::book_change(counterpart);
        let role = self.role;

        bus::listen(
            &format!("catalog-{}-watch", role),
            bus.subscribe(&[catalog_topic, book_topic]),
            Duration::from_millis(50),
            move |event| {
                let field = if event.topic == catalog_topic {
                    "catalog_info"
                } else {
                    "book_info"
                };
                let info = event.payload.get(field).ok_or_else(|| {
                    ServiceError::InvalidInput(format!("{} without {}", event.topic, field))
                })?;
                tracing::info!(role = %role, from = %counterpart, topic = %event.topic, info = %info, "counterpart change");
                Ok(())
            },
        )
    }

    fn publish(&self, topic: &str, payload: Value) {
        publish_best_effort(self.publisher.as_ref(), Event::new(topic, payload));
    }
}
