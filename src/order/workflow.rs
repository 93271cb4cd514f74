//! The purchase workflow.
//!
//! ```text
//! availability ──▶ decrease ──▶ snapshot ──▶ record ──▶ confirm
//!   (advisory)    (atomic,        │            │
//!                  authoritative) │            │
//!                      │          │            │
//!                  bad reply ─────┴── fail ────┴──▶ increase (once) ──▶ PartialPurchase
//! ```
//!
//! The steps are separate calls against one catalog instance and are not
//! transactional. Overselling is prevented by the catalog's atomic
//! decrement-if-positive, not by the availability check. A failure after
//! the decrement is compensated by a single re-increment and surfaced as
//! [`ServiceError::PartialPurchase`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use super::client::{count_field, CatalogClient};
use super::model::Order;
use super::store::OrderRepository;
use crate::bus::{publish_best_effort, topic, Event, Publisher};
use crate::cache::CacheKey;
use crate::error::{PurchaseStage, ServiceError};
use crate::role::Role;

pub struct OrderWorkflow {
    role: Role,
    catalog: Arc<dyn CatalogClient>,
    orders: Arc<dyn OrderRepository>,
    publisher: Arc<dyn Publisher>,
    timeout: Duration,
}

impl OrderWorkflow {
    pub fn new(
        role: Role,
        catalog: Arc<dyn CatalogClient>,
        orders: Arc<dyn OrderRepository>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            role,
            catalog,
            orders,
            publisher,
            timeout: Duration::from_secs(5),
        }
    }

    /// Bound every catalog call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Buy one unit of book `id`.
    pub async fn purchase(&self, id: u64) -> Result<Order, ServiceError> {
        self.bounded("availability", self.catalog.availability(id))
            .await?;

        // Losing a race here surfaces as the catalog's out-of-stock reply.
        // An unknown outcome is not compensated: the decrement may never
        // have happened.
        let decreased = self.bounded("decrease", self.catalog.decrease(id)).await?;

        // From here on the unit is taken, even if the reply is unreadable.
        let left = match count_field(&decreased, "count") {
            Ok(left) => left,
            Err(e) => return Err(self.compensate(id, PurchaseStage::Decrease, e).await),
        };

        let snapshot = match self.bounded("snapshot", self.catalog.book(id)).await {
            Ok(snapshot) => snapshot,
            Err(e) => return Err(self.compensate(id, PurchaseStage::Snapshot, e).await),
        };

        let order = match self.orders.record(id, snapshot, Utc::now()) {
            Ok(order) => order,
            Err(e) => return Err(self.compensate(id, PurchaseStage::Record, e).await),
        };

        tracing::info!(
            role = %self.role,
            order_id = order.id,
            book_id = id,
            book = order.book_name().unwrap_or("?"),
            left,
            "user purchased book"
        );
        self.confirm(&order);
        Ok(order)
    }

    fn confirm(&self, order: &Order) {
        publish_best_effort(
            self.publisher.as_ref(),
            Event::new(topic::order_confirmation(self.role), order.confirmation()),
        );
        if self.role == Role::Primary {
            publish_best_effort(
                self.publisher.as_ref(),
                Event::new(
                    topic::CACHE_INVALIDATE,
                    json!({ "key": CacheKey::item(order.book_id), "origin": format!("order-{}", self.role) }),
                ),
            );
        }
    }

    async fn compensate(&self, id: u64, stage: PurchaseStage, cause: ServiceError) -> ServiceError {
        let compensated = match self.bounded("increase", self.catalog.increase(id)).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(book_id = id, error = %e, "compensating increase failed");
                false
            }
        };
        tracing::error!(
            role = %self.role,
            book_id = id,
            stage = %stage,
            compensated,
            error = %cause,
            "purchase failed after stock was decremented"
        );
        ServiceError::PartialPurchase {
            book_id: id,
            stage,
            compensated,
            reason: cause.to_string(),
        }
    }

    async fn bounded<T, F>(&self, step: &str, call: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::BackendUnavailable(format!(
                "catalog {} timed out after {:?}",
                step, self.timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::order::InMemoryOrderStore;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Scripted catalog: a stock counter plus switches for failing steps.
    #[derive(Default)]
    struct FakeCatalog {
        stock: AtomicU32,
        fail_snapshot: AtomicBool,
        fail_increase: AtomicBool,
        hang_decrease: AtomicBool,
        garble_decrease: AtomicBool,
        calls: Mutex<Vec<&'static str>>,
    }

    impl FakeCatalog {
        fn with_stock(n: u32) -> Arc<Self> {
            let fake = Self::default();
            fake.stock.store(n, Ordering::SeqCst);
            Arc::new(fake)
        }

        fn log(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl CatalogClient for FakeCatalog {
        async fn availability(&self, id: u64) -> Result<u32, ServiceError> {
            self.log("availability");
            match self.stock.load(Ordering::SeqCst) {
                0 => Err(ServiceError::OutOfStock(id)),
                n => Ok(n),
            }
        }

        async fn decrease(&self, id: u64) -> Result<Value, ServiceError> {
            self.log("decrease");
            if self.hang_decrease.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            let left = self
                .stock
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .map(|previous| previous - 1)
                .map_err(|_| ServiceError::OutOfStock(id))?;
            if self.garble_decrease.load(Ordering::SeqCst) {
                return Ok(json!({ "ok": true }));
            }
            Ok(json!({ "count": left }))
        }

        async fn increase(&self, _id: u64) -> Result<u32, ServiceError> {
            self.log("increase");
            if self.fail_increase.load(Ordering::SeqCst) {
                return Err(ServiceError::BackendUnavailable("catalog down".into()));
            }
            Ok(self.stock.fetch_add(1, Ordering::SeqCst) + 1)
        }

        async fn book(&self, id: u64) -> Result<Value, ServiceError> {
            self.log("book");
            if self.fail_snapshot.load(Ordering::SeqCst) {
                return Err(ServiceError::BackendUnavailable("catalog down".into()));
            }
            Ok(json!({ "books": { "id": id, "name": "Dune", "count": self.stock.load(Ordering::SeqCst) } }))
        }
    }

    struct BrokenOrders;

    impl OrderRepository for BrokenOrders {
        fn record(
            &self,
            _book_id: u64,
            _book_info: Value,
            _purchase_date: chrono::DateTime<Utc>,
        ) -> Result<Order, ServiceError> {
            Err(ServiceError::Internal("disk full".into()))
        }

        fn orders(&self) -> Result<Vec<Order>, ServiceError> {
            Ok(Vec::new())
        }
    }

    fn workflow(catalog: Arc<FakeCatalog>, orders: Arc<dyn OrderRepository>, bus: &InMemoryBus) -> OrderWorkflow {
        OrderWorkflow::new(Role::Primary, catalog, orders, Arc::new(bus.clone()))
    }

    #[tokio::test]
    async fn last_unit_then_out_of_stock() {
        let bus = InMemoryBus::new();
        let confirmations = bus.subscribe(&[topic::ORDER_CONFIRMATION_ORIGINAL]);
        let invalidations = bus.subscribe(&[topic::CACHE_INVALIDATE]);
        let catalog = FakeCatalog::with_stock(1);
        let orders = Arc::new(InMemoryOrderStore::new());
        let flow = workflow(catalog.clone(), orders.clone(), &bus);

        let order = flow.purchase(7).await.unwrap();
        assert_eq!(order.count, 1);
        assert_eq!(order.book_info["books"]["count"], 0);
        assert_eq!(catalog.stock.load(Ordering::SeqCst), 0);

        let err = flow.purchase(7).await.unwrap_err();
        assert!(err.is_out_of_stock());
        assert_eq!(orders.orders().unwrap().len(), 1);

        let confirmed = confirmations.drain();
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].payload["order_info"]["book_id"], 7);
        assert_eq!(
            invalidations.drain()[0].payload["key"],
            json!({ "namespace": "item", "value": 7 })
        );
    }

    #[tokio::test]
    async fn unreadable_decrease_reply_is_compensated() {
        let bus = InMemoryBus::new();
        let catalog = FakeCatalog::with_stock(3);
        catalog.garble_decrease.store(true, Ordering::SeqCst);
        let orders = Arc::new(InMemoryOrderStore::new());

        let err = workflow(catalog.clone(), orders.clone(), &bus)
            .purchase(4)
            .await
            .unwrap_err();

        match err {
            ServiceError::PartialPurchase {
                book_id,
                stage,
                compensated,
                ..
            } => {
                assert_eq!(book_id, 4);
                assert_eq!(stage, PurchaseStage::Decrease);
                assert!(compensated);
            }
            other => panic!("expected a partial purchase, got {:?}", other),
        }
        assert_eq!(catalog.stock.load(Ordering::SeqCst), 3);
        assert_eq!(
            *catalog.calls.lock().unwrap(),
            vec!["availability", "decrease", "increase"]
        );
        assert!(orders.orders().unwrap().is_empty());
    }

    #[tokio::test]
    async fn snapshot_failure_is_compensated() {
        let bus = InMemoryBus::new();
        let catalog = FakeCatalog::with_stock(2);
        catalog.fail_snapshot.store(true, Ordering::SeqCst);
        let orders = Arc::new(InMemoryOrderStore::new());

        let err = workflow(catalog.clone(), orders.clone(), &bus)
            .purchase(1)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ServiceError::PartialPurchase {
                book_id: 1,
                stage: PurchaseStage::Snapshot,
                compensated: true,
                reason: "backend unavailable: catalog down".into(),
            }
        );
        assert_eq!(catalog.stock.load(Ordering::SeqCst), 2);
        assert!(orders.orders().unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_failure_reports_failed_compensation() {
        let bus = InMemoryBus::new();
        let confirmations = bus.subscribe_all();
        let catalog = FakeCatalog::with_stock(2);
        catalog.fail_increase.store(true, Ordering::SeqCst);

        let err = workflow(catalog.clone(), Arc::new(BrokenOrders), &bus)
            .purchase(1)
            .await
            .unwrap_err();

        match err {
            ServiceError::PartialPurchase {
                stage, compensated, ..
            } => {
                assert_eq!(stage, PurchaseStage::Record);
                assert!(!compensated);
            }
            other => panic!("expected partial purchase, got {:?}", other),
        }
        assert_eq!(catalog.stock.load(Ordering::SeqCst), 1);
        assert!(confirmations.drain().is_empty());
        assert_eq!(
            *catalog.calls.lock().unwrap(),
            vec!["availability", "decrease", "book", "increase"]
        );
    }

    #[tokio::test]
    async fn decrease_timeout_is_not_compensated() {
        let bus = InMemoryBus::new();
        let catalog = FakeCatalog::with_stock(1);
        catalog.hang_decrease.store(true, Ordering::SeqCst);

        let err = workflow(catalog.clone(), Arc::new(InMemoryOrderStore::new()), &bus)
            .with_timeout(Duration::from_millis(20))
            .purchase(1)
            .await
            .unwrap_err();

        assert_eq!(err.status_code(), 502);
        assert_eq!(*catalog.calls.lock().unwrap(), vec!["availability", "decrease"]);
    }
}
