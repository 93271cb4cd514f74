use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use super::client::CatalogClient;
use super::store::{InMemoryOrderStore, OrderRepository};
use super::workflow::OrderWorkflow;
use crate::bus::{self, publish_best_effort, topic, Event, InMemoryBus, ListenerHandle, Publisher};
use crate::error::ServiceError;
use crate::role::Role;

/// One order instance: the purchase workflow plus its order table.
pub struct OrderService {
    role: Role,
    workflow: OrderWorkflow,
    orders: Arc<dyn OrderRepository>,
    publisher: Arc<dyn Publisher>,
}

impl OrderService {
    /// An order service with an in-memory order table.
    pub fn new(role: Role, catalog: Arc<dyn CatalogClient>, publisher: Arc<dyn Publisher>) -> Self {
        Self::with_repository(role, catalog, Arc::new(InMemoryOrderStore::new()), publisher)
    }

    pub fn with_repository(
        role: Role,
        catalog: Arc<dyn CatalogClient>,
        orders: Arc<dyn OrderRepository>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let workflow = OrderWorkflow::new(role, catalog, Arc::clone(&orders), Arc::clone(&publisher));
        Self {
            role,
            workflow,
            orders,
            publisher,
        }
    }

    /// Bound every catalog call made by the workflow.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.workflow = self.workflow.with_timeout(timeout);
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// `POST /purchase/{id}`.
    pub async fn purchase(&self, id: u64) -> Result<Value, ServiceError> {
        let order = self.workflow.purchase(id).await?;
        Ok(json!({ "order": order.to_json() }))
    }

    /// `GET /orders`.
    pub fn list_orders(&self) -> Result<Value, ServiceError> {
        let orders: Vec<Value> = self.orders.orders()?.iter().map(|o| o.to_json()).collect();
        Ok(json!({ "orders": orders }))
    }

    /// Start the confirmation listener.
    ///
    /// The primary relays every `order_confirmation_original` it hears as
    /// `order_confirmation_replica`; the replica logs the confirmations it
    /// receives. Neither touches its own order table.
    pub fn watch_confirmations(&self, bus: &InMemoryBus) -> ListenerHandle {
        let role = self.role;
        let publisher = Arc::clone(&self.publisher);
        let subscription = match role {
            Role::Primary => bus.subscribe(&[topic::ORDER_CONFIRMATION_ORIGINAL]),
            Role::Replica => bus.subscribe(&[topic::ORDER_CONFIRMATION_REPLICA]),
        };

        bus::listen(
            &format!("order-{}-confirmations", role),
            subscription,
            Duration::from_millis(50),
            move |event| {
                let order_info = event.payload.get("order_info").ok_or_else(|| {
                    ServiceError::InvalidInput(format!("{} without order_info", event.topic))
                })?;
                match role {
                    Role::Primary => {
                        publish_best_effort(
                            publisher.as_ref(),
                            Event::new(
                                topic::ORDER_CONFIRMATION_REPLICA,
                                json!({ "order_info": order_info }),
                            ),
                        );
                        tracing::info!(order_info = %order_info, "order confirmation relayed to replica");
                    }
                    Role::Replica => {
                        tracing::info!(order_info = %order_info, "order confirmation received");
                    }
                }
                Ok(())
            },
        )
    }
}
