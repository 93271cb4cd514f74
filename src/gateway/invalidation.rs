//! Turning change events into cache invalidations.
//!
//! | Topic                                  | Effect                              | Republish |
//! |----------------------------------------|-------------------------------------|-----------|
//! | `book_change[_replica]`                | drop `item:<id>` and `search:<name>`| yes       |
//! | `catalog_change[_replica]`             | drop every `search:*` entry         | yes       |
//! | `order_confirmation_original/_replica` | drop `item:<book_id>`               | yes       |
//! | `cache_invalidate` from elsewhere      | drop the named key                  | no        |
//! | `cache_invalidate` from this gateway   | nothing                             | no        |

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::router::Gateway;
use crate::bus::{self, topic, Event, InMemoryBus, ListenerHandle};
use crate::cache::CacheKey;
use crate::error::ServiceError;

/// Every topic the gateway reacts to.
pub const GATEWAY_TOPICS: [&str; 7] = [
    topic::CATALOG_CHANGE,
    topic::CATALOG_CHANGE_REPLICA,
    topic::BOOK_CHANGE,
    topic::BOOK_CHANGE_REPLICA,
    topic::ORDER_CONFIRMATION_ORIGINAL,
    topic::ORDER_CONFIRMATION_REPLICA,
    topic::CACHE_INVALIDATE,
];

/// What an event asks the gateway to drop.
#[derive(Debug, Clone, PartialEq)]
pub enum Invalidation {
    /// Local change: drop these keys and tell other gateways.
    Keys(Vec<CacheKey>),
    /// Catalog membership changed: drop every search result.
    AllSearches,
    /// Another gateway already handled this: drop quietly.
    Remote(CacheKey),
    /// Our own `cache_invalidate` coming back.
    Ignore,
}

impl Invalidation {
    /// Decide what `event` invalidates. Malformed payloads are errors.
    pub fn for_event(event: &Event, own_origin: &str) -> Result<Self, ServiceError> {
        match event.topic.as_str() {
            topic::BOOK_CHANGE | topic::BOOK_CHANGE_REPLICA => {
                let info = field(event, &event.payload, "book_info")?;
                let id = info
                    .get("id")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| malformed(event, "book_info.id"))?;
                let mut keys = vec![CacheKey::item(id)];
                if let Some(name) = info.get("name").and_then(Value::as_str) {
                    keys.push(CacheKey::search(name));
                }
                Ok(Invalidation::Keys(keys))
            }
            topic::CATALOG_CHANGE | topic::CATALOG_CHANGE_REPLICA => {
                field(event, &event.payload, "catalog_info")?;
                Ok(Invalidation::AllSearches)
            }
            topic::ORDER_CONFIRMATION_ORIGINAL | topic::ORDER_CONFIRMATION_REPLICA => {
                let info = field(event, &event.payload, "order_info")?;
                let id = ordered_book_id(info).ok_or_else(|| malformed(event, "order_info.book_id"))?;
                Ok(Invalidation::Keys(vec![CacheKey::item(id)]))
            }
            topic::CACHE_INVALIDATE => {
                if event.payload.get("origin").and_then(Value::as_str) == Some(own_origin) {
                    return Ok(Invalidation::Ignore);
                }
                let key = field(event, &event.payload, "key")?;
                parse_key(key)
                    .map(Invalidation::Remote)
                    .ok_or_else(|| malformed(event, "key"))
            }
            other => Err(ServiceError::InvalidInput(format!(
                "gateway does not handle topic {}",
                other
            ))),
        }
    }
}

impl Gateway {
    /// Apply a change event to the cache. Returns how many entries were
    /// actually present and removed.
    pub fn apply_event(&self, event: &Event) -> Result<usize, ServiceError> {
        let removed = match Invalidation::for_event(event, self.origin())? {
            Invalidation::Keys(keys) => keys
                .iter()
                .map(|key| self.invalidate(key, true))
                .filter(|removed| *removed)
                .count(),
            Invalidation::AllSearches => self.invalidate_searches(true).len(),
            Invalidation::Remote(key) => usize::from(self.invalidate(&key, false)),
            Invalidation::Ignore => 0,
        };
        tracing::debug!(topic = %event.topic, event_id = %event.id, removed, "change event applied");
        Ok(removed)
    }
}

/// Start the gateway's invalidation listener on `bus`.
pub fn spawn_invalidation_listener(gateway: Arc<Gateway>, bus: &InMemoryBus) -> ListenerHandle {
    bus::listen(
        "gateway-invalidation",
        bus.subscribe(&GATEWAY_TOPICS),
        Duration::from_millis(10),
        move |event| gateway.apply_event(event).map(|_| ()),
    )
}

fn field<'a>(event: &Event, value: &'a Value, name: &str) -> Result<&'a Value, ServiceError> {
    value
        .get(name)
        .filter(|v| !v.is_null())
        .ok_or_else(|| malformed(event, name))
}

fn malformed(event: &Event, what: &str) -> ServiceError {
    ServiceError::InvalidInput(format!("{} event {} has no usable {}", event.topic, event.id, what))
}

fn ordered_book_id(order_info: &Value) -> Option<u64> {
    order_info.get("book_id").and_then(Value::as_u64).or_else(|| {
        let book_info = order_info.get("book_info")?;
        book_info
            .pointer("/books/id")
            .or_else(|| book_info.get("id"))
            .and_then(Value::as_u64)
    })
}

/// Tagged keys, plus bare numbers (item ids) and bare strings (search
/// terms) from senders that do not tag.
fn parse_key(raw: &Value) -> Option<CacheKey> {
    match raw {
        Value::Object(_) => serde_json::from_value(raw.clone()).ok(),
        Value::Number(n) => n.as_u64().map(CacheKey::item),
        Value::String(term) => Some(CacheKey::search(term.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan(topic: &str, payload: Value) -> Result<Invalidation, ServiceError> {
        Invalidation::for_event(&Event::new(topic, payload), "gw-1")
    }

    #[test]
    fn book_change_drops_item_and_search() {
        assert_eq!(
            plan(topic::BOOK_CHANGE_REPLICA, json!({ "book_info": { "id": 42, "name": "Dune" } })).unwrap(),
            Invalidation::Keys(vec![CacheKey::item(42), CacheKey::search("Dune")])
        );
    }

    #[test]
    fn catalog_change_drops_all_searches() {
        assert_eq!(
            plan(topic::CATALOG_CHANGE, json!({ "catalog_info": { "id": 1, "name": "Fiction" } })).unwrap(),
            Invalidation::AllSearches
        );
    }

    #[test]
    fn order_confirmation_finds_book_id() {
        let tagged = json!({ "order_info": { "book_id": 3 } });
        let snapshot_only = json!({ "order_info": { "book_info": { "books": { "id": 4 } } } });
        assert_eq!(
            plan(topic::ORDER_CONFIRMATION_ORIGINAL, tagged).unwrap(),
            Invalidation::Keys(vec![CacheKey::item(3)])
        );
        assert_eq!(
            plan(topic::ORDER_CONFIRMATION_REPLICA, snapshot_only).unwrap(),
            Invalidation::Keys(vec![CacheKey::item(4)])
        );
    }

    #[test]
    fn cache_invalidate_origin_and_key_forms() {
        assert_eq!(
            plan(topic::CACHE_INVALIDATE, json!({ "key": { "namespace": "item", "value": 1 }, "origin": "gw-1" })).unwrap(),
            Invalidation::Ignore
        );
        assert_eq!(
            plan(topic::CACHE_INVALIDATE, json!({ "key": { "namespace": "search", "value": "42" }, "origin": "gw-2" })).unwrap(),
            Invalidation::Remote(CacheKey::search("42"))
        );
        assert_eq!(
            plan(topic::CACHE_INVALIDATE, json!({ "key": 42 })).unwrap(),
            Invalidation::Remote(CacheKey::item(42))
        );
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(plan(topic::BOOK_CHANGE, json!({})).is_err());
        assert!(plan(topic::BOOK_CHANGE, json!({ "book_info": { "name": "x" } })).is_err());
        assert!(plan(topic::ORDER_CONFIRMATION_ORIGINAL, json!({ "order_info": {} })).is_err());
        assert!(plan(topic::CACHE_INVALIDATE, json!({ "key": null })).is_err());
        assert!(plan("unrelated", json!({})).is_err());
    }
}
