//! In-process fan-out bus.
//!
//! Every `InMemoryBus` clone shares the same subscription table. Publishing
//! hands a copy of the event to each subscription registered for its topic
//! *at that moment*; nothing is stored, so a subscription created later never
//! sees earlier events.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Event, PublishError, Publisher, Subscriber};

struct Slot {
    /// Empty means "every topic".
    topics: Vec<String>,
    tx: Sender<Event>,
}

impl Slot {
    fn accepts(&self, topic: &str) -> bool {
        self.topics.is_empty() || self.topics.iter().any(|t| t == topic)
    }
}

/// In-memory publish/subscribe bus.
///
/// ## Example
///
/// ```
/// use bookstore::bus::{Event, InMemoryBus, Publisher, Subscriber};
/// use serde_json::json;
///
/// let bus = InMemoryBus::new();
/// let books = bus.subscribe(&["book_change"]);
///
/// bus.publish(Event::new("book_change", json!({ "book_info": { "id": 1 } }))).unwrap();
/// bus.publish(Event::new("catalog_change", json!({}))).unwrap();
///
/// let event = books.poll(10).unwrap().unwrap();
/// assert_eq!(event.topic, "book_change");
/// assert!(books.poll(10).unwrap().is_none());
/// ```
#[derive(Clone, Default)]
pub struct InMemoryBus {
    slots: Arc<Mutex<Vec<Slot>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the given topics.
    pub fn subscribe(&self, topics: &[&str]) -> Subscription {
        self.register(topics.iter().map(|t| t.to_string()).collect())
    }

    /// Subscribe to every topic.
    pub fn subscribe_all(&self) -> Subscription {
        self.register(Vec::new())
    }

    /// Number of live subscriptions (dropped ones are pruned on publish).
    pub fn subscriber_count(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    fn register(&self, topics: Vec<String>) -> Subscription {
        let (tx, rx) = mpsc::channel();
        match self.slots.lock() {
            Ok(mut slots) => slots.push(Slot {
                topics: topics.clone(),
                tx,
            }),
            // The sender is dropped here, so the subscription reports Closed.
            Err(_) => tracing::error!("bus subscription table poisoned"),
        }
        Subscription { topics, rx }
    }
}

impl Publisher for InMemoryBus {
    fn publish(&self, event: Event) -> Result<(), PublishError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| PublishError::Poisoned("publish"))?;
        // Channels are unbounded, so sending never waits on a subscriber.
        slots.retain(|slot| !slot.accepts(&event.topic) || slot.tx.send(event.clone()).is_ok());
        Ok(())
    }
}

/// Receiving end of a bus subscription.
pub struct Subscription {
    topics: Vec<String>,
    rx: Receiver<Event>,
}

impl Subscription {
    /// Topics this subscription listens to (empty means all).
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Take every event that is already waiting, without blocking.
    pub fn drain(&self) -> Vec<Event> {
        self.rx.try_iter().collect()
    }
}

impl Subscriber for Subscription {
    fn poll(&self, timeout_ms: u64) -> Result<Option<Event>, PublishError> {
        if timeout_ms == 0 {
            return match self.rx.try_recv() {
                Ok(event) => Ok(Some(event)),
                Err(TryRecvError::Empty) => Ok(None),
                Err(TryRecvError::Disconnected) => Err(PublishError::Closed),
            };
        }
        match self.rx.recv_timeout(Duration::from_millis(timeout_ms)) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(PublishError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(topic: &str) -> Event {
        Event::new(topic, json!({}))
    }

    #[test]
    fn publish_and_poll() {
        let bus = InMemoryBus::new();
        let sub = bus.subscribe(&["book_change"]);

        bus.publish(Event::new("book_change", json!({ "book_info": { "id": 3 } })))
            .unwrap();

        let received = sub.poll(100).unwrap().unwrap();
        assert_eq!(received.topic, "book_change");
        assert_eq!(received.payload["book_info"]["id"], 3);
    }

    #[test]
    fn poll_timeout_when_empty() {
        let bus = InMemoryBus::new();
        let sub = bus.subscribe(&["book_change"]);
        assert!(sub.poll(10).unwrap().is_none());
        assert!(sub.poll(0).unwrap().is_none());
    }

    #[test]
    fn fans_out_to_every_matching_subscriber() {
        let bus = InMemoryBus::new();
        let a = bus.subscribe(&["book_change"]);
        let b = bus.subscribe(&["book_change", "catalog_change"]);
        let c = bus.subscribe(&["catalog_change"]);

        bus.publish(event("book_change")).unwrap();

        assert_eq!(a.drain().len(), 1);
        assert_eq!(b.drain().len(), 1);
        assert!(c.drain().is_empty());
    }

    #[test]
    fn late_subscribers_miss_earlier_events() {
        let bus = InMemoryBus::new();
        bus.publish(event("book_change")).unwrap();

        let late = bus.subscribe(&["book_change"]);
        assert!(late.poll(10).unwrap().is_none());

        bus.publish(event("book_change")).unwrap();
        assert_eq!(late.drain().len(), 1);
    }

    #[test]
    fn subscribe_all_sees_every_topic() {
        let bus = InMemoryBus::new();
        let all = bus.subscribe_all();

        bus.publish_batch(vec![event("a"), event("b"), event("c")])
            .unwrap();

        let topics: Vec<String> = all.drain().into_iter().map(|e| e.topic).collect();
        assert_eq!(topics, vec!["a", "b", "c"]);
    }

    #[test]
    fn dropped_subscriptions_are_pruned() {
        let bus = InMemoryBus::new();
        let keep = bus.subscribe(&["t"]);
        let dropped = bus.subscribe(&["t"]);
        assert_eq!(bus.subscriber_count(), 2);

        drop(dropped);
        bus.publish(event("t")).unwrap();

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(keep.drain().len(), 1);
    }

    #[test]
    fn closed_once_bus_is_gone() {
        let bus = InMemoryBus::new();
        let sub = bus.subscribe(&["t"]);
        drop(bus);
        assert!(matches!(sub.poll(10), Err(PublishError::Closed)));
    }
}
