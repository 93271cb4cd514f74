//! Core publisher types for the notification bus.

use std::error::Error;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A change notification carried by the bus.
///
/// The payload is always a single JSON object describing the changed entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: String,
    /// Topic the event is published on (e.g. "book_change")
    pub topic: String,
    /// JSON projection of the changed entity
    pub payload: Value,
}

impl Event {
    /// Create an event with a fresh id.
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), topic, payload)
    }

    /// Create an event with a caller-supplied id.
    pub fn with_id(id: impl Into<String>, topic: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            payload,
        }
    }

    /// Create an event by serializing a typed payload.
    pub fn encode<T: Serialize>(topic: impl Into<String>, payload: &T) -> Result<Self, PublishError> {
        let value = serde_json::to_value(payload)
            .map_err(|e| PublishError::SerializationFailed(e.to_string()))?;
        Ok(Self::new(topic, value))
    }

    /// Decode the payload into a typed struct.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PublishError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| PublishError::SerializationFailed(e.to_string()))
    }
}

/// Error type for bus operations.
#[derive(Debug)]
pub enum PublishError {
    /// Remote peer could not be reached
    ConnectionFailed(String),
    /// Payload could not be (de)serialized
    SerializationFailed(String),
    /// Every publisher handle was dropped; nothing more will arrive
    Closed,
    /// Internal lock poisoned
    Poisoned(&'static str),
    /// Other error
    Other(Box<dyn Error + Send + Sync>),
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            PublishError::SerializationFailed(msg) => write!(f, "Serialization failed: {}", msg),
            PublishError::Closed => write!(f, "Bus closed"),
            PublishError::Poisoned(op) => write!(f, "Bus lock poisoned during {}", op),
            PublishError::Other(e) => write!(f, "Publish error: {}", e),
        }
    }
}

impl Error for PublishError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PublishError::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Trait for publishing events.
///
/// Publishing is fire-and-forget: implementations must not wait for
/// subscribers to process the event, and a successful return says nothing
/// about delivery.
pub trait Publisher: Send + Sync {
    /// Publish a single event.
    fn publish(&self, event: Event) -> Result<(), PublishError>;

    /// Publish multiple events.
    ///
    /// Default implementation publishes events sequentially.
    fn publish_batch(&self, events: Vec<Event>) -> Result<(), PublishError> {
        for event in events {
            self.publish(event)?;
        }
        Ok(())
    }
}

/// Publishes every event to each inner publisher in turn.
///
/// A failing publisher does not stop the others; the first error is returned.
pub struct FanoutPublisher {
    publishers: Vec<std::sync::Arc<dyn Publisher>>,
}

impl FanoutPublisher {
    pub fn new(publishers: Vec<std::sync::Arc<dyn Publisher>>) -> Self {
        Self { publishers }
    }
}

impl Publisher for FanoutPublisher {
    fn publish(&self, event: Event) -> Result<(), PublishError> {
        let mut first_error = None;
        for publisher in &self.publishers {
            if let Err(e) = publisher.publish(event.clone()) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Publish and log on failure. Notifications are advisory, so callers
/// never fail an operation because a publish did not go through.
pub fn publish_best_effort(publisher: &dyn Publisher, event: Event) {
    let topic = event.topic.clone();
    if let Err(e) = publisher.publish(event) {
        tracing::warn!(topic = %topic, error = %e, "dropping change notification");
    }
}
