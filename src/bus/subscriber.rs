//! Core subscriber trait for the notification bus.

use super::publisher::{Event, PublishError};

/// Pull-based subscription to bus events.
///
/// Delivery is at-most-once with no acknowledgment: an event handed out by
/// `poll` is gone from the subscription whether or not it was processed.
pub trait Subscriber: Send {
    /// Wait up to `timeout_ms` for the next event.
    ///
    /// Returns `Ok(None)` on timeout and `Err(PublishError::Closed)` once no
    /// publisher can ever deliver again.
    fn poll(&self, timeout_ms: u64) -> Result<Option<Event>, PublishError>;
}
