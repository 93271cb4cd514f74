//! Background listener thread: poll a subscription and dispatch to a handler.

use std::sync::mpsc::{self, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{Event, PublishError, Subscriber};
use crate::error::ServiceError;

/// Statistics from a listener thread.
#[derive(Debug, Default, Clone)]
pub struct ListenerStats {
    /// Events the handler accepted.
    pub handled: usize,
    /// Events the handler rejected.
    pub failed: usize,
    /// Poll cycles completed.
    pub polls: usize,
}

/// Handle to a background listener thread. Drop or call `stop()` to shut down.
pub struct ListenerHandle {
    name: String,
    stop_tx: mpsc::Sender<()>,
    handle: Option<JoinHandle<ListenerStats>>,
}

impl ListenerHandle {
    /// Stop the listener and wait for it to finish. Returns stats.
    pub fn stop(mut self) -> ListenerStats {
        let _ = self.stop_tx.send(());
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_default(),
            None => ListenerStats::default(),
        }
    }

    /// Signal stop without waiting.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(());
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}

/// Start a background thread that polls `subscriber` and hands each event
/// to `handler`.
///
/// Handler failures are logged and counted; the event is not redelivered.
/// The thread exits when stopped or when the bus closes.
///
/// ## Example
///
/// ```
/// use std::time::Duration;
/// use bookstore::bus::{self, Event, InMemoryBus, Publisher};
/// use serde_json::json;
///
/// let bus = InMemoryBus::new();
/// let handle = bus::listen(
///     "book-log",
///     bus.subscribe(&["book_change"]),
///     Duration::from_millis(10),
///     |event| {
///         println!("{}", event.payload);
///         Ok(())
///     },
/// );
///
/// bus.publish(Event::new("book_change", json!({ "book_info": { "id": 1 } }))).unwrap();
/// std::thread::sleep(Duration::from_millis(100));
/// assert_eq!(handle.stop().handled, 1);
/// ```
pub fn listen<S, F>(
    name: &str,
    subscriber: S,
    poll_interval: Duration,
    mut handler: F,
) -> ListenerHandle
where
    S: Subscriber + 'static,
    F: FnMut(&Event) -> Result<(), ServiceError> + Send + 'static,
{
    let (stop_tx, stop_rx) = mpsc::channel();
    let thread_name = name.to_string();
    let poll_ms = poll_interval.as_millis().max(1) as u64;

    let handle = thread::spawn(move || {
        let mut stats = ListenerStats::default();

        loop {
            match stop_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            stats.polls += 1;

            match subscriber.poll(poll_ms) {
                Ok(Some(event)) => match handler(&event) {
                    Ok(()) => stats.handled += 1,
                    Err(e) => {
                        tracing::warn!(
                            listener = %thread_name,
                            topic = %event.topic,
                            event_id = %event.id,
                            error = %e,
                            "event handler failed"
                        );
                        stats.failed += 1;
                    }
                },
                Ok(None) => {}
                Err(PublishError::Closed) => {
                    tracing::debug!(listener = %thread_name, "bus closed, listener exiting");
                    break;
                }
                Err(e) => {
                    tracing::warn!(listener = %thread_name, error = %e, "poll failed");
                }
            }
        }

        stats
    });

    ListenerHandle {
        name: name.to_string(),
        stop_tx,
        handle: Some(handle),
    }
}
