//! Cross-process bus bridge.
//!
//! `HttpPublisher` posts each event to every peer's `POST /events`; the
//! receiving router republishes it into its local bus only. Bridged
//! events are never forwarded again, so two processes cannot bounce an
//! event between them.

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use tokio::runtime::Handle;

use crate::bus::{Event, InMemoryBus, PublishError, Publisher};
use crate::registry::Endpoint;

/// `POST /events` into `bus`.
pub fn router(bus: InMemoryBus) -> Router {
    Router::new()
        .route("/events", post(receive_event))
        .with_state(bus)
}

async fn receive_event(State(bus): State<InMemoryBus>, Json(event): Json<Event>) -> StatusCode {
    tracing::debug!(topic = %event.topic, event_id = %event.id, "bridged event received");
    match bus.publish(event) {
        Ok(()) => StatusCode::ACCEPTED,
        Err(e) => {
            tracing::warn!(error = %e, "bridged event dropped");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Fire-and-forget fan-out of events to peer processes.
///
/// `publish` returns immediately; each delivery runs as its own task and
/// failures are only logged.
pub struct HttpPublisher {
    client: reqwest::Client,
    peers: Vec<Endpoint>,
    runtime: Handle,
}

impl HttpPublisher {
    /// Must be called from inside a tokio runtime; deliveries are spawned
    /// onto it even when `publish` is called from a plain thread.
    pub fn new(peers: Vec<Endpoint>, timeout: Duration) -> Result<Self, PublishError> {
        let runtime = Handle::try_current().map_err(|e| PublishError::Other(Box::new(e)))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PublishError::Other(Box::new(e)))?;
        Ok(Self {
            client,
            peers,
            runtime,
        })
    }

    pub fn peers(&self) -> &[Endpoint] {
        &self.peers
    }
}

impl Publisher for HttpPublisher {
    fn publish(&self, event: Event) -> Result<(), PublishError> {
        for peer in &self.peers {
            let client = self.client.clone();
            let url = peer.url("events");
            let event = event.clone();
            self.runtime.spawn(async move {
                let outcome = client.post(&url).json(&event).send().await;
                match outcome.and_then(|response| response.error_for_status()) {
                    Ok(_) => tracing::trace!(url = %url, topic = %event.topic, "event delivered"),
                    Err(e) => {
                        tracing::warn!(url = %url, topic = %event.topic, error = %e, "event delivery failed")
                    }
                }
            });
        }
        Ok(())
    }
}
