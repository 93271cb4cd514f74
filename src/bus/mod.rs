//! Notification Bus - best-effort change events between services.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  publish(topic, payload)  ┌──────────────────────────┐
//! │ catalog /    │ ────────────────────────▶ │ InMemoryBus              │
//! │ order /      │                           │  fan-out to current      │
//! │ gateway      │                           │  subscriptions, no log   │
//! └──────────────┘                           └──────────────────────────┘
//!                                               │            │
//!                                               ▼            ▼
//!                                        Subscription   Subscription
//!                                               │            │
//!                                        listen(thread) listen(thread)
//! ```
//!
//! Delivery is at-most-once and unordered across topics. Nothing is
//! persisted and nothing is acknowledged: a consumer that was not
//! subscribed at publish time, or whose process is down, never sees the
//! event. Consumers must therefore treat every event as an advisory hint
//! and be idempotent.

mod in_memory;
mod listener;
mod publisher;
mod subscriber;
pub mod topic;

pub use in_memory::{InMemoryBus, Subscription};
pub use listener::{listen, ListenerHandle, ListenerStats};
pub use publisher::{publish_best_effort, Event, FanoutPublisher, PublishError, Publisher};
pub use subscriber::Subscriber;
