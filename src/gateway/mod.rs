//! Gateway - the client-facing tier.
//!
//! Rotates requests over the catalog and order pools, serves reads from an
//! LRU cache, and drops cache entries when change events arrive. Reads may
//! be stale until the matching invalidation is processed.

mod backend;
mod invalidation;
mod router;

pub use backend::{Backend, BackendResponse, LocalBackend};
pub use invalidation::{spawn_invalidation_listener, Invalidation, GATEWAY_TOPICS};
pub use router::{Gateway, GatewayConfig};
