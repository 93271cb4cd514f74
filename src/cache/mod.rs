//! Response Cache - bounded LRU store of backend replies.
//!
//! The gateway keys read responses by [`CacheKey`] and drops entries when
//! change events arrive. Entries never expire on their own; staleness is
//! bounded only by how quickly invalidations reach the gateway.

mod key;
mod lru;

pub use key::CacheKey;
pub use lru::{CacheStats, LruCache};

/// Capacity used when none is configured.
pub const DEFAULT_CAPACITY: usize = 1000;
