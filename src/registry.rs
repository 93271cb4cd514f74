//! Backend Pool Registry - static endpoint pools with round-robin cursors.
//!
//! The gateway keeps one pool of catalog endpoints (used for `search` and
//! `info`) and one pool of order endpoints (used for `purchase`). Each
//! operation class has its own cursor, so searches and info lookups rotate
//! independently even though they share a pool.
//!
//! There is no health checking: a dead endpoint stays in rotation and its
//! failures surface to the caller.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// Base URL (or in-process name) of one backend instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Endpoint(url.into().trim_end_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Join a path onto this endpoint.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.0, path.trim_start_matches('/'))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(url: &str) -> Self {
        Endpoint::new(url)
    }
}

impl From<String> for Endpoint {
    fn from(url: String) -> Self {
        Endpoint::new(url)
    }
}

/// Operation class; each class owns one cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolClass {
    Search,
    Info,
    Purchase,
}

impl PoolClass {
    pub const ALL: [PoolClass; 3] = [PoolClass::Search, PoolClass::Info, PoolClass::Purchase];

    fn index(self) -> usize {
        match self {
            PoolClass::Search => 0,
            PoolClass::Info => 1,
            PoolClass::Purchase => 2,
        }
    }
}

impl fmt::Display for PoolClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolClass::Search => write!(f, "search"),
            PoolClass::Info => write!(f, "info"),
            PoolClass::Purchase => write!(f, "purchase"),
        }
    }
}

/// Error type for registry operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The pool backing this class has no endpoints.
    EmptyPool(PoolClass),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::EmptyPool(class) => write!(f, "no endpoints configured for {}", class),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Ordered endpoint pools plus one atomic cursor per operation class.
///
/// ## Example
///
/// ```
/// use bookstore::registry::{BackendRegistry, PoolClass};
///
/// let registry = BackendRegistry::new(
///     vec!["http://a".into(), "http://b".into()],
///     vec!["http://orders".into()],
/// );
///
/// assert_eq!(registry.next(PoolClass::Search).unwrap().as_str(), "http://a");
/// assert_eq!(registry.next(PoolClass::Search).unwrap().as_str(), "http://b");
/// assert_eq!(registry.next(PoolClass::Search).unwrap().as_str(), "http://a");
/// // Info has its own cursor.
/// assert_eq!(registry.next(PoolClass::Info).unwrap().as_str(), "http://a");
/// ```
#[derive(Debug)]
pub struct BackendRegistry {
    catalog: Vec<Endpoint>,
    order: Vec<Endpoint>,
    cursors: [AtomicUsize; 3],
}

impl BackendRegistry {
    pub fn new(catalog: Vec<Endpoint>, order: Vec<Endpoint>) -> Self {
        Self {
            catalog,
            order,
            cursors: [AtomicUsize::new(0), AtomicUsize::new(0), AtomicUsize::new(0)],
        }
    }

    /// Pool that serves the given class.
    pub fn pool(&self, class: PoolClass) -> &[Endpoint] {
        match class {
            PoolClass::Search | PoolClass::Info => &self.catalog,
            PoolClass::Purchase => &self.order,
        }
    }

    /// Return the endpoint under the class cursor and advance the cursor by
    /// one modulo the pool size.
    ///
    /// The read-and-advance is a single atomic step, so concurrent callers
    /// each get a distinct slot and no endpoint is skipped.
    pub fn next(&self, class: PoolClass) -> Result<&Endpoint, RegistryError> {
        let pool = self.pool(class);
        if pool.is_empty() {
            return Err(RegistryError::EmptyPool(class));
        }
        let len = pool.len();
        let cursor = &self.cursors[class.index()];
        let slot = match cursor.fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| {
            Some((i + 1) % len)
        }) {
            Ok(previous) | Err(previous) => previous,
        };
        Ok(&pool[slot % len])
    }

    /// Current cursor position for a class (the index the next call returns).
    pub fn cursor(&self, class: PoolClass) -> usize {
        self.cursors[class.index()].load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::thread;

    fn endpoints(names: &[&str]) -> Vec<Endpoint> {
        names.iter().map(|n| Endpoint::new(*n)).collect()
    }

    #[test]
    fn n_calls_visit_each_endpoint_once_in_order() {
        let registry = BackendRegistry::new(endpoints(&["a", "b", "c"]), vec![]);
        let picked: Vec<&str> = (0..6)
            .map(|_| registry.next(PoolClass::Info).unwrap().as_str())
            .collect();
        assert_eq!(picked, vec!["a", "b", "c", "a", "b", "c"]);
    }

    #[test]
    fn catalog_pool_a_b_routes_a_b_a() {
        let registry = BackendRegistry::new(endpoints(&["A", "B"]), vec![]);
        let picked: Vec<&str> = (0..3)
            .map(|_| registry.next(PoolClass::Search).unwrap().as_str())
            .collect();
        assert_eq!(picked, vec!["A", "B", "A"]);
    }

    #[test]
    fn classes_rotate_independently() {
        let registry = BackendRegistry::new(endpoints(&["a", "b"]), endpoints(&["x", "y"]));
        assert_eq!(registry.next(PoolClass::Search).unwrap().as_str(), "a");
        assert_eq!(registry.next(PoolClass::Info).unwrap().as_str(), "a");
        assert_eq!(registry.next(PoolClass::Search).unwrap().as_str(), "b");
        assert_eq!(registry.next(PoolClass::Purchase).unwrap().as_str(), "x");
        assert_eq!(registry.next(PoolClass::Purchase).unwrap().as_str(), "y");
        assert_eq!(registry.cursor(PoolClass::Info), 1);
    }

    #[test]
    fn empty_pool_is_an_error() {
        let registry = BackendRegistry::new(endpoints(&["a"]), vec![]);
        assert_eq!(
            registry.next(PoolClass::Purchase),
            Err(RegistryError::EmptyPool(PoolClass::Purchase))
        );
    }

    #[test]
    fn concurrent_dispatch_stays_fair() {
        let registry = Arc::new(BackendRegistry::new(endpoints(&["a", "b", "c", "d"]), vec![]));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    (0..1000)
                        .map(|_| registry.next(PoolClass::Search).unwrap().clone())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts: HashMap<Endpoint, usize> = HashMap::new();
        for t in threads {
            for endpoint in t.join().unwrap() {
                *counts.entry(endpoint).or_default() += 1;
            }
        }

        // 8000 dispatches over 4 endpoints: exactly 2000 each.
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&n| n == 2000));
    }

    #[test]
    fn endpoint_url_joins_paths() {
        let endpoint = Endpoint::new("http://127.0.0.1:4000/");
        assert_eq!(endpoint.url("/books/1"), "http://127.0.0.1:4000/books/1");
        assert_eq!(endpoint.url("books/1"), "http://127.0.0.1:4000/books/1");
    }
}
