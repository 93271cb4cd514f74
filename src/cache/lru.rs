//! Bounded least-recently-used cache of JSON responses.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use serde_json::Value;

use super::CacheKey;

struct Entry {
    value: Value,
    tick: u64,
}

/// Map plus a recency index. `recency` maps each entry's last-access tick
/// to its key, so the smallest tick is always the LRU victim.
///
/// `generation` counts invalidation calls, whether or not they removed
/// anything.
#[derive(Default)]
struct Inner {
    entries: HashMap<CacheKey, Entry>,
    recency: BTreeMap<u64, CacheKey>,
    tick: u64,
    generation: u64,
}

impl Inner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn touch(&mut self, key: &CacheKey) -> Option<Value> {
        let tick = self.next_tick();
        let entry = self.entries.get_mut(key)?;
        self.recency.remove(&entry.tick);
        entry.tick = tick;
        self.recency.insert(tick, key.clone());
        Some(entry.value.clone())
    }

    fn remove(&mut self, key: &CacheKey) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.recency.remove(&entry.tick);
                true
            }
            None => false,
        }
    }

    fn evict_lru(&mut self) -> Option<CacheKey> {
        let (_, key) = self.recency.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub entries: usize,
    pub capacity: usize,
}

/// Thread-safe LRU cache with a fixed capacity.
///
/// Every operation takes one mutex for its whole duration, so concurrent
/// `get`/`put`/`invalidate` calls always behave like some serial order and
/// the recency index can never drift from the entry map. Clones share the
/// same storage.
///
/// ## Example
///
/// ```
/// use bookstore::cache::{CacheKey, LruCache};
/// use serde_json::json;
///
/// let cache = LruCache::new(2);
/// cache.put(CacheKey::item(1), json!({ "id": 1 }));
/// cache.put(CacheKey::item(2), json!({ "id": 2 }));
///
/// // Touch 1 so 2 becomes the least recently used.
/// assert!(cache.get(&CacheKey::item(1)).is_some());
/// cache.put(CacheKey::item(3), json!({ "id": 3 }));
///
/// assert!(cache.get(&CacheKey::item(2)).is_none());
/// assert!(cache.get(&CacheKey::item(1)).is_some());
/// ```
#[derive(Clone)]
pub struct LruCache {
    inner: Arc<Mutex<Inner>>,
    counters: Arc<Counters>,
    capacity: usize,
}

impl LruCache {
    /// Create a cache holding at most `capacity` entries. A capacity of zero
    /// stores nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            counters: Arc::new(Counters::default()),
            capacity,
        }
    }

    // No operation panics while holding the lock, so a poisoned guard still
    // protects a consistent map.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up a key, refreshing its recency on hit.
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let found = self.lock().touch(key);
        let counter = if found.is_some() {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Look up a key without touching recency or statistics.
    pub fn peek(&self, key: &CacheKey) -> Option<Value> {
        self.lock().entries.get(key).map(|e| e.value.clone())
    }

    /// Invalidation generation. Read it before fetching a value that will be
    /// stored with [`put_if_unchanged`](Self::put_if_unchanged).
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Insert or replace a value, evicting least-recently-used entries while
    /// over capacity. Returns the evicted keys.
    pub fn put(&self, key: CacheKey, value: Value) -> Vec<CacheKey> {
        let inner = self.lock();
        self.store(inner, key, value)
    }

    /// Like [`put`](Self::put), but only if no invalidation happened since
    /// `generation` was read. Returns false when an invalidation got in first.
    pub fn put_if_unchanged(&self, key: CacheKey, value: Value, generation: u64) -> bool {
        let inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        self.store(inner, key, value);
        true
    }

    fn store(&self, mut inner: MutexGuard<'_, Inner>, key: CacheKey, value: Value) -> Vec<CacheKey> {
        if self.capacity == 0 {
            return Vec::new();
        }
        inner.remove(&key);
        let tick = inner.next_tick();
        inner.recency.insert(tick, key.clone());
        inner.entries.insert(key, Entry { value, tick });

        let mut evicted = Vec::new();
        while inner.entries.len() > self.capacity {
            match inner.evict_lru() {
                Some(victim) => evicted.push(victim),
                None => break,
            }
        }
        drop(inner);

        if !evicted.is_empty() {
            self.counters
                .evictions
                .fetch_add(evicted.len() as u64, Ordering::Relaxed);
            tracing::debug!(evicted = ?evicted, "cache over capacity");
        }
        evicted
    }

    /// Remove a key. Absent keys are fine; returns whether it was present.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.remove(key)
        };
        if removed {
            self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Remove every key matching `predicate`. Returns the removed keys.
    pub fn invalidate_where<F>(&self, predicate: F) -> Vec<CacheKey>
    where
        F: Fn(&CacheKey) -> bool,
    {
        let mut inner = self.lock();
        inner.generation += 1;
        let doomed: Vec<CacheKey> = inner.entries.keys().filter(|k| predicate(k)).cloned().collect();
        for key in &doomed {
            inner.remove(key);
        }
        drop(inner);
        self.counters
            .invalidations
            .fetch_add(doomed.len() as u64, Ordering::Relaxed);
        doomed
    }

    /// Current contents, most recently used first.
    pub fn snapshot(&self) -> Vec<(CacheKey, Value)> {
        let inner = self.lock();
        inner
            .recency
            .values()
            .rev()
            .filter_map(|key| {
                inner
                    .entries
                    .get(key)
                    .map(|entry| (key.clone(), entry.value.clone()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            entries: self.len(),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    fn item(id: u64) -> CacheKey {
        CacheKey::item(id)
    }

    #[test]
    fn capacity_plus_one_evicts_exactly_the_lru() {
        let cache = LruCache::new(3);
        for id in 1..=3 {
            cache.put(item(id), json!(id));
        }
        let evicted = cache.put(item(4), json!(4));

        assert_eq!(evicted, vec![item(1)]);
        assert_eq!(cache.len(), 3);
        assert!(cache.peek(&item(1)).is_none());
        for id in 2..=4 {
            assert!(cache.peek(&item(id)).is_some());
        }
    }

    #[test]
    fn get_refreshes_recency() {
        let cache = LruCache::new(2);
        cache.put(item(1), json!(1));
        cache.put(item(2), json!(2));
        assert_eq!(cache.get(&item(1)), Some(json!(1)));

        let evicted = cache.put(item(3), json!(3));
        assert_eq!(evicted, vec![item(2)]);
    }

    #[test]
    fn put_refreshes_recency_and_replaces_value() {
        let cache = LruCache::new(2);
        cache.put(item(1), json!("old"));
        cache.put(item(2), json!(2));
        cache.put(item(1), json!("new"));

        let evicted = cache.put(item(3), json!(3));
        assert_eq!(evicted, vec![item(2)]);
        assert_eq!(cache.peek(&item(1)), Some(json!("new")));
    }

    #[test]
    fn invalidate_then_get_misses_even_if_never_present() {
        let cache = LruCache::new(4);
        assert!(!cache.invalidate(&item(99)));
        assert!(cache.get(&item(99)).is_none());

        cache.put(item(1), json!(1));
        assert!(cache.invalidate(&item(1)));
        assert!(cache.get(&item(1)).is_none());
    }

    #[test]
    fn invalidate_where_by_namespace() {
        let cache = LruCache::new(8);
        cache.put(CacheKey::search("dune"), json!([]));
        cache.put(CacheKey::search("emma"), json!([]));
        cache.put(item(1), json!(1));

        let mut removed = cache.invalidate_where(CacheKey::is_search);
        removed.sort();
        assert_eq!(removed, vec![CacheKey::search("dune"), CacheKey::search("emma")]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn fill_after_invalidation_is_dropped() {
        let cache = LruCache::new(4);
        cache.put(item(2), json!("other"));

        let before = cache.generation();
        // Nothing cached under item 1 yet, but the invalidation still counts.
        assert!(!cache.invalidate(&item(1)));
        assert!(!cache.put_if_unchanged(item(1), json!("stale"), before));
        assert!(cache.peek(&item(1)).is_none());

        let now = cache.generation();
        assert!(cache.put_if_unchanged(item(1), json!("fresh"), now));
        assert_eq!(cache.peek(&item(1)), Some(json!("fresh")));

        cache.invalidate_where(CacheKey::is_search);
        assert!(!cache.put_if_unchanged(item(3), json!("late"), now));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn snapshot_is_most_recent_first() {
        let cache = LruCache::new(4);
        cache.put(item(1), json!(1));
        cache.put(item(2), json!(2));
        cache.get(&item(1));

        let keys: Vec<CacheKey> = cache.snapshot().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![item(1), item(2)]);
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let cache = LruCache::new(0);
        assert!(cache.put(item(1), json!(1)).is_empty());
        assert!(cache.is_empty());
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let cache = LruCache::new(1);
        cache.get(&item(1));
        cache.put(item(1), json!(1));
        cache.get(&item(1));
        cache.put(item(2), json!(2));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.capacity, 1);
    }

    #[test]
    fn concurrent_access_keeps_structure_consistent() {
        let cache = LruCache::new(16);
        let threads: Vec<_> = (0..8u64)
            .map(|t| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..500u64 {
                        let key = item((t * 7 + i) % 40);
                        match i % 3 {
                            0 => {
                                cache.put(key, json!(i));
                            }
                            1 => {
                                cache.get(&key);
                            }
                            _ => {
                                cache.invalidate(&key);
                            }
                        }
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert!(cache.len() <= 16);
        let inner = cache.lock();
        assert_eq!(inner.entries.len(), inner.recency.len());
        for (tick, key) in &inner.recency {
            assert_eq!(inner.entries[key].tick, *tick);
        }
    }
}
