//! Gateway Router - backend selection, read-through caching, forwarding.
//!
//! Per request:
//!
//! ```text
//! RECEIVE ─▶ SELECT_BACKEND ─▶ CACHE_LOOKUP ─┬─ hit ──────────────────────────────▶ RETURN
//!                                             └─ miss ─▶ FORWARD ─▶ CACHE_STORE ─▶ RETURN
//! ```
//!
//! Purchases skip the cache and invalidate the purchased item on success.
//! Nothing is retried and a failed request never fails over to another
//! pool member.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::backend::{Backend, BackendResponse};
use crate::bus::{publish_best_effort, topic, Event, Publisher};
use crate::cache::{CacheKey, LruCache, DEFAULT_CAPACITY};
use crate::error::ServiceError;
use crate::registry::{BackendRegistry, Endpoint, PoolClass};

/// Gateway tuning knobs.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    cache_capacity: usize,
    backend_timeout: Duration,
    invalidate_after_info: bool,
    origin: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CAPACITY,
            backend_timeout: Duration::from_secs(5),
            invalidate_after_info: true,
            origin: format!("gateway-{}", Uuid::new_v4()),
        }
    }
}

impl GatewayConfig {
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    /// Drop the item entry right after serving `/info` (on by default).
    pub fn with_invalidate_after_info(mut self, enabled: bool) -> Self {
        self.invalidate_after_info = enabled;
        self
    }

    /// Identity stamped on the `cache_invalidate` events this gateway sends.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache_capacity
    }

    pub fn backend_timeout(&self) -> Duration {
        self.backend_timeout
    }

    pub fn invalidate_after_info(&self) -> bool {
        self.invalidate_after_info
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }
}

/// The front tier.
///
/// ## Example
///
/// ```
/// use std::sync::Arc;
/// use bookstore::bus::InMemoryBus;
/// use bookstore::catalog::{BookForm, CatalogService};
/// use bookstore::gateway::{Gateway, GatewayConfig, LocalBackend};
/// use bookstore::registry::BackendRegistry;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let bus = InMemoryBus::new();
/// let catalog = Arc::new(CatalogService::primary(Arc::new(bus.clone())));
/// catalog.create_book(BookForm {
///     name: Some("Dune".into()),
///     catalog: Some("1".into()),
///     count: Some("1".into()),
///     price: Some("9.5".into()),
/// }).unwrap();
///
/// let gateway = Gateway::new(
///     BackendRegistry::new(vec!["mem://catalog".into()], vec![]),
///     Arc::new(LocalBackend::new().with_catalog("mem://catalog", catalog)),
///     Arc::new(bus.clone()),
///     GatewayConfig::default(),
/// );
///
/// let found = gateway.search("Dune").await.unwrap();
/// assert_eq!(found["books"][0]["id"], 1);
/// assert_eq!(gateway.cache().len(), 1);
/// # });
/// ```
pub struct Gateway {
    registry: BackendRegistry,
    cache: LruCache,
    backend: Arc<dyn Backend>,
    publisher: Arc<dyn Publisher>,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(
        registry: BackendRegistry,
        backend: Arc<dyn Backend>,
        publisher: Arc<dyn Publisher>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            registry,
            cache: LruCache::new(config.cache_capacity),
            backend,
            publisher,
            config,
        }
    }

    pub fn cache(&self) -> &LruCache {
        &self.cache
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn origin(&self) -> &str {
        &self.config.origin
    }

    /// `GET /search/{term}`
    pub async fn search(&self, term: &str) -> Result<Value, ServiceError> {
        self.read_through(PoolClass::Search, CacheKey::search(term))
            .await
    }

    /// `GET /info/{id}`
    pub async fn info(&self, id: u64) -> Result<Value, ServiceError> {
        let body = self.read_through(PoolClass::Info, CacheKey::item(id)).await?;
        if self.config.invalidate_after_info {
            self.invalidate(&CacheKey::item(id), true);
        }
        Ok(body)
    }

    /// `POST /purchase/{id}`
    pub async fn purchase(&self, id: u64) -> Result<Value, ServiceError> {
        let endpoint = self.select(PoolClass::Purchase)?;
        let started = Instant::now();
        let reply = self
            .bounded(endpoint, self.backend.purchase(endpoint, id))
            .await?;
        let body = self.accept(endpoint, reply)?;

        tracing::info!(
            book_id = id,
            endpoint = %endpoint,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "purchase completed"
        );
        self.invalidate(&CacheKey::item(id), true);
        Ok(body)
    }

    /// `GET /cached_data`: current cache contents keyed by display key.
    pub fn cached_data(&self) -> Value {
        let mut dump = Map::new();
        for (key, value) in self.cache.snapshot() {
            dump.insert(key.to_string(), value);
        }
        Value::Object(dump)
    }

    /// `GET /health`
    pub fn health(&self) -> Value {
        json!({
            "ok": true,
            "origin": self.origin(),
            "pools": {
                "catalog": self.registry.pool(PoolClass::Search).len(),
                "order": self.registry.pool(PoolClass::Purchase).len(),
            },
            "cache": self.cache.stats(),
        })
    }

    /// Drop one key. With `republish`, tell other gateways through a
    /// `cache_invalidate` event. Absent keys are not an error.
    pub fn invalidate(&self, key: &CacheKey, republish: bool) -> bool {
        let removed = self.cache.invalidate(key);
        tracing::info!(key = %key, removed, "cache invalidated");
        if republish {
            self.announce(key);
        }
        removed
    }

    /// Drop every cached search result.
    pub fn invalidate_searches(&self, republish: bool) -> Vec<CacheKey> {
        let removed = self.cache.invalidate_where(CacheKey::is_search);
        tracing::info!(removed = removed.len(), "search results invalidated");
        if republish {
            for key in &removed {
                self.announce(key);
            }
        }
        removed
    }

    fn announce(&self, key: &CacheKey) {
        publish_best_effort(
            self.publisher.as_ref(),
            Event::new(
                topic::CACHE_INVALIDATE,
                json!({ "key": key, "origin": self.origin() }),
            ),
        );
    }

    async fn read_through(&self, class: PoolClass, key: CacheKey) -> Result<Value, ServiceError> {
        let endpoint = self.select(class)?;

        // Read before the lookup: an invalidation landing while the request
        // is forwarded must win over the reply it would replace.
        let generation = self.cache.generation();
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(key = %key, "cache hit");
            return Ok(hit);
        }
        tracing::debug!(key = %key, endpoint = %endpoint, "cache miss, forwarding");

        let started = Instant::now();
        let reply = match &key {
            CacheKey::Search(term) => {
                self.bounded(endpoint, self.backend.search(endpoint, term))
                    .await?
            }
            CacheKey::Item(id) => self.bounded(endpoint, self.backend.info(endpoint, *id)).await?,
        };
        let body = self.accept(endpoint, reply)?;
        tracing::info!(
            key = %key,
            endpoint = %endpoint,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request forwarded"
        );

        if !self.cache.put_if_unchanged(key.clone(), body.clone(), generation) {
            tracing::debug!(key = %key, "invalidated while forwarding, reply not cached");
        }
        Ok(body)
    }

    fn select(&self, class: PoolClass) -> Result<&Endpoint, ServiceError> {
        self.registry
            .next(class)
            .map_err(|e| ServiceError::BackendUnavailable(e.to_string()))
    }

    /// Non-success replies are passed through untouched.
    fn accept(&self, endpoint: &Endpoint, reply: BackendResponse) -> Result<Value, ServiceError> {
        reply.into_result().map_err(|e| {
            tracing::warn!(endpoint = %endpoint, status = e.status_code(), "backend returned an error");
            e
        })
    }

    async fn bounded<F>(&self, endpoint: &Endpoint, call: F) -> Result<BackendResponse, ServiceError>
    where
        F: Future<Output = Result<BackendResponse, ServiceError>>,
    {
        let timeout = self.config.backend_timeout;
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(e)) => {
                tracing::warn!(endpoint = %endpoint, error = %e, "backend unreachable");
                Err(e)
            }
            Err(_) => {
                tracing::warn!(endpoint = %endpoint, ?timeout, "backend timed out");
                Err(ServiceError::BackendUnavailable(format!(
                    "{} did not answer within {:?}",
                    endpoint, timeout
                )))
            }
        }
    }
}
