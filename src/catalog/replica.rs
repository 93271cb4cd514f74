//! Lazy replica bootstrap: copy the primary's books on first use.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::model::Book;
use super::service::CatalogService;
use super::store::CatalogStore;
use crate::error::ServiceError;

/// Where a replica copies its initial book list from.
#[async_trait]
pub trait BookSource: Send + Sync {
    async fn fetch_books(&self) -> Result<Vec<Book>, ServiceError>;
}

/// Reads another in-process catalog service directly.
pub struct StoreBookSource {
    primary: Arc<CatalogService>,
}

impl StoreBookSource {
    pub fn new(primary: Arc<CatalogService>) -> Self {
        Self { primary }
    }
}

#[async_trait]
impl BookSource for StoreBookSource {
    async fn fetch_books(&self) -> Result<Vec<Book>, ServiceError> {
        self.primary.store().books()
    }
}

/// One-time copy guarded by a single async mutex.
///
/// The flag is only set after a successful copy, so concurrent first
/// requests all wait on the mutex and at most one of them performs the
/// fetch. Inserts are copy-if-absent by id, which keeps the copy
/// idempotent even if it ever ran twice.
pub struct Bootstrap {
    source: Arc<dyn BookSource>,
    done: AtomicBool,
    guard: Mutex<()>,
}

impl Bootstrap {
    pub fn new(source: Arc<dyn BookSource>) -> Self {
        Self {
            source,
            done: AtomicBool::new(false),
            guard: Mutex::new(()),
        }
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Copy the source's books into `store` unless that already happened.
    /// Returns how many books this call inserted.
    ///
    /// On a failed fetch the flag stays unset, so the next request retries.
    pub async fn ensure(&self, store: &CatalogStore) -> Result<usize, ServiceError> {
        if self.is_done() {
            return Ok(0);
        }
        let _held = self.guard.lock().await;
        if self.is_done() {
            return Ok(0);
        }

        let books = self.source.fetch_books().await?;
        let fetched = books.len();
        let mut inserted = 0;
        for book in books {
            if store.insert_if_absent(book)? {
                inserted += 1;
            }
        }
        self.done.store(true, Ordering::Release);

        tracing::info!(fetched, inserted, "replica bootstrap complete");
        Ok(inserted)
    }
}
