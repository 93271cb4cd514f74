use std::fmt;

use serde::{Deserialize, Serialize};

/// Cache key tagged with its namespace.
///
/// Search terms and item ids live in separate namespaces, so the term
/// `"42"` and the item `42` never alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "namespace", content = "value", rename_all = "snake_case")]
pub enum CacheKey {
    /// Result of `GET /search/{term}`.
    Search(String),
    /// Result of `GET /info/{id}`.
    Item(u64),
}

impl CacheKey {
    pub fn search(term: impl Into<String>) -> Self {
        CacheKey::Search(term.into())
    }

    pub fn item(id: u64) -> Self {
        CacheKey::Item(id)
    }

    pub fn is_search(&self) -> bool {
        matches!(self, CacheKey::Search(_))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Search(term) => write!(f, "search:{}", term),
            CacheKey::Item(id) => write!(f, "item:{}", id),
        }
    }
}
