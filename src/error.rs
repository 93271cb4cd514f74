use std::fmt;

use serde_json::{json, Value};

/// Step of the purchase workflow that failed after stock was already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseStage {
    /// Reading the catalog's reply to a decrement it accepted.
    Decrease,
    /// Fetching the post-decrement book snapshot.
    Snapshot,
    /// Persisting the order record.
    Record,
}

impl fmt::Display for PurchaseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PurchaseStage::Decrease => write!(f, "decrease"),
            PurchaseStage::Snapshot => write!(f, "snapshot"),
            PurchaseStage::Record => write!(f, "record"),
        }
    }
}

/// Error shared by the gateway, catalog and order services.
///
/// Every variant knows the HTTP status and JSON body it is rendered as, so
/// transports never have to re-classify an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// Entity absent.
    NotFound(String),
    /// Book count is zero.
    OutOfStock(u64),
    /// Missing or malformed required field. Nothing was persisted.
    InvalidInput(String),
    /// Network failure or timeout while talking to another service.
    BackendUnavailable(String),
    /// Non-success reply from another service, passed through verbatim.
    Upstream { status: u16, body: Value },
    /// Stock was decremented but the purchase could not be completed.
    PartialPurchase {
        book_id: u64,
        stage: PurchaseStage,
        compensated: bool,
        reason: String,
    },
    /// Unexpected failure (poisoned lock, storage fault).
    Internal(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::NotFound(what) => write!(f, "not found: {}", what),
            ServiceError::OutOfStock(id) => write!(f, "book {} is out of stock", id),
            ServiceError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            ServiceError::BackendUnavailable(msg) => write!(f, "backend unavailable: {}", msg),
            ServiceError::Upstream { status, body } => {
                write!(f, "upstream replied {}: {}", status, body)
            }
            ServiceError::PartialPurchase {
                book_id,
                stage,
                compensated,
                reason,
            } => write!(
                f,
                "purchase of book {} failed at {} after stock was decremented ({}): {}",
                book_id,
                stage,
                if *compensated {
                    "stock restored"
                } else {
                    "stock NOT restored"
                },
                reason
            ),
            ServiceError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Internal(format!("json: {}", err))
    }
}

impl ServiceError {
    /// Map this error to an HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::NotFound(_) => 404,
            ServiceError::OutOfStock(_) => 403,
            ServiceError::InvalidInput(_) => 400,
            ServiceError::BackendUnavailable(_) => 502,
            ServiceError::Upstream { status, .. } => *status,
            ServiceError::PartialPurchase { .. } => 500,
            ServiceError::Internal(_) => 500,
        }
    }

    /// JSON body sent to the client for this error.
    pub fn body(&self) -> Value {
        match self {
            ServiceError::OutOfStock(_) => json!({ "success": false, "message": "Out of stock" }),
            ServiceError::Upstream { body, .. } => body.clone(),
            ServiceError::PartialPurchase {
                book_id,
                stage,
                compensated,
                ..
            } => json!({
                "error": self.to_string(),
                "kind": "partial_purchase",
                "book_id": book_id,
                "stage": stage.to_string(),
                "compensated": compensated,
            }),
            _ => json!({ "error": self.to_string() }),
        }
    }

    /// True for a local out-of-stock or a passed-through 403 from a catalog.
    pub fn is_out_of_stock(&self) -> bool {
        matches!(
            self,
            ServiceError::OutOfStock(_) | ServiceError::Upstream { status: 403, .. }
        )
    }

    /// True for a local not-found or a passed-through 404.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ServiceError::NotFound(_) | ServiceError::Upstream { status: 404, .. }
        )
    }

    pub(crate) fn poisoned(operation: &'static str) -> Self {
        ServiceError::Internal(format!("lock poisoned during {}", operation))
    }
}
