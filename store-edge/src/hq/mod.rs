//! HQ client seam
//!
//! The real network transport (HTTP/mTLS, queueing, auth) lives outside
//! this crate; the relay only needs something that can push a batch and
//! report per-key acknowledgments. Implementations must honor the
//! contract: HQ is idempotent on the event's idempotency key, and a
//! `Duplicate` acknowledgment means the event's effect is already applied.

use async_trait::async_trait;
use thiserror::Error;

use shared::hq::{HqBatchResponse, HqSyncBatch};

/// Delivery failures, split by retryability
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Network or HQ unavailability; retried with backoff, unbounded -
    /// business events are never silently dropped
    #[error("Transient delivery failure: {0}")]
    Transient(String),

    /// HQ declared the request unprocessable; retrying cannot help
    #[error("Permanent delivery failure: {0}")]
    Permanent(String),
}

impl DeliveryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DeliveryError::Transient(_))
    }
}

/// Transport-agnostic client for shipping outbox batches to HQ
#[async_trait]
pub trait HqClient: Send + Sync {
    /// Push one batch; the response must carry one acknowledgment per
    /// delivered idempotency key
    async fn push_batch(&self, batch: HqSyncBatch) -> Result<HqBatchResponse, DeliveryError>;
}
