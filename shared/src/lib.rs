//! Shared types for the store-edge node
//!
//! Wire-contract types exchanged between an edge node and HQ, plus small
//! utilities used on both sides of that boundary.

pub mod hq;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use hq::{AckStatus, EventAck, EventEnvelope, HqBatchResponse, HqSyncBatch};
