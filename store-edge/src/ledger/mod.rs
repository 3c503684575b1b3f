//! Durable ledger for the edge node
//!
//! One embedded redb database holds the sale state, the outbox event log
//! and the sync cursors, so a domain mutation and its outbox event commit
//! atomically in a single write transaction.

pub mod storage;

pub use storage::{LedgerError, LedgerResult, LedgerStore};
