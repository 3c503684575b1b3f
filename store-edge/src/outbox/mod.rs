//! Transactional outbox - durable events and their relay to HQ
//!
//! ```text
//! checkout commit ──▶ outbox row (same ledger transaction)
//!                        │
//!                        ▼
//! OutboxRelay ── fetch after cursor ──▶ HqClient ──▶ HQ
//!      │                                   │
//!      └── one commit: publish metadata + cursor advance
//! ```
//!
//! Delivery is at-least-once; HQ dedups on the event's idempotency key, so
//! the effect is exactly-once. The per-stream cursor never advances past an
//! unacknowledged event, which keeps the stream HQ observes a strict prefix
//! of emission order (with isolated poison-pill skips surfaced via
//! `last_error`).

pub mod cursor;
pub mod event;
pub mod relay;
pub mod writer;

pub use cursor::{SyncCursor, SyncCursorStore};
pub use event::{EventDraft, EventPayload, EventType, OutboxEvent, SaleSnapshot};
pub use relay::{OutboxRelay, RelayConfig, RelayError, RelayOutcome};
pub use writer::OutboxWriter;
