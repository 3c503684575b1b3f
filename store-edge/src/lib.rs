//! Store Edge - point-of-sale edge node core
//!
//! Records retail transactions in a local durable ledger and relays each
//! completed sale to HQ through a transactional outbox, surviving
//! intermittent connectivity without ever blocking the sale path on the
//! network.
//!
//! # Module structure
//!
//! ```text
//! store-edge/src/
//! ├── core/          # Configuration, background task management
//! ├── utils/         # Logging bootstrap
//! ├── ledger/        # redb durable store (atomic multi-table commits)
//! ├── checkout/      # Transaction aggregate: lifecycle + money
//! ├── outbox/        # Outbox writer, sync cursors, HQ relay worker
//! └── hq/            # HqClient seam for the real network transport
//! ```
//!
//! # Correctness core
//!
//! A finalized sale and its `SaleRecorded` outbox event are written in one
//! ledger commit: the sale can never exist without the event, and a crash
//! between the two writes is impossible. The relay ships outbox rows to HQ
//! in ascending id order with at-least-once delivery; HQ dedups on the
//! event's idempotency key, and a per-stream sync cursor makes replay
//! resumable after restarts and partial failures.

pub mod checkout;
pub mod core;
pub mod hq;
pub mod ledger;
pub mod outbox;
pub mod utils;

// Re-export public types
pub use checkout::{CheckoutError, CheckoutResult, CheckoutService};
pub use core::{BackgroundTasks, Config, TaskKind};
pub use hq::{DeliveryError, HqClient};
pub use ledger::{LedgerError, LedgerResult, LedgerStore};
pub use outbox::{
    EventDraft, EventPayload, EventType, OutboxEvent, OutboxRelay, OutboxWriter, RelayConfig,
    SyncCursor, SyncCursorStore,
};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};

/// Prepare the process environment: load `.env` and initialize logging.
///
/// Intended for the composition root (the API/transport binary) to call
/// once before building components from [`Config`].
pub fn setup_environment() {
    dotenv::dotenv().ok();
    init_logger();
}
