//! Outbox writer - stages one durable event per domain change
//!
//! The writer participates in the caller's ledger transaction and never
//! commits on its own: the domain mutation and the event row are
//! all-or-nothing. A crash between the two writes is impossible because
//! there is only one commit.

use redb::WriteTransaction;
use uuid::Uuid;

use shared::util::now_millis;

use crate::ledger::{LedgerResult, LedgerStore};
use crate::outbox::event::{EventDraft, OutboxEvent};

const AGGREGATE_TYPE_TRANSACTION: &str = "Transaction";

/// Appends outbox rows inside a caller-owned unit of work
pub struct OutboxWriter {
    ledger: LedgerStore,
}

impl OutboxWriter {
    pub fn new(ledger: LedgerStore) -> Self {
        Self { ledger }
    }

    /// Stage an event in the caller's write transaction.
    ///
    /// Allocates the next durable outbox id, stamps a fresh idempotency key
    /// and zeroed publish metadata. The row becomes durable only when the
    /// caller commits.
    pub fn append(&self, txn: &WriteTransaction, draft: EventDraft) -> LedgerResult<u64> {
        let id = self.ledger.next_outbox_id(txn)?;
        let event = OutboxEvent {
            id,
            event_id: Uuid::new_v4(),
            event_type: draft.event_type,
            aggregate_type: AGGREGATE_TYPE_TRANSACTION.to_string(),
            aggregate_id: draft.aggregate_id.to_string(),
            store_id: draft.store_id,
            payload: draft.payload,
            occurred_at: draft.occurred_at,
            created_at: now_millis(),
            published_at: None,
            publish_attempts: 0,
            last_error: None,
        };
        self.ledger.insert_outbox_event(txn, &event)?;
        tracing::debug!(
            outbox_id = id,
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            "Outbox event staged"
        );
        Ok(id)
    }
}
