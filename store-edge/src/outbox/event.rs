//! Outbox event model and payload schema
//!
//! An outbox row is immutable once created except for its publish metadata
//! (`published_at`, `publish_attempts`, `last_error`), which only the relay
//! touches. Payloads are complete, versioned snapshots - a consumer can
//! reconstruct the full sale from the payload alone, without ever reading
//! edge state or seeing intermediate states.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared::hq::EventEnvelope;

use crate::checkout::model::{LineItem, Transaction};

/// Payload schema version; bump when a payload shape changes
pub const SALE_SCHEMA_VERSION: u32 = 1;

/// Event types emitted by the checkout aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    SaleRecorded,
    SaleCancelled,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SaleRecorded => "SaleRecorded",
            EventType::SaleCancelled => "SaleCancelled",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full sale snapshot carried by every sale event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleSnapshot {
    pub transaction: Transaction,
    pub line_items: Vec<LineItem>,
}

/// Versioned, self-contained event payload
///
/// The `event` tag disambiguates the type, `schema_version` the shape, so
/// consumers can decode historical payloads long after the edge node moved
/// on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum EventPayload {
    SaleRecorded {
        schema_version: u32,
        sale: SaleSnapshot,
    },
    SaleCancelled {
        schema_version: u32,
        sale: SaleSnapshot,
    },
}

impl EventPayload {
    pub fn sale_recorded(transaction: Transaction, line_items: Vec<LineItem>) -> Self {
        EventPayload::SaleRecorded {
            schema_version: SALE_SCHEMA_VERSION,
            sale: SaleSnapshot {
                transaction,
                line_items,
            },
        }
    }

    pub fn sale_cancelled(transaction: Transaction, line_items: Vec<LineItem>) -> Self {
        EventPayload::SaleCancelled {
            schema_version: SALE_SCHEMA_VERSION,
            sale: SaleSnapshot {
                transaction,
                line_items,
            },
        }
    }
}

/// A durable outbox event row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    /// Durable sequence id assigned by the ledger, ascending delivery order
    pub id: u64,
    /// Idempotency key; HQ discards redeliveries of the same key
    pub event_id: Uuid,
    pub event_type: EventType,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub store_id: String,
    pub payload: EventPayload,
    /// Business time of the domain change
    pub occurred_at: i64,
    /// System time the row was created
    pub created_at: i64,
    /// Set once HQ acknowledged the event (or it was isolated as poison)
    pub published_at: Option<i64>,
    pub publish_attempts: u32,
    pub last_error: Option<String>,
}

impl OutboxEvent {
    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }

    /// Wire envelope for shipping this event to HQ
    pub fn to_envelope(&self) -> serde_json::Result<EventEnvelope> {
        Ok(EventEnvelope {
            idempotency_key: self.event_id,
            event_type: self.event_type.as_str().to_string(),
            aggregate_type: self.aggregate_type.clone(),
            aggregate_id: self.aggregate_id.clone(),
            store_id: self.store_id.clone(),
            occurred_at: self.occurred_at,
            payload: serde_json::to_value(&self.payload)?,
        })
    }
}

/// Everything the producer supplies for a new outbox row; the writer adds
/// identity, sequence and publish metadata
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub event_type: EventType,
    pub aggregate_id: Uuid,
    pub store_id: String,
    pub occurred_at: i64,
    pub payload: EventPayload,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_tag_and_version_on_wire() {
        use crate::checkout::model::{Transaction, TransactionStatus};
        use rust_decimal::Decimal;

        let transaction = Transaction {
            id: Uuid::new_v4(),
            store_id: "store-001".to_string(),
            terminal_id: "till-1".to_string(),
            cashier_id: None,
            receipt_number: "R-1".to_string(),
            status: TransactionStatus::Paid,
            subtotal: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            total: Decimal::ZERO,
            currency: "VND".to_string(),
            started_at: 0,
            completed_at: Some(0),
            cancelled_at: None,
            note: None,
            created_at: 0,
            updated_at: 0,
        };

        let payload = EventPayload::sale_recorded(transaction, vec![]);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["event"], "SaleRecorded");
        assert_eq!(json["schema_version"], SALE_SCHEMA_VERSION);

        let back: EventPayload = serde_json::from_value(json).unwrap();
        assert!(matches!(back, EventPayload::SaleRecorded { .. }));
    }
}
