//! HQ sync batch protocol types
//!
//! Used by the edge node to push outbox events to HQ, and by HQ to
//! acknowledge each event by its idempotency key.
//!
//! HQ is idempotent on `idempotency_key`: redelivering an already-seen event
//! yields a `Duplicate` acknowledgment, never a second application.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single event as shipped to HQ
///
/// The payload is a complete snapshot of the aggregate at the time the event
/// occurred; HQ never needs to read edge state to apply it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Globally unique idempotency key assigned when the event was recorded
    pub idempotency_key: Uuid,
    /// Event type: "SaleRecorded", "SaleCancelled"
    pub event_type: String,
    /// Aggregate type the event describes: "Transaction"
    pub aggregate_type: String,
    /// Aggregate ID on the edge node
    pub aggregate_id: String,
    /// Store the event originated from
    pub store_id: String,
    /// Business time of the domain change (Unix millis)
    pub occurred_at: i64,
    /// Self-contained, versioned snapshot payload
    pub payload: serde_json::Value,
}

/// An ordered batch of events from one edge node, for one stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HqSyncBatch {
    /// Identity of the sending edge node
    pub edge_id: String,
    /// Sync stream this batch belongs to (e.g. "hq-sales")
    pub stream: String,
    /// Events in ascending outbox order
    pub events: Vec<EventEnvelope>,
    /// Timestamp when the batch was sent (Unix millis)
    pub sent_at: i64,
}

/// Per-event acknowledgment status from HQ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AckStatus {
    /// Event applied for the first time
    Accepted,
    /// Idempotency key already seen; event had no further effect
    Duplicate,
    /// Event is unprocessable and will never be accepted
    Rejected,
}

/// Acknowledgment for a single event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventAck {
    pub idempotency_key: Uuid,
    pub status: AckStatus,
    /// Diagnostic detail, present on rejections
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response from HQ after processing a sync batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HqBatchResponse {
    /// One acknowledgment per delivered event, keyed by idempotency key
    pub acks: Vec<EventAck>,
}

impl HqBatchResponse {
    /// Build a response accepting every event in the batch
    pub fn accept_all(batch: &HqSyncBatch) -> Self {
        Self {
            acks: batch
                .events
                .iter()
                .map(|e| EventAck {
                    idempotency_key: e.idempotency_key,
                    status: AckStatus::Accepted,
                    message: None,
                })
                .collect(),
        }
    }

    /// Look up the acknowledgment for an idempotency key
    pub fn ack_for(&self, key: Uuid) -> Option<&EventAck> {
        self.acks.iter().find(|a| a.idempotency_key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_envelope(key: Uuid) -> EventEnvelope {
        EventEnvelope {
            idempotency_key: key,
            event_type: "SaleRecorded".to_string(),
            aggregate_type: "Transaction".to_string(),
            aggregate_id: "7a6b1f4e".to_string(),
            store_id: "store-001".to_string(),
            occurred_at: 1700000000000,
            payload: serde_json::json!({"schema_version": 1, "total": "12.50"}),
        }
    }

    #[test]
    fn test_batch_round_trip() {
        let key = Uuid::new_v4();
        let batch = HqSyncBatch {
            edge_id: "edge-001".to_string(),
            stream: "hq-sales".to_string(),
            events: vec![sample_envelope(key)],
            sent_at: 1700000000000,
        };

        let json = serde_json::to_string(&batch).unwrap();
        let deserialized: HqSyncBatch = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.edge_id, "edge-001");
        assert_eq!(deserialized.events.len(), 1);
        assert_eq!(deserialized.events[0].idempotency_key, key);
        assert_eq!(deserialized.events[0].event_type, "SaleRecorded");
    }

    #[test]
    fn test_ack_status_wire_format() {
        let json = serde_json::to_string(&AckStatus::Accepted).unwrap();
        assert_eq!(json, "\"ACCEPTED\"");
        let parsed: AckStatus = serde_json::from_str("\"REJECTED\"").unwrap();
        assert_eq!(parsed, AckStatus::Rejected);
    }

    #[test]
    fn test_ack_message_skipped_when_absent() {
        let ack = EventAck {
            idempotency_key: Uuid::new_v4(),
            status: AckStatus::Duplicate,
            message: None,
        };
        let json = serde_json::to_string(&ack).unwrap();
        assert!(!json.contains("message"));
    }

    #[test]
    fn test_accept_all_covers_batch() {
        let keys: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let batch = HqSyncBatch {
            edge_id: "edge-001".to_string(),
            stream: "hq-sales".to_string(),
            events: keys.iter().map(|k| sample_envelope(*k)).collect(),
            sent_at: 1700000000000,
        };

        let response = HqBatchResponse::accept_all(&batch);
        assert_eq!(response.acks.len(), 3);
        for key in keys {
            assert_eq!(response.ack_for(key).unwrap().status, AckStatus::Accepted);
        }
    }
}
