//! Sync cursors - per-stream high-water-marks of relayed outbox ids
//!
//! A cursor records the last outbox id successfully acknowledged by HQ for
//! a named stream, so replay after a restart resumes from where it stopped
//! instead of scanning the whole outbox. Streams are independent: each HQ
//! subsystem can consume at its own pace.

use redb::WriteTransaction;
use serde::{Deserialize, Serialize};

use shared::util::now_millis;

use crate::ledger::{LedgerError, LedgerResult, LedgerStore};

/// Progress record for one sync stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCursor {
    pub stream_name: String,
    /// Last outbox id acknowledged by HQ; monotonically non-decreasing
    pub last_outbox_id: Option<u64>,
    pub last_synced_at: Option<i64>,
    /// Free-form operational metadata
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SyncCursor {
    fn new(stream_name: &str, now: i64) -> Self {
        Self {
            stream_name: stream_name.to_string(),
            last_outbox_id: None,
            last_synced_at: None,
            metadata: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Cursor store over the ledger
pub struct SyncCursorStore {
    ledger: LedgerStore,
}

impl SyncCursorStore {
    pub fn new(ledger: LedgerStore) -> Self {
        Self { ledger }
    }

    /// Read a stream's cursor
    pub fn read(&self, stream: &str) -> LedgerResult<Option<SyncCursor>> {
        self.ledger.get_cursor(stream)
    }

    /// Last relayed outbox id for a stream, if any
    pub fn last_outbox_id(&self, stream: &str) -> LedgerResult<Option<u64>> {
        Ok(self.read(stream)?.and_then(|c| c.last_outbox_id))
    }

    /// Advance a stream's cursor within the caller's write transaction.
    ///
    /// Guarded by an in-transaction compare: a stale or duplicate relay run
    /// cannot move the cursor backward. Advancing to the current value is a
    /// no-op refresh of `last_synced_at`.
    pub fn advance(
        &self,
        txn: &WriteTransaction,
        stream: &str,
        new_last_outbox_id: u64,
    ) -> LedgerResult<SyncCursor> {
        let now = now_millis();
        let mut cursor = self
            .ledger
            .get_cursor_txn(txn, stream)?
            .unwrap_or_else(|| SyncCursor::new(stream, now));

        if let Some(current) = cursor.last_outbox_id
            && new_last_outbox_id < current
        {
            return Err(LedgerError::CursorRegression {
                stream: stream.to_string(),
                current,
                requested: new_last_outbox_id,
            });
        }

        cursor.last_outbox_id = Some(new_last_outbox_id);
        cursor.last_synced_at = Some(now);
        cursor.updated_at = now;
        self.ledger.put_cursor(txn, &cursor)?;
        Ok(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_creates_and_moves_forward() {
        let ledger = LedgerStore::open_in_memory().unwrap();
        let cursors = SyncCursorStore::new(ledger.clone());

        assert!(cursors.read("hq-sales").unwrap().is_none());

        let txn = ledger.begin_write().unwrap();
        cursors.advance(&txn, "hq-sales", 5).unwrap();
        txn.commit().unwrap();

        assert_eq!(cursors.last_outbox_id("hq-sales").unwrap(), Some(5));

        let txn = ledger.begin_write().unwrap();
        cursors.advance(&txn, "hq-sales", 9).unwrap();
        txn.commit().unwrap();

        assert_eq!(cursors.last_outbox_id("hq-sales").unwrap(), Some(9));
    }

    #[test]
    fn test_advance_rejects_regression() {
        let ledger = LedgerStore::open_in_memory().unwrap();
        let cursors = SyncCursorStore::new(ledger.clone());

        let txn = ledger.begin_write().unwrap();
        cursors.advance(&txn, "hq-sales", 7).unwrap();
        txn.commit().unwrap();

        let txn = ledger.begin_write().unwrap();
        let err = cursors.advance(&txn, "hq-sales", 3).unwrap_err();
        assert!(matches!(err, LedgerError::CursorRegression { .. }));
        drop(txn);

        // Stored value untouched
        assert_eq!(cursors.last_outbox_id("hq-sales").unwrap(), Some(7));
    }

    #[test]
    fn test_advance_to_same_value_is_refresh() {
        let ledger = LedgerStore::open_in_memory().unwrap();
        let cursors = SyncCursorStore::new(ledger.clone());

        let txn = ledger.begin_write().unwrap();
        cursors.advance(&txn, "hq-sales", 4).unwrap();
        cursors.advance(&txn, "hq-sales", 4).unwrap();
        txn.commit().unwrap();

        assert_eq!(cursors.last_outbox_id("hq-sales").unwrap(), Some(4));
    }

    #[test]
    fn test_streams_are_independent() {
        let ledger = LedgerStore::open_in_memory().unwrap();
        let cursors = SyncCursorStore::new(ledger.clone());

        let txn = ledger.begin_write().unwrap();
        cursors.advance(&txn, "hq-sales", 10).unwrap();
        cursors.advance(&txn, "hq-inventory", 2).unwrap();
        txn.commit().unwrap();

        assert_eq!(cursors.last_outbox_id("hq-sales").unwrap(), Some(10));
        assert_eq!(cursors.last_outbox_id("hq-inventory").unwrap(), Some(2));
    }
}
