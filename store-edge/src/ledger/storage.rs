//! redb-based storage layer for the transaction ledger and outbox
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `transactions` | `transaction_id` | `Transaction` | Sale headers |
//! | `line_items` | `(transaction_id, line_number)` | `LineItem` | Sale lines, audit-ordered |
//! | `receipt_index` | `(store_id, receipt_number)` | `transaction_id` | Per-store receipt uniqueness |
//! | `outbox` | `outbox_id` | `OutboxEvent` | Append-mostly event log |
//! | `sync_cursors` | `stream_name` | `SyncCursor` | Per-stream relay progress |
//! | `counters` | name | `u64` | Outbox sequence, receipt counters |
//!
//! # Durability
//!
//! redb commits are persistent as soon as `commit()` returns (copy-on-write
//! with atomic pointer swap), which is what the outbox pattern relies on:
//! a finalize that commits has durably recorded both the sale and its event.
//! Dropping a [`WriteTransaction`] without committing rolls everything back,
//! giving every unit of work guaranteed release on error paths.
//!
//! # Write ownership
//!
//! The checkout service writes `transactions`/`line_items`/`receipt_index`,
//! the outbox writer appends `outbox` rows, and the relay alone touches
//! outbox publish metadata and `sync_cursors`. The ledger itself does not
//! police this split; the component boundaries do.

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::checkout::model::{LineItem, Transaction};
use crate::outbox::cursor::SyncCursor;
use crate::outbox::event::OutboxEvent;

/// Sale headers: key = transaction id, value = JSON-serialized Transaction
const TRANSACTIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("transactions");

/// Sale lines: key = (transaction id, line_number), value = JSON-serialized LineItem
const LINE_ITEMS_TABLE: TableDefinition<(&str, u32), &[u8]> = TableDefinition::new("line_items");

/// Receipt uniqueness: key = (store id, receipt number), value = transaction id
const RECEIPT_INDEX_TABLE: TableDefinition<(&str, &str), &str> =
    TableDefinition::new("receipt_index");

/// Outbox event log: key = durable outbox id, value = JSON-serialized OutboxEvent
const OUTBOX_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("outbox");

/// Relay progress: key = stream name, value = JSON-serialized SyncCursor
const SYNC_CURSORS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("sync_cursors");

/// Counters: key = counter name, value = u64
const COUNTERS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("counters");

const OUTBOX_SEQUENCE_KEY: &str = "outbox_seq";

/// Storage errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Outbox event not found: {0}")]
    EventNotFound(u64),

    #[error("Sync cursor for stream {stream} would move backward: {current} -> {requested}")]
    CursorRegression {
        stream: String,
        current: u64,
        requested: u64,
    },
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Edge ledger backed by redb
#[derive(Clone)]
pub struct LedgerStore {
    db: Arc<Database>,
}

impl LedgerStore {
    /// Open or create the ledger database at the given path
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let db = Database::create(path)?;
        let store = Self { db: Arc::new(db) };
        store.init_tables()?;
        Ok(store)
    }

    /// Open an in-memory ledger (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> LedgerResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        let store = Self { db: Arc::new(db) };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> LedgerResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let _ = write_txn.open_table(TRANSACTIONS_TABLE)?;
            let _ = write_txn.open_table(LINE_ITEMS_TABLE)?;
            let _ = write_txn.open_table(RECEIPT_INDEX_TABLE)?;
            let _ = write_txn.open_table(OUTBOX_TABLE)?;
            let _ = write_txn.open_table(SYNC_CURSORS_TABLE)?;

            let mut counters = write_txn.open_table(COUNTERS_TABLE)?;
            if counters.get(OUTBOX_SEQUENCE_KEY)?.is_none() {
                counters.insert(OUTBOX_SEQUENCE_KEY, 0u64)?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Begin a write transaction (the unit of work handle)
    pub fn begin_write(&self) -> LedgerResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    // ========== Transaction Operations ==========

    /// Store (insert or replace) a transaction header
    pub fn store_transaction(
        &self,
        txn: &WriteTransaction,
        record: &Transaction,
    ) -> LedgerResult<()> {
        let mut table = txn.open_table(TRANSACTIONS_TABLE)?;
        let key = record.id.to_string();
        let value = serde_json::to_vec(record)?;
        table.insert(key.as_str(), value.as_slice())?;
        Ok(())
    }

    /// Get a transaction header by id
    pub fn get_transaction(&self, id: Uuid) -> LedgerResult<Option<Transaction>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TRANSACTIONS_TABLE)?;
        let key = id.to_string();
        match table.get(key.as_str())? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Get a transaction header within a write transaction
    pub fn get_transaction_txn(
        &self,
        txn: &WriteTransaction,
        id: Uuid,
    ) -> LedgerResult<Option<Transaction>> {
        let table = txn.open_table(TRANSACTIONS_TABLE)?;
        let key = id.to_string();
        match table.get(key.as_str())? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    // ========== Receipt Index ==========

    /// Claim a (store, receipt_number) pair for a transaction.
    ///
    /// Returns false without writing when the pair is already taken.
    pub fn claim_receipt(
        &self,
        txn: &WriteTransaction,
        store_id: &str,
        receipt_number: &str,
        transaction_id: Uuid,
    ) -> LedgerResult<bool> {
        let mut table = txn.open_table(RECEIPT_INDEX_TABLE)?;
        if table.get((store_id, receipt_number))?.is_some() {
            return Ok(false);
        }
        let id = transaction_id.to_string();
        table.insert((store_id, receipt_number), id.as_str())?;
        Ok(true)
    }

    /// Get and increment the receipt counter for a store (own commit).
    ///
    /// Called before the main unit of work: redb does not allow nested
    /// write transactions, and a crash after this commit only skips a
    /// number, never reuses one.
    pub fn next_receipt_count(&self, store_id: &str) -> LedgerResult<u64> {
        let key = format!("receipt:{store_id}");
        let txn = self.db.begin_write()?;
        let next = {
            let mut table = txn.open_table(COUNTERS_TABLE)?;
            let current = table.get(key.as_str())?.map(|g| g.value()).unwrap_or(0);
            let next = current + 1;
            table.insert(key.as_str(), next)?;
            next
        };
        txn.commit()?;
        Ok(next)
    }

    // ========== Line Item Operations ==========

    /// Store a line item under its (transaction, line_number) key
    pub fn store_line_item(&self, txn: &WriteTransaction, item: &LineItem) -> LedgerResult<()> {
        let mut table = txn.open_table(LINE_ITEMS_TABLE)?;
        let key_id = item.transaction_id.to_string();
        let value = serde_json::to_vec(item)?;
        table.insert((key_id.as_str(), item.line_number), value.as_slice())?;
        Ok(())
    }

    /// All line items for a transaction, in line_number order
    pub fn line_items(&self, transaction_id: Uuid) -> LedgerResult<Vec<LineItem>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LINE_ITEMS_TABLE)?;
        Self::collect_line_items(&table, transaction_id)
    }

    /// All line items for a transaction, within a write transaction
    pub fn line_items_txn(
        &self,
        txn: &WriteTransaction,
        transaction_id: Uuid,
    ) -> LedgerResult<Vec<LineItem>> {
        let table = txn.open_table(LINE_ITEMS_TABLE)?;
        Self::collect_line_items(&table, transaction_id)
    }

    fn collect_line_items(
        table: &impl ReadableTable<(&'static str, u32), &'static [u8]>,
        transaction_id: Uuid,
    ) -> LedgerResult<Vec<LineItem>> {
        let id = transaction_id.to_string();
        let mut items = Vec::new();
        for result in table.range((id.as_str(), 0u32)..=(id.as_str(), u32::MAX))? {
            let (_key, value) = result?;
            let item: LineItem = serde_json::from_slice(value.value())?;
            items.push(item);
        }
        // Range order already follows line_number; keep the guarantee explicit
        items.sort_by_key(|i| i.line_number);
        Ok(items)
    }

    /// Next dense line number for a transaction (max + 1), within the
    /// caller's write transaction
    pub fn next_line_number(
        &self,
        txn: &WriteTransaction,
        transaction_id: Uuid,
    ) -> LedgerResult<u32> {
        let table = txn.open_table(LINE_ITEMS_TABLE)?;
        let id = transaction_id.to_string();
        let mut last = 0u32;
        for result in table.range((id.as_str(), 0u32)..=(id.as_str(), u32::MAX))? {
            let (key, _value) = result?;
            last = key.value().1;
        }
        Ok(last + 1)
    }

    // ========== Outbox Operations ==========

    /// Increment and return the outbox sequence, within the caller's
    /// write transaction (the id is durable only if the caller commits)
    pub fn next_outbox_id(&self, txn: &WriteTransaction) -> LedgerResult<u64> {
        let mut table = txn.open_table(COUNTERS_TABLE)?;
        let current = table
            .get(OUTBOX_SEQUENCE_KEY)?
            .map(|g| g.value())
            .unwrap_or(0);
        let next = current + 1;
        table.insert(OUTBOX_SEQUENCE_KEY, next)?;
        Ok(next)
    }

    /// Insert a new outbox event row
    pub fn insert_outbox_event(
        &self,
        txn: &WriteTransaction,
        event: &OutboxEvent,
    ) -> LedgerResult<()> {
        let mut table = txn.open_table(OUTBOX_TABLE)?;
        let value = serde_json::to_vec(event)?;
        table.insert(event.id, value.as_slice())?;
        Ok(())
    }

    /// Rewrite an existing outbox event row.
    ///
    /// Only the relay calls this, and only to update publish metadata;
    /// the event body is immutable once created.
    pub fn update_outbox_event(
        &self,
        txn: &WriteTransaction,
        event: &OutboxEvent,
    ) -> LedgerResult<()> {
        let mut table = txn.open_table(OUTBOX_TABLE)?;
        if table.get(event.id)?.is_none() {
            return Err(LedgerError::EventNotFound(event.id));
        }
        let value = serde_json::to_vec(event)?;
        table.insert(event.id, value.as_slice())?;
        Ok(())
    }

    /// Get an outbox event by durable id
    pub fn get_outbox_event(&self, id: u64) -> LedgerResult<Option<OutboxEvent>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OUTBOX_TABLE)?;
        match table.get(id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Unpublished outbox events with id strictly greater than `after_id`,
    /// ascending, at most `limit`
    pub fn fetch_unpublished_after(
        &self,
        after_id: u64,
        limit: usize,
    ) -> LedgerResult<Vec<OutboxEvent>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OUTBOX_TABLE)?;

        let mut events = Vec::new();
        for result in table.range((after_id + 1)..)? {
            if events.len() >= limit {
                break;
            }
            let (_key, value) = result?;
            let event: OutboxEvent = serde_json::from_slice(value.value())?;
            if event.published_at.is_none() {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Every outbox event in id order (audit and test inspection)
    pub fn outbox_events(&self) -> LedgerResult<Vec<OutboxEvent>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(OUTBOX_TABLE)?;

        let mut events = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            events.push(serde_json::from_slice(value.value())?);
        }
        Ok(events)
    }

    // ========== Sync Cursor Operations ==========

    /// Get a sync cursor by stream name
    pub fn get_cursor(&self, stream: &str) -> LedgerResult<Option<SyncCursor>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SYNC_CURSORS_TABLE)?;
        match table.get(stream)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Get a sync cursor within a write transaction
    pub fn get_cursor_txn(
        &self,
        txn: &WriteTransaction,
        stream: &str,
    ) -> LedgerResult<Option<SyncCursor>> {
        let table = txn.open_table(SYNC_CURSORS_TABLE)?;
        match table.get(stream)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Store (insert or replace) a sync cursor
    pub fn put_cursor(&self, txn: &WriteTransaction, cursor: &SyncCursor) -> LedgerResult<()> {
        let mut table = txn.open_table(SYNC_CURSORS_TABLE)?;
        let value = serde_json::to_vec(cursor)?;
        table.insert(cursor.stream_name.as_str(), value.as_slice())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::model::TransactionStatus;
    use rust_decimal::Decimal;
    use shared::util::now_millis;

    fn sample_transaction() -> Transaction {
        let now = now_millis();
        Transaction {
            id: Uuid::new_v4(),
            store_id: "store-001".to_string(),
            terminal_id: "till-1".to_string(),
            cashier_id: None,
            receipt_number: "R20250101-1".to_string(),
            status: TransactionStatus::Draft,
            subtotal: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            total: Decimal::ZERO,
            currency: "VND".to_string(),
            started_at: now,
            completed_at: None,
            cancelled_at: None,
            note: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_transaction_round_trip() {
        let store = LedgerStore::open_in_memory().unwrap();
        let record = sample_transaction();

        let txn = store.begin_write().unwrap();
        store.store_transaction(&txn, &record).unwrap();
        txn.commit().unwrap();

        let loaded = store.get_transaction(record.id).unwrap().unwrap();
        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.status, TransactionStatus::Draft);
        assert_eq!(loaded.receipt_number, "R20250101-1");
    }

    #[test]
    fn test_drop_without_commit_rolls_back() {
        let store = LedgerStore::open_in_memory().unwrap();
        let record = sample_transaction();

        {
            let txn = store.begin_write().unwrap();
            store.store_transaction(&txn, &record).unwrap();
            // txn dropped here without commit
        }

        assert!(store.get_transaction(record.id).unwrap().is_none());
    }

    #[test]
    fn test_receipt_claim_conflict() {
        let store = LedgerStore::open_in_memory().unwrap();

        let txn = store.begin_write().unwrap();
        assert!(
            store
                .claim_receipt(&txn, "store-001", "R-42", Uuid::new_v4())
                .unwrap()
        );
        txn.commit().unwrap();

        let txn = store.begin_write().unwrap();
        assert!(
            !store
                .claim_receipt(&txn, "store-001", "R-42", Uuid::new_v4())
                .unwrap()
        );
        // Same number in another store is fine
        assert!(
            store
                .claim_receipt(&txn, "store-002", "R-42", Uuid::new_v4())
                .unwrap()
        );
        txn.commit().unwrap();
    }

    #[test]
    fn test_outbox_sequence_is_monotonic() {
        let store = LedgerStore::open_in_memory().unwrap();

        let txn = store.begin_write().unwrap();
        let a = store.next_outbox_id(&txn).unwrap();
        let b = store.next_outbox_id(&txn).unwrap();
        txn.commit().unwrap();

        let txn = store.begin_write().unwrap();
        let c = store.next_outbox_id(&txn).unwrap();
        txn.commit().unwrap();

        assert_eq!((a, b, c), (1, 2, 3));
    }

    #[test]
    fn test_receipt_counters_are_per_store() {
        let store = LedgerStore::open_in_memory().unwrap();

        assert_eq!(store.next_receipt_count("store-001").unwrap(), 1);
        assert_eq!(store.next_receipt_count("store-001").unwrap(), 2);
        assert_eq!(store.next_receipt_count("store-002").unwrap(), 1);
    }

    #[test]
    fn test_open_on_disk_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.redb");
        let record = sample_transaction();

        {
            let store = LedgerStore::open(&path).unwrap();
            let txn = store.begin_write().unwrap();
            store.store_transaction(&txn, &record).unwrap();
            txn.commit().unwrap();
        }

        let store = LedgerStore::open(&path).unwrap();
        assert!(store.get_transaction(record.id).unwrap().is_some());
    }
}
