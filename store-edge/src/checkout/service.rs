//! CheckoutService - sale lifecycle command processing
//!
//! # Command flow
//!
//! ```text
//! operation(transaction_id)
//!     ├─ 1. Validate input
//!     ├─ 2. Acquire the per-transaction lock
//!     ├─ 3. Begin ledger write transaction
//!     ├─ 4. Load state, check lifecycle invariants
//!     ├─ 5. Mutate rows (and stage the outbox event, if any)
//!     ├─ 6. Commit (event + mutation are all-or-nothing)
//!     └─ 7. Return the updated aggregate
//! ```
//!
//! Mutations on the same transaction id serialize on an exclusive lock held
//! for the whole unit of work, so two concurrent finalizes cannot both
//! succeed and line numbers cannot interleave. Different transactions only
//! contend on the ledger's single-writer commit.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use shared::util::now_millis;

use crate::checkout::error::{CheckoutError, CheckoutResult};
use crate::checkout::model::{
    LineItem, NewLineItem, NewTransaction, Transaction, TransactionStatus,
};
use crate::checkout::money;
use crate::ledger::LedgerStore;
use crate::outbox::event::{EventDraft, EventPayload, EventType};
use crate::outbox::writer::OutboxWriter;

/// Sale lifecycle service; the sole writer of transaction and line item rows
pub struct CheckoutService {
    ledger: LedgerStore,
    outbox: OutboxWriter,
    /// Per-transaction exclusive locks; entries are dropped when the
    /// transaction reaches a terminal state
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    default_currency: String,
}

impl CheckoutService {
    pub fn new(ledger: LedgerStore, default_currency: impl Into<String>) -> Self {
        let outbox = OutboxWriter::new(ledger.clone());
        Self {
            ledger,
            outbox,
            locks: DashMap::new(),
            default_currency: default_currency.into(),
        }
    }

    /// The underlying ledger
    pub fn ledger(&self) -> &LedgerStore {
        &self.ledger
    }

    fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Generate the next receipt number for a store (crash-safe counter)
    fn next_receipt_number(&self, store_id: &str) -> CheckoutResult<String> {
        let count = self.ledger.next_receipt_count(store_id)?;
        let date_str = Utc::now().format("%Y%m%d").to_string();
        Ok(format!("R{}{}", date_str, 10000 + count))
    }

    /// Create a new DRAFT transaction with zero totals
    pub fn create(&self, input: NewTransaction) -> CheckoutResult<Transaction> {
        if input.store_id.trim().is_empty() {
            return Err(CheckoutError::Validation(
                "store_id must not be empty".into(),
            ));
        }
        if input.terminal_id.trim().is_empty() {
            return Err(CheckoutError::Validation(
                "terminal_id must not be empty".into(),
            ));
        }

        // Pre-generate before the main unit of work: redb does not allow
        // nested write transactions
        let receipt_number = match input.receipt_number {
            Some(r) if r.trim().is_empty() => {
                return Err(CheckoutError::Validation(
                    "receipt_number must not be empty when supplied".into(),
                ));
            }
            Some(r) => r,
            None => self.next_receipt_number(&input.store_id)?,
        };

        let now = now_millis();
        let record = Transaction {
            id: Uuid::new_v4(),
            store_id: input.store_id,
            terminal_id: input.terminal_id,
            cashier_id: input.cashier_id,
            receipt_number,
            status: TransactionStatus::Draft,
            subtotal: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            total: Decimal::ZERO,
            currency: input
                .currency
                .unwrap_or_else(|| self.default_currency.clone()),
            started_at: now,
            completed_at: None,
            cancelled_at: None,
            note: input.note,
            created_at: now,
            updated_at: now,
        };

        let txn = self.ledger.begin_write()?;
        if !self
            .ledger
            .claim_receipt(&txn, &record.store_id, &record.receipt_number, record.id)?
        {
            // Dropping the transaction rolls the claim attempt back
            return Err(CheckoutError::ReceiptConflict {
                store_id: record.store_id,
                receipt_number: record.receipt_number,
            });
        }
        self.ledger.store_transaction(&txn, &record)?;
        txn.commit().map_err(crate::ledger::LedgerError::from)?;

        tracing::info!(
            transaction_id = %record.id,
            store_id = %record.store_id,
            receipt_number = %record.receipt_number,
            "Transaction created"
        );
        Ok(record)
    }

    /// Add a line item to a DRAFT transaction.
    ///
    /// Assigns the next dense line number under the transaction's write
    /// lock and computes the line total in fixed-point decimal.
    pub fn add_line_item(
        &self,
        transaction_id: Uuid,
        input: NewLineItem,
    ) -> CheckoutResult<LineItem> {
        money::validate_line_input(&input)?;

        let lock = self.lock_for(transaction_id);
        let _guard = lock.lock();

        let txn = self.ledger.begin_write()?;
        let mut record = self
            .ledger
            .get_transaction_txn(&txn, transaction_id)?
            .ok_or(CheckoutError::NotFound(transaction_id))?;

        match record.status {
            TransactionStatus::Draft => {}
            status => {
                return Err(CheckoutError::InvalidState {
                    id: transaction_id,
                    status,
                    operation: "add a line item to",
                });
            }
        }

        let line_number = self.ledger.next_line_number(&txn, transaction_id)?;
        let quantity = money::round_quantity(input.quantity);
        let discount_amount = money::round_money(input.discount_amount.unwrap_or(Decimal::ZERO));
        let tax_amount = money::round_money(input.tax_amount.unwrap_or(Decimal::ZERO));
        let now = now_millis();

        let item = LineItem {
            id: Uuid::new_v4(),
            transaction_id,
            line_number,
            sku: input.sku,
            barcode: input.barcode,
            name: input.name,
            unit_price: input.unit_price,
            quantity,
            discount_amount,
            tax_amount,
            line_total: money::line_total(input.unit_price, quantity, discount_amount, tax_amount),
            uom: input.uom,
            created_at: now,
        };

        self.ledger.store_line_item(&txn, &item)?;
        record.updated_at = now;
        self.ledger.store_transaction(&txn, &record)?;
        txn.commit().map_err(crate::ledger::LedgerError::from)?;

        tracing::debug!(
            transaction_id = %transaction_id,
            line_number,
            sku = %item.sku,
            line_total = %item.line_total,
            "Line item added"
        );
        Ok(item)
    }

    /// Re-derive subtotal, tax and total from the current line items.
    ///
    /// Idempotent: unchanged line items always produce the same totals.
    pub fn recalculate_totals(&self, transaction_id: Uuid) -> CheckoutResult<Transaction> {
        let lock = self.lock_for(transaction_id);
        let _guard = lock.lock();

        let txn = self.ledger.begin_write()?;
        let mut record = self
            .ledger
            .get_transaction_txn(&txn, transaction_id)?
            .ok_or(CheckoutError::NotFound(transaction_id))?;

        match record.status {
            TransactionStatus::Draft => {}
            status => {
                return Err(CheckoutError::InvalidState {
                    id: transaction_id,
                    status,
                    operation: "recalculate totals of",
                });
            }
        }

        let items = self.ledger.line_items_txn(&txn, transaction_id)?;
        Self::apply_totals(&mut record, &items);
        record.updated_at = now_millis();
        self.ledger.store_transaction(&txn, &record)?;
        txn.commit().map_err(crate::ledger::LedgerError::from)?;

        Ok(record)
    }

    /// Finalize a DRAFT transaction: totals, PAID status and the
    /// `SaleRecorded` outbox event commit atomically.
    ///
    /// This is the core correctness property of the edge node: a finalize
    /// can never succeed without durably producing exactly one event.
    pub fn finalize(&self, transaction_id: Uuid) -> CheckoutResult<Transaction> {
        let lock = self.lock_for(transaction_id);
        let _guard = lock.lock();

        let txn = self.ledger.begin_write()?;
        let mut record = self
            .ledger
            .get_transaction_txn(&txn, transaction_id)?
            .ok_or(CheckoutError::NotFound(transaction_id))?;

        match record.status {
            TransactionStatus::Draft => {}
            status => {
                return Err(CheckoutError::InvalidState {
                    id: transaction_id,
                    status,
                    operation: "finalize",
                });
            }
        }

        let items = self.ledger.line_items_txn(&txn, transaction_id)?;
        if items.is_empty() {
            return Err(CheckoutError::EmptyTransaction(transaction_id));
        }

        let now = now_millis();
        Self::apply_totals(&mut record, &items);
        record.status = TransactionStatus::Paid;
        record.completed_at = Some(now);
        record.updated_at = now;
        self.ledger.store_transaction(&txn, &record)?;

        let outbox_id = self.outbox.append(
            &txn,
            EventDraft {
                event_type: EventType::SaleRecorded,
                aggregate_id: record.id,
                store_id: record.store_id.clone(),
                occurred_at: now,
                payload: EventPayload::sale_recorded(record.clone(), items),
            },
        )?;
        txn.commit().map_err(crate::ledger::LedgerError::from)?;

        self.locks.remove(&transaction_id);
        tracing::info!(
            transaction_id = %transaction_id,
            receipt_number = %record.receipt_number,
            total = %record.total,
            outbox_id,
            "Transaction finalized"
        );
        Ok(record)
    }

    /// Cancel a DRAFT transaction.
    ///
    /// Emits `SaleCancelled` only when line items exist; cancelling an
    /// untouched draft is a local state change with no event.
    pub fn cancel(&self, transaction_id: Uuid) -> CheckoutResult<Transaction> {
        let lock = self.lock_for(transaction_id);
        let _guard = lock.lock();

        let txn = self.ledger.begin_write()?;
        let mut record = self
            .ledger
            .get_transaction_txn(&txn, transaction_id)?
            .ok_or(CheckoutError::NotFound(transaction_id))?;

        match record.status {
            TransactionStatus::Draft => {}
            status => {
                return Err(CheckoutError::InvalidState {
                    id: transaction_id,
                    status,
                    operation: "cancel",
                });
            }
        }

        let items = self.ledger.line_items_txn(&txn, transaction_id)?;
        let now = now_millis();
        record.status = TransactionStatus::Cancelled;
        record.cancelled_at = Some(now);
        record.updated_at = now;
        self.ledger.store_transaction(&txn, &record)?;

        if !items.is_empty() {
            self.outbox.append(
                &txn,
                EventDraft {
                    event_type: EventType::SaleCancelled,
                    aggregate_id: record.id,
                    store_id: record.store_id.clone(),
                    occurred_at: now,
                    payload: EventPayload::sale_cancelled(record.clone(), items),
                },
            )?;
        }
        txn.commit().map_err(crate::ledger::LedgerError::from)?;

        self.locks.remove(&transaction_id);
        tracing::info!(transaction_id = %transaction_id, "Transaction cancelled");
        Ok(record)
    }

    /// Read a transaction header
    pub fn get_transaction(&self, transaction_id: Uuid) -> CheckoutResult<Option<Transaction>> {
        Ok(self.ledger.get_transaction(transaction_id)?)
    }

    /// Read a transaction's line items in audit order
    pub fn line_items(&self, transaction_id: Uuid) -> CheckoutResult<Vec<LineItem>> {
        Ok(self.ledger.line_items(transaction_id)?)
    }

    fn apply_totals(record: &mut Transaction, items: &[LineItem]) {
        let (subtotal, tax_amount) = money::sum_totals(items);
        record.subtotal = subtotal;
        record.tax_amount = tax_amount;
        record.total = subtotal + tax_amount;
    }
}
