use thiserror::Error;
use uuid::Uuid;

use crate::checkout::model::TransactionStatus;
use crate::ledger::LedgerError;

/// Checkout errors
///
/// Sale-path errors are returned synchronously to the caller; the API layer
/// maps them onto structured responses by variant.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Bad input shape; caller's fault, not retried
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A (store, receipt_number) pair was already claimed
    #[error("Receipt number already used in store {store_id}: {receipt_number}")]
    ReceiptConflict {
        store_id: String,
        receipt_number: String,
    },

    /// Referenced transaction does not exist
    #[error("Transaction not found: {0}")]
    NotFound(Uuid),

    /// Operation not legal in the transaction's current lifecycle state
    #[error("Cannot {operation} transaction {id} in {status:?} status")]
    InvalidState {
        id: Uuid,
        status: TransactionStatus,
        operation: &'static str,
    },

    /// Domain rule violated: a sale with no line items cannot be finalized
    #[error("Cannot finalize empty transaction: {0}")]
    EmptyTransaction(Uuid),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

pub type CheckoutResult<T> = Result<T, CheckoutError>;
