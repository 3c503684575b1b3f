//! Persisted sale state: transaction headers and line items
//!
//! Row images are owned by the ledger; the checkout service is their sole
//! writer. Monetary fields are `Decimal` and serialize as exact strings.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sale lifecycle status
///
/// Transitions are monotonic: a terminal transaction never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Draft,
    Paid,
    Cancelled,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Paid | TransactionStatus::Cancelled)
    }
}

/// A single POS transaction (receipt header) at a given store/terminal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub store_id: String,
    pub terminal_id: String,
    pub cashier_id: Option<String>,
    /// Unique within a store; enforced by the ledger receipt index
    pub receipt_number: String,
    pub status: TransactionStatus,
    /// Sum of line totals net of tax
    pub subtotal: Decimal,
    /// Sum of line tax amounts
    pub tax_amount: Decimal,
    /// Always subtotal + tax_amount after recalculation
    pub total: Decimal,
    pub currency: String,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub cancelled_at: Option<i64>,
    pub note: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A product line within a transaction
///
/// Captures SKU, name and pricing at the time of sale so reporting and
/// auditing do not depend on mutable catalog state. `line_number` is dense
/// and unique within the transaction and orders lines for audit purposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub line_number: u32,
    pub sku: String,
    pub barcode: Option<String>,
    pub name: String,
    pub unit_price: Decimal,
    /// Decimal quantity, 3 fractional digits (weighed goods)
    pub quantity: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    /// round2(unit_price × quantity) − discount_amount + tax_amount
    pub line_total: Decimal,
    pub uom: Option<String>,
    pub created_at: i64,
}

/// Input for creating a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub store_id: String,
    pub terminal_id: String,
    #[serde(default)]
    pub cashier_id: Option<String>,
    /// Explicit receipt number; generated from the store counter when absent
    #[serde(default)]
    pub receipt_number: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Input for adding a line item to a draft transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLineItem {
    pub sku: String,
    #[serde(default)]
    pub barcode: Option<String>,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: Decimal,
    #[serde(default)]
    pub discount_amount: Option<Decimal>,
    #[serde(default)]
    pub tax_amount: Option<Decimal>,
    #[serde(default)]
    pub uom: Option<String>,
}
