//! Checkout - the transaction aggregate
//!
//! The sale lifecycle state machine and its monetary invariants:
//!
//! ```text
//! DRAFT ──finalize──▶ PAID       (emits SaleRecorded, same commit)
//!   │
//!   └───cancel─────▶ CANCELLED   (emits SaleCancelled if any lines existed)
//! ```
//!
//! PAID and CANCELLED are terminal; mutations against them fail with
//! [`CheckoutError::InvalidState`]. All money is fixed-point
//! [`rust_decimal::Decimal`], never floating point.

pub mod error;
pub mod model;
pub mod money;
pub mod service;

#[cfg(test)]
mod tests;

pub use error::{CheckoutError, CheckoutResult};
pub use model::{LineItem, NewLineItem, NewTransaction, Transaction, TransactionStatus};
pub use service::CheckoutService;
