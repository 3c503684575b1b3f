//! Money calculation using rust_decimal for fixed-point precision
//!
//! All monetary arithmetic happens in `Decimal`; nothing in the sale path
//! ever passes through a float, so repeated recalculation cannot drift.

use rust_decimal::prelude::*;

use crate::checkout::error::CheckoutError;
use crate::checkout::model::{LineItem, NewLineItem};

/// Monetary amounts round to 2 decimal places (currency minor units), half-up
pub const DECIMAL_PLACES: u32 = 2;

/// Quantities carry 3 fractional digits (weighed goods)
pub const QUANTITY_PLACES: u32 = 3;

/// Maximum allowed unit price
const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);
/// Maximum allowed quantity per line
const MAX_QUANTITY: Decimal = Decimal::from_parts(9999, 0, 0, false, 0);

/// Round a monetary value to minor-unit precision, half away from zero
#[inline]
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Normalize a quantity to its fixed precision
#[inline]
pub fn round_quantity(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(QUANTITY_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// line_total = round2(unit_price × quantity) − discount + tax
///
/// The gross amount is rounded before discount and tax are applied, so a
/// line's total is a pure function of its four inputs.
pub fn line_total(
    unit_price: Decimal,
    quantity: Decimal,
    discount_amount: Decimal,
    tax_amount: Decimal,
) -> Decimal {
    round_money(unit_price * quantity) - discount_amount + tax_amount
}

/// Sum line items into (subtotal, tax_amount).
///
/// subtotal collects the tax-exclusive part of each line; the derived
/// total (subtotal + tax) therefore equals the exact sum of line totals.
pub fn sum_totals(items: &[LineItem]) -> (Decimal, Decimal) {
    let mut subtotal = Decimal::ZERO;
    let mut tax = Decimal::ZERO;
    for item in items {
        subtotal += item.line_total - item.tax_amount;
        tax += item.tax_amount;
    }
    (subtotal, tax)
}

/// Validate a NewLineItem before processing
pub fn validate_line_input(input: &NewLineItem) -> Result<(), CheckoutError> {
    if input.sku.trim().is_empty() {
        return Err(CheckoutError::Validation("sku must not be empty".into()));
    }
    if input.name.trim().is_empty() {
        return Err(CheckoutError::Validation("name must not be empty".into()));
    }

    if input.unit_price < Decimal::ZERO {
        return Err(CheckoutError::Validation(format!(
            "unit_price must be non-negative, got {}",
            input.unit_price
        )));
    }
    if input.unit_price > MAX_UNIT_PRICE {
        return Err(CheckoutError::Validation(format!(
            "unit_price exceeds maximum allowed ({MAX_UNIT_PRICE}), got {}",
            input.unit_price
        )));
    }

    if input.quantity <= Decimal::ZERO {
        return Err(CheckoutError::Validation(format!(
            "quantity must be positive, got {}",
            input.quantity
        )));
    }
    if input.quantity > MAX_QUANTITY {
        return Err(CheckoutError::Validation(format!(
            "quantity exceeds maximum allowed ({MAX_QUANTITY}), got {}",
            input.quantity
        )));
    }

    if let Some(discount) = input.discount_amount
        && discount < Decimal::ZERO
    {
        return Err(CheckoutError::Validation(format!(
            "discount_amount must be non-negative, got {discount}"
        )));
    }
    if let Some(tax) = input.tax_amount
        && tax < Decimal::ZERO
    {
        return Err(CheckoutError::Validation(format!(
            "tax_amount must be non-negative, got {tax}"
        )));
    }

    Ok(())
}
