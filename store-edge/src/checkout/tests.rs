use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::checkout::error::CheckoutError;
use crate::checkout::model::{NewLineItem, NewTransaction, TransactionStatus};
use crate::checkout::service::CheckoutService;
use crate::ledger::LedgerStore;
use crate::outbox::event::{EventPayload, EventType};

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn create_test_service() -> CheckoutService {
    let ledger = LedgerStore::open_in_memory().unwrap();
    CheckoutService::new(ledger, "VND")
}

fn new_transaction() -> NewTransaction {
    NewTransaction {
        store_id: "store-001".to_string(),
        terminal_id: "till-1".to_string(),
        cashier_id: Some("cashier-9".to_string()),
        receipt_number: None,
        currency: None,
        note: None,
    }
}

fn line(sku: &str, unit_price: &str, quantity: &str) -> NewLineItem {
    NewLineItem {
        sku: sku.to_string(),
        barcode: None,
        name: format!("Product {sku}"),
        unit_price: dec(unit_price),
        quantity: dec(quantity),
        discount_amount: None,
        tax_amount: None,
        uom: None,
    }
}

#[test]
fn test_create_draft_with_zero_totals() {
    let service = create_test_service();
    let txn = service.create(new_transaction()).unwrap();

    assert_eq!(txn.status, TransactionStatus::Draft);
    assert_eq!(txn.subtotal, Decimal::ZERO);
    assert_eq!(txn.tax_amount, Decimal::ZERO);
    assert_eq!(txn.total, Decimal::ZERO);
    assert_eq!(txn.currency, "VND");
    assert!(txn.receipt_number.starts_with('R'));
    assert!(txn.started_at > 0);
    assert!(txn.completed_at.is_none());

    let loaded = service.get_transaction(txn.id).unwrap().unwrap();
    assert_eq!(loaded.id, txn.id);
}

#[test]
fn test_create_rejects_blank_identifiers() {
    let service = create_test_service();

    let blank_store = NewTransaction {
        store_id: "  ".to_string(),
        ..new_transaction()
    };
    assert!(matches!(
        service.create(blank_store),
        Err(CheckoutError::Validation(_))
    ));

    let blank_terminal = NewTransaction {
        terminal_id: String::new(),
        ..new_transaction()
    };
    assert!(matches!(
        service.create(blank_terminal),
        Err(CheckoutError::Validation(_))
    ));
}

#[test]
fn test_duplicate_receipt_number_conflicts() {
    let service = create_test_service();

    let explicit = NewTransaction {
        receipt_number: Some("R-77".to_string()),
        ..new_transaction()
    };
    service.create(explicit.clone()).unwrap();

    let err = service.create(explicit).unwrap_err();
    assert!(matches!(err, CheckoutError::ReceiptConflict { .. }));

    // The same number in a different store is allowed
    let other_store = NewTransaction {
        store_id: "store-002".to_string(),
        receipt_number: Some("R-77".to_string()),
        ..new_transaction()
    };
    assert!(service.create(other_store).is_ok());
}

#[test]
fn test_line_numbers_are_dense() {
    let service = create_test_service();
    let txn = service.create(new_transaction()).unwrap();

    for i in 1..=5u32 {
        let item = service
            .add_line_item(txn.id, line(&format!("SKU-{i}"), "1.00", "1"))
            .unwrap();
        assert_eq!(item.line_number, i);
    }

    let items = service.line_items(txn.id).unwrap();
    let numbers: Vec<u32> = items.iter().map(|i| i.line_number).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_line_numbers_dense_under_concurrent_adds() {
    let service = Arc::new(create_test_service());
    let txn = service.create(new_transaction()).unwrap();

    let mut handles = Vec::new();
    for i in 0..5 {
        let service = Arc::clone(&service);
        let id = txn.id;
        handles.push(std::thread::spawn(move || {
            service
                .add_line_item(id, line(&format!("SKU-{i}"), "2.00", "1"))
                .unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let mut numbers: Vec<u32> = service
        .line_items(txn.id)
        .unwrap()
        .iter()
        .map(|i| i.line_number)
        .collect();
    numbers.sort_unstable();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_add_line_item_to_missing_transaction() {
    let service = create_test_service();
    let err = service
        .add_line_item(Uuid::new_v4(), line("SKU-1", "1.00", "1"))
        .unwrap_err();
    assert!(matches!(err, CheckoutError::NotFound(_)));
}

#[test]
fn test_recalculate_totals_exact_decimal_sum() {
    let service = create_test_service();
    let txn = service.create(new_transaction()).unwrap();

    // 10.005×3 → 30.02, 7.333×2 → 14.67, 1.10×1 → 1.10
    service
        .add_line_item(txn.id, line("SKU-1", "10.005", "3"))
        .unwrap();
    service
        .add_line_item(txn.id, line("SKU-2", "7.333", "2"))
        .unwrap();
    service
        .add_line_item(txn.id, line("SKU-3", "1.10", "1"))
        .unwrap();

    let updated = service.recalculate_totals(txn.id).unwrap();
    let line_sum: Decimal = service
        .line_items(txn.id)
        .unwrap()
        .iter()
        .map(|i| i.line_total)
        .sum();

    assert_eq!(updated.total, line_sum);
    assert_eq!(updated.total, dec("45.79"));
    assert_eq!(updated.total, updated.subtotal + updated.tax_amount);
}

#[test]
fn test_recalculate_totals_is_idempotent() {
    let service = create_test_service();
    let txn = service.create(new_transaction()).unwrap();
    service
        .add_line_item(txn.id, line("SKU-1", "3.333", "3"))
        .unwrap();

    let first = service.recalculate_totals(txn.id).unwrap();
    let second = service.recalculate_totals(txn.id).unwrap();

    assert_eq!(first.subtotal, second.subtotal);
    assert_eq!(first.tax_amount, second.tax_amount);
    assert_eq!(first.total, second.total);
}

#[test]
fn test_totals_with_discount_and_tax() {
    let service = create_test_service();
    let txn = service.create(new_transaction()).unwrap();

    service
        .add_line_item(
            txn.id,
            NewLineItem {
                discount_amount: Some(dec("1.50")),
                tax_amount: Some(dec("0.80")),
                ..line("SKU-1", "10.00", "2")
            },
        )
        .unwrap();
    service
        .add_line_item(
            txn.id,
            NewLineItem {
                tax_amount: Some(dec("0.25")),
                ..line("SKU-2", "7.333", "3")
            },
        )
        .unwrap();

    let updated = service.recalculate_totals(txn.id).unwrap();
    assert_eq!(updated.subtotal, dec("40.50"));
    assert_eq!(updated.tax_amount, dec("1.05"));
    assert_eq!(updated.total, dec("41.55"));
    assert_eq!(updated.total, updated.subtotal + updated.tax_amount);
}

#[test]
fn test_finalize_emits_exactly_one_event_atomically() {
    let service = create_test_service();
    let txn = service.create(new_transaction()).unwrap();
    service
        .add_line_item(txn.id, line("SKU-1", "12.50", "2"))
        .unwrap();

    let finalized = service.finalize(txn.id).unwrap();
    assert_eq!(finalized.status, TransactionStatus::Paid);
    assert!(finalized.completed_at.is_some());
    assert_eq!(finalized.total, dec("25.00"));

    let events = service.ledger().outbox_events().unwrap();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.event_type, EventType::SaleRecorded);
    assert_eq!(event.aggregate_id, txn.id.to_string());
    assert_eq!(event.store_id, "store-001");
    assert_eq!(event.occurred_at, finalized.completed_at.unwrap());
    assert!(!event.is_published());

    // The payload is a self-contained snapshot
    match &event.payload {
        EventPayload::SaleRecorded { sale, .. } => {
            assert_eq!(sale.transaction.id, txn.id);
            assert_eq!(sale.transaction.total, dec("25.00"));
            assert_eq!(sale.line_items.len(), 1);
            assert_eq!(sale.line_items[0].line_total, dec("25.00"));
        }
        other => panic!("Expected SaleRecorded payload, got {other:?}"),
    }
}

#[test]
fn test_finalize_twice_yields_one_paid_transition() {
    let service = create_test_service();
    let txn = service.create(new_transaction()).unwrap();
    service
        .add_line_item(txn.id, line("SKU-1", "5.00", "1"))
        .unwrap();

    service.finalize(txn.id).unwrap();
    let err = service.finalize(txn.id).unwrap_err();
    assert!(matches!(
        err,
        CheckoutError::InvalidState {
            status: TransactionStatus::Paid,
            ..
        }
    ));

    // Still exactly one event
    assert_eq!(service.ledger().outbox_events().unwrap().len(), 1);
}

#[test]
fn test_finalize_empty_transaction_fails_without_event() {
    let service = create_test_service();
    let txn = service.create(new_transaction()).unwrap();

    let err = service.finalize(txn.id).unwrap_err();
    assert!(matches!(err, CheckoutError::EmptyTransaction(_)));

    let loaded = service.get_transaction(txn.id).unwrap().unwrap();
    assert_eq!(loaded.status, TransactionStatus::Draft);
    assert!(service.ledger().outbox_events().unwrap().is_empty());
}

#[test]
fn test_finalize_missing_transaction() {
    let service = create_test_service();
    let err = service.finalize(Uuid::new_v4()).unwrap_err();
    assert!(matches!(err, CheckoutError::NotFound(_)));
}

#[test]
fn test_cancel_untouched_draft_commits_no_event() {
    let service = create_test_service();
    let txn = service.create(new_transaction()).unwrap();

    let cancelled = service.cancel(txn.id).unwrap();
    assert_eq!(cancelled.status, TransactionStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
    assert!(service.ledger().outbox_events().unwrap().is_empty());
}

#[test]
fn test_cancel_with_items_emits_sale_cancelled() {
    let service = create_test_service();
    let txn = service.create(new_transaction()).unwrap();
    service
        .add_line_item(txn.id, line("SKU-1", "3.00", "1"))
        .unwrap();

    service.cancel(txn.id).unwrap();

    let events = service.ledger().outbox_events().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::SaleCancelled);
    match &events[0].payload {
        EventPayload::SaleCancelled { sale, .. } => {
            assert_eq!(sale.line_items.len(), 1);
        }
        other => panic!("Expected SaleCancelled payload, got {other:?}"),
    }
}

#[test]
fn test_terminal_transactions_reject_mutations() {
    let service = create_test_service();
    let txn = service.create(new_transaction()).unwrap();
    service
        .add_line_item(txn.id, line("SKU-1", "5.00", "1"))
        .unwrap();
    service.finalize(txn.id).unwrap();

    assert!(matches!(
        service.add_line_item(txn.id, line("SKU-2", "1.00", "1")),
        Err(CheckoutError::InvalidState { .. })
    ));
    assert!(matches!(
        service.cancel(txn.id),
        Err(CheckoutError::InvalidState { .. })
    ));
    assert!(matches!(
        service.recalculate_totals(txn.id),
        Err(CheckoutError::InvalidState { .. })
    ));

    // Reads still work
    assert!(service.get_transaction(txn.id).unwrap().is_some());
    assert_eq!(service.line_items(txn.id).unwrap().len(), 1);
}

#[test]
fn test_quantity_is_normalized_to_three_places() {
    let service = create_test_service();
    let txn = service.create(new_transaction()).unwrap();

    let item = service
        .add_line_item(txn.id, line("SKU-1", "4.00", "0.3335"))
        .unwrap();
    assert_eq!(item.quantity, dec("0.334"));
    // round2(4.00 × 0.334) = 1.34
    assert_eq!(item.line_total, dec("1.34"));
}
