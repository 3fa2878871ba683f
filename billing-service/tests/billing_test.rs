//! Bill aggregation integration tests for billing-service.

mod common;

use billing_service::models::{BillStatus, ListPaymentLogsFilter, PaymentEventKind};
use billing_service::tenant::tenant_filter;
use common::{date, delivered, payment, seed_admin, seed_customer, spawn_db};

#[tokio::test]
async fn a_fresh_customer_gets_a_bill_from_period_deliveries() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (admin_id, owner) = seed_admin(db, "Depot").await;
    let customer = seed_customer(db, admin_id, "C-1", "Iqbal Traders").await;
    let scope = tenant_filter(&owner);

    db.record_delivery(admin_id, &delivered(&customer, 10, 500, date(2026, 7, 5)))
        .await
        .expect("record");

    let report = db
        .generate_bills(admin_id, date(2026, 7, 1), date(2026, 8, 1))
        .await
        .expect("generate");

    assert_eq!(report.generated.len(), 1);
    assert!(report.failures.is_empty());

    let bill = db
        .get_bill(&scope, report.generated[0].bill_id)
        .await
        .expect("get");
    assert_eq!(bill.bill.last_month_remaining, 0);
    assert_eq!(bill.bill.current_month_bill, 5000);
    assert_eq!(bill.bill.cylinders, 10);
    assert_eq!(bill.totals.total_amount, 5000);
    assert_eq!(bill.totals.remaining_amount, 5000);
    assert_eq!(bill.totals.status, BillStatus::NotPaid);
}

#[tokio::test]
async fn generation_is_idempotent_per_period() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (admin_id, _) = seed_admin(db, "Depot").await;
    let customer = seed_customer(db, admin_id, "C-1", "Iqbal Traders").await;

    db.record_delivery(admin_id, &delivered(&customer, 10, 500, date(2026, 7, 5)))
        .await
        .expect("record");

    let first = db
        .generate_bills(admin_id, date(2026, 7, 1), date(2026, 8, 1))
        .await
        .expect("generate");
    assert_eq!(first.generated.len(), 1);

    let second = db
        .generate_bills(admin_id, date(2026, 7, 1), date(2026, 8, 1))
        .await
        .expect("generate again");
    assert!(second.generated.is_empty());
    assert_eq!(second.skipped_existing, 1);
}

#[tokio::test]
async fn inactive_customers_get_no_bill() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (admin_id, _) = seed_admin(db, "Depot").await;
    let active = seed_customer(db, admin_id, "C-1", "Iqbal Traders").await;
    seed_customer(db, admin_id, "C-2", "Dormant Shop").await;

    db.record_delivery(admin_id, &delivered(&active, 10, 500, date(2026, 7, 5)))
        .await
        .expect("record");

    let report = db
        .generate_bills(admin_id, date(2026, 7, 1), date(2026, 8, 1))
        .await
        .expect("generate");

    assert_eq!(report.generated.len(), 1);
    assert_eq!(report.skipped_inactive, 1);
    assert_eq!(report.generated[0].customer_id, active.customer_id);
}

#[tokio::test]
async fn deliveries_outside_the_period_are_not_billed() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (admin_id, _) = seed_admin(db, "Depot").await;
    let customer = seed_customer(db, admin_id, "C-1", "Iqbal Traders").await;

    db.record_delivery(admin_id, &delivered(&customer, 10, 500, date(2026, 6, 28)))
        .await
        .expect("record");
    db.record_delivery(admin_id, &delivered(&customer, 3, 500, date(2026, 7, 5)))
        .await
        .expect("record");
    // The period is half open; an entry on the end date belongs to the next one.
    db.record_delivery(admin_id, &delivered(&customer, 7, 500, date(2026, 8, 1)))
        .await
        .expect("record");

    let report = db
        .generate_bills(admin_id, date(2026, 7, 1), date(2026, 8, 1))
        .await
        .expect("generate");

    assert_eq!(report.generated.len(), 1);
    assert_eq!(report.generated[0].current_month_bill, 1500);
    assert_eq!(report.generated[0].cylinders, 3);
}

#[tokio::test]
async fn unpaid_balance_carries_into_the_next_period() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (admin_id, owner) = seed_admin(db, "Depot").await;
    let customer = seed_customer(db, admin_id, "C-1", "Iqbal Traders").await;
    let scope = tenant_filter(&owner);

    db.record_delivery(admin_id, &delivered(&customer, 10, 500, date(2026, 7, 5)))
        .await
        .expect("record");
    let july = db
        .generate_bills(admin_id, date(2026, 7, 1), date(2026, 8, 1))
        .await
        .expect("generate");
    let july_bill = &july.generated[0];

    db.record_payment(&scope, &payment(july_bill.bill_id, 2000, date(2026, 7, 20)))
        .await
        .expect("pay");

    db.record_delivery(admin_id, &delivered(&customer, 6, 500, date(2026, 8, 10)))
        .await
        .expect("record");
    let august = db
        .generate_bills(admin_id, date(2026, 8, 1), date(2026, 9, 1))
        .await
        .expect("generate");

    let august_bill = &august.generated[0];
    assert_eq!(august_bill.current_month_bill, 3000);
    assert_eq!(august_bill.last_month_remaining, 3000);

    let resolved = db.get_bill(&scope, august_bill.bill_id).await.expect("get");
    assert_eq!(resolved.totals.total_amount, 6000);
    assert_eq!(resolved.totals.status, BillStatus::NotPaid);
}

#[tokio::test]
async fn a_settled_prior_bill_carries_nothing() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (admin_id, owner) = seed_admin(db, "Depot").await;
    let customer = seed_customer(db, admin_id, "C-1", "Iqbal Traders").await;
    let scope = tenant_filter(&owner);

    db.record_delivery(admin_id, &delivered(&customer, 10, 500, date(2026, 7, 5)))
        .await
        .expect("record");
    let july = db
        .generate_bills(admin_id, date(2026, 7, 1), date(2026, 8, 1))
        .await
        .expect("generate");
    db.record_payment(&scope, &payment(july.generated[0].bill_id, 5000, date(2026, 7, 20)))
        .await
        .expect("pay");

    db.record_delivery(admin_id, &delivered(&customer, 2, 500, date(2026, 8, 3)))
        .await
        .expect("record");
    let august = db
        .generate_bills(admin_id, date(2026, 8, 1), date(2026, 9, 1))
        .await
        .expect("generate");

    assert_eq!(august.generated[0].last_month_remaining, 0);
}

#[tokio::test]
async fn generation_writes_an_audit_row() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (admin_id, owner) = seed_admin(db, "Depot").await;
    let customer = seed_customer(db, admin_id, "C-1", "Iqbal Traders").await;
    let scope = tenant_filter(&owner);

    db.record_delivery(admin_id, &delivered(&customer, 10, 500, date(2026, 7, 5)))
        .await
        .expect("record");
    db.generate_bills(admin_id, date(2026, 7, 1), date(2026, 8, 1))
        .await
        .expect("generate");

    let logs = db
        .list_payment_logs(
            &scope,
            &ListPaymentLogsFilter {
                kind: Some(PaymentEventKind::BillGenerated),
                page_size: 50,
                ..Default::default()
            },
        )
        .await
        .expect("list logs");

    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].amount, 5000);
    assert_eq!(logs[0].customer_id, Some(customer.customer_id));
}

#[tokio::test]
async fn deleting_a_bill_removes_its_payments_but_not_its_history() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (admin_id, owner) = seed_admin(db, "Depot").await;
    let customer = seed_customer(db, admin_id, "C-1", "Iqbal Traders").await;
    let scope = tenant_filter(&owner);

    db.record_delivery(admin_id, &delivered(&customer, 10, 500, date(2026, 7, 5)))
        .await
        .expect("record");
    let report = db
        .generate_bills(admin_id, date(2026, 7, 1), date(2026, 8, 1))
        .await
        .expect("generate");
    let bill_id = report.generated[0].bill_id;

    let paid = db
        .record_payment(&scope, &payment(bill_id, 2000, date(2026, 7, 20)))
        .await
        .expect("pay");

    db.delete_bill(&scope, bill_id).await.expect("delete");

    // Bill and payment rows are gone.
    assert!(db.get_bill(&scope, bill_id).await.is_err());
    assert!(db.delete_payment(&scope, paid.payment_id).await.is_err());

    // The audit trail outlives them, with the bill reference nulled on the
    // deletion row.
    let deleted_logs = db
        .list_payment_logs(
            &scope,
            &ListPaymentLogsFilter {
                kind: Some(PaymentEventKind::BillDeleted),
                page_size: 50,
                ..Default::default()
            },
        )
        .await
        .expect("list logs");
    assert_eq!(deleted_logs.len(), 1);
    assert_eq!(deleted_logs[0].bill_id, None);
    assert_eq!(deleted_logs[0].amount, 5000);
}

#[tokio::test]
async fn resync_recomputes_an_uninvoiced_bill_from_the_ledger() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (admin_id, owner) = seed_admin(db, "Depot").await;
    let customer = seed_customer(db, admin_id, "C-1", "Iqbal Traders").await;
    let scope = tenant_filter(&owner);

    db.record_delivery(admin_id, &delivered(&customer, 10, 500, date(2026, 7, 5)))
        .await
        .expect("record");
    let report = db
        .generate_bills(admin_id, date(2026, 7, 1), date(2026, 8, 1))
        .await
        .expect("generate");
    let bill_id = report.generated[0].bill_id;

    // A late entry lands inside the already-billed period.
    db.record_delivery(admin_id, &delivered(&customer, 2, 500, date(2026, 7, 28)))
        .await
        .expect("record");

    let updated = db
        .resync_bill_for_customer(admin_id, customer.customer_id, date(2026, 7, 28))
        .await
        .expect("resync");
    assert!(updated);

    let bill = db.get_bill(&scope, bill_id).await.expect("get");
    assert_eq!(bill.bill.current_month_bill, 6000);
    assert_eq!(bill.bill.cylinders, 12);
}

#[tokio::test]
async fn month_resync_touches_only_stale_bills() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (admin_id, _) = seed_admin(db, "Depot").await;
    let customer = seed_customer(db, admin_id, "C-1", "Iqbal Traders").await;

    db.record_delivery(admin_id, &delivered(&customer, 10, 500, date(2026, 7, 5)))
        .await
        .expect("record");
    db.generate_bills(admin_id, date(2026, 7, 1), date(2026, 8, 1))
        .await
        .expect("generate");

    // Nothing changed since generation.
    let untouched = db
        .resync_bills_for_month(admin_id, date(2026, 7, 1))
        .await
        .expect("resync");
    assert_eq!(untouched, 0);

    db.record_delivery(admin_id, &delivered(&customer, 1, 500, date(2026, 7, 9)))
        .await
        .expect("record");
    let touched = db
        .resync_bills_for_month(admin_id, date(2026, 7, 1))
        .await
        .expect("resync");
    assert_eq!(touched, 1);
}
