//! Invoice lock integration tests for billing-service.

mod common;

use billing_service::models::UpdateDeliveryEntry;
use billing_service::services::Database;
use billing_service::tenant::{tenant_filter, TenantScope};
use common::{date, delivered, payment, seed_admin, seed_customer, spawn_db};
use uuid::Uuid;

async fn seed_july_bill(db: &Database) -> (Uuid, TenantScope, Uuid) {
    let (admin_id, owner) = seed_admin(db, "Depot").await;
    let customer = seed_customer(db, admin_id, "C-1", "Iqbal Traders").await;
    db.record_delivery(admin_id, &delivered(&customer, 10, 500, date(2026, 7, 5)))
        .await
        .expect("record");
    let report = db
        .generate_bills(admin_id, date(2026, 7, 1), date(2026, 8, 1))
        .await
        .expect("generate");
    (admin_id, tenant_filter(&owner), report.generated[0].bill_id)
}

#[tokio::test]
async fn invoice_numbers_are_sequential_per_tenant() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (admin_id, scope, bill_id) = seed_july_bill(db).await;

    let first = db.generate_invoice(&scope, bill_id).await.expect("invoice");
    assert_eq!(first.invoice_number, "INV-00001");

    // A second bill in the same tenant continues the sequence.
    let customer = seed_customer(db, admin_id, "C-2", "Second Shop").await;
    db.record_delivery(admin_id, &delivered(&customer, 4, 500, date(2026, 7, 9)))
        .await
        .expect("record");
    let report = db
        .generate_bills(admin_id, date(2026, 7, 1), date(2026, 8, 1))
        .await
        .expect("generate");
    let second = db
        .generate_invoice(&scope, report.generated[0].bill_id)
        .await
        .expect("invoice");
    assert_eq!(second.invoice_number, "INV-00002");
}

#[tokio::test]
async fn a_bill_can_carry_only_one_invoice() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (_, scope, bill_id) = seed_july_bill(db).await;

    db.generate_invoice(&scope, bill_id).await.expect("invoice");
    let err = db.generate_invoice(&scope, bill_id).await.unwrap_err();
    assert!(err.to_string().contains("already issued"));
}

#[tokio::test]
async fn an_invoiced_bill_is_financially_locked() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (_, scope, bill_id) = seed_july_bill(db).await;

    let paid = db
        .record_payment(&scope, &payment(bill_id, 2000, date(2026, 7, 10)))
        .await
        .expect("pay");

    db.generate_invoice(&scope, bill_id).await.expect("invoice");

    let err = db
        .record_payment(&scope, &payment(bill_id, 1000, date(2026, 7, 20)))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("financially locked"));

    let err = db.delete_payment(&scope, paid.payment_id).await.unwrap_err();
    assert!(err.to_string().contains("financially locked"));

    let err = db.delete_bill(&scope, bill_id).await.unwrap_err();
    assert!(err.to_string().contains("financially locked"));
}

#[tokio::test]
async fn withdrawing_the_invoice_unlocks_the_bill() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (_, scope, bill_id) = seed_july_bill(db).await;

    let paid = db
        .record_payment(&scope, &payment(bill_id, 5000, date(2026, 7, 10)))
        .await
        .expect("pay");
    let invoice = db.generate_invoice(&scope, bill_id).await.expect("invoice");

    assert!(db.delete_payment(&scope, paid.payment_id).await.is_err());

    db.delete_invoice(&scope, invoice.invoice_id)
        .await
        .expect("withdraw");
    db.delete_payment(&scope, paid.payment_id)
        .await
        .expect("delete payment after unlock");
}

#[tokio::test]
async fn an_invoiced_bill_is_frozen_against_resync() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (admin_id, scope, bill_id) = seed_july_bill(db).await;

    db.generate_invoice(&scope, bill_id).await.expect("invoice");

    let customer_id = db.get_bill(&scope, bill_id).await.expect("get").bill.customer_id;

    // The late ledger entry must not change the issued figures.
    let customer = db
        .get_customer(&scope, customer_id)
        .await
        .expect("get customer")
        .expect("customer exists");
    db.record_delivery(admin_id, &delivered(&customer, 3, 500, date(2026, 7, 28)))
        .await
        .expect("record");

    let updated = db
        .resync_bill_for_customer(admin_id, customer_id, date(2026, 7, 28))
        .await
        .expect("resync");
    assert!(!updated);

    let bill = db.get_bill(&scope, bill_id).await.expect("get");
    assert_eq!(bill.bill.current_month_bill, 5000);
}

#[tokio::test]
async fn ledger_edits_stay_legal_while_the_bill_is_frozen() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (_admin_id, scope, bill_id) = seed_july_bill(db).await;

    db.generate_invoice(&scope, bill_id).await.expect("invoice");

    // Ledger edits themselves stay legal; only the bill is frozen.
    let entries = db
        .list_deliveries(&scope, &Default::default())
        .await
        .expect("list");
    let entry = &entries[0];
    db.update_delivery(
        &scope,
        entry.entry_id,
        &UpdateDeliveryEntry {
            verified: Some(true),
            ..Default::default()
        },
    )
    .await
    .expect("update");

    let bill = db.get_bill(&scope, bill_id).await.expect("get");
    assert_eq!(bill.bill.current_month_bill, 5000);
}

#[tokio::test]
async fn foreign_tenants_cannot_see_or_withdraw_an_invoice() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (_, scope, bill_id) = seed_july_bill(db).await;
    let invoice = db.generate_invoice(&scope, bill_id).await.expect("invoice");

    let (_, other_owner) = seed_admin(db, "Other Depot").await;
    let foreign_scope = tenant_filter(&other_owner);

    let err = db
        .delete_invoice(&foreign_scope, invoice.invoice_id)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
}
