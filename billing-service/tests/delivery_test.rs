//! Delivery ledger integration tests for billing-service.

mod common;

use billing_service::models::{
    CreateDeliveryEntry, EntryKind, ListDeliveriesFilter, UpdateDeliveryEntry,
};
use billing_service::tenant::tenant_filter;
use common::{date, delivered, received, seed_admin, seed_customer, spawn_db};

#[tokio::test]
async fn recording_a_delivery_computes_the_amount() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (admin_id, _) = seed_admin(db, "Depot").await;
    let customer = seed_customer(db, admin_id, "C-1", "Iqbal Traders").await;

    let entry = db
        .record_delivery(admin_id, &delivered(&customer, 10, 500, date(2026, 7, 3)))
        .await
        .expect("record");

    assert_eq!(entry.amount, 5000);
    assert_eq!(entry.customer_id, Some(customer.customer_id));
    assert_eq!(entry.customer_name, "Iqbal Traders");
    assert_eq!(entry.kind, "delivered");
}

#[tokio::test]
async fn receiving_more_than_delivered_is_rejected_with_both_totals() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (admin_id, _) = seed_admin(db, "Depot").await;
    let customer = seed_customer(db, admin_id, "C-1", "Iqbal Traders").await;

    db.record_delivery(admin_id, &delivered(&customer, 50, 500, date(2026, 7, 3)))
        .await
        .expect("record");

    let err = db
        .record_delivery(admin_id, &received(&customer, 55, 500, date(2026, 7, 10)))
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("55"), "message was: {}", message);
    assert!(message.contains("50"), "message was: {}", message);

    // No partial write.
    let scope = tenant_filter(&billing_service::tenant::Principal::Owner { admin_id });
    let entries = db
        .list_deliveries(&scope, &ListDeliveriesFilter::default())
        .await
        .expect("list");
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn receiving_within_delivered_is_accepted() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (admin_id, _) = seed_admin(db, "Depot").await;
    let customer = seed_customer(db, admin_id, "C-1", "Iqbal Traders").await;

    db.record_delivery(admin_id, &delivered(&customer, 50, 500, date(2026, 7, 3)))
        .await
        .expect("record");
    let entry = db
        .record_delivery(admin_id, &received(&customer, 30, 500, date(2026, 7, 10)))
        .await
        .expect("record received");

    assert_eq!(entry.kind, "received");
    assert_eq!(entry.quantity, 30);
}

#[tokio::test]
async fn updating_a_received_entry_excludes_its_own_quantity() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (admin_id, owner) = seed_admin(db, "Depot").await;
    let customer = seed_customer(db, admin_id, "C-1", "Iqbal Traders").await;
    let scope = tenant_filter(&owner);

    db.record_delivery(admin_id, &delivered(&customer, 50, 500, date(2026, 7, 3)))
        .await
        .expect("record");
    let entry = db
        .record_delivery(admin_id, &received(&customer, 30, 500, date(2026, 7, 10)))
        .await
        .expect("record received");

    // 30 already received, but the entry under edit is excluded: 0 + 50 <= 50.
    let updated = db
        .update_delivery(
            &scope,
            entry.entry_id,
            &UpdateDeliveryEntry {
                quantity: Some(50),
                ..Default::default()
            },
        )
        .await
        .expect("update");
    assert_eq!(updated.quantity, 50);
    assert_eq!(updated.amount, 50 * 500);

    let err = db
        .update_delivery(
            &scope,
            entry.entry_id,
            &UpdateDeliveryEntry {
                quantity: Some(51),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("51"));
}

#[tokio::test]
async fn shrinking_a_delivery_below_what_was_returned_is_rejected() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (admin_id, owner) = seed_admin(db, "Depot").await;
    let customer = seed_customer(db, admin_id, "C-1", "Iqbal Traders").await;
    let scope = tenant_filter(&owner);

    let sent = db
        .record_delivery(admin_id, &delivered(&customer, 50, 500, date(2026, 7, 3)))
        .await
        .expect("record");
    db.record_delivery(admin_id, &received(&customer, 40, 500, date(2026, 7, 10)))
        .await
        .expect("record received");

    let err = db
        .update_delivery(
            &scope,
            sent.entry_id,
            &UpdateDeliveryEntry {
                quantity: Some(30),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("40"));

    // Shrinking within the returned total stays legal.
    let updated = db
        .update_delivery(
            &scope,
            sent.entry_id,
            &UpdateDeliveryEntry {
                quantity: Some(40),
                ..Default::default()
            },
        )
        .await
        .expect("update");
    assert_eq!(updated.quantity, 40);
}

#[tokio::test]
async fn composite_reference_resolves_by_code_and_name() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (admin_id, _) = seed_admin(db, "Depot").await;
    let customer = seed_customer(db, admin_id, "C-104", "Iqbal Traders").await;

    let input = CreateDeliveryEntry {
        customer_id: None,
        customer_ref: Some("C-104 · Iqbal Traders".to_string()),
        ..delivered(&customer, 10, 500, date(2026, 7, 3))
    };
    let entry = db.record_delivery(admin_id, &input).await.expect("record");

    assert_eq!(entry.customer_id, Some(customer.customer_id));
    assert_eq!(entry.customer_name, "Iqbal Traders");
}

#[tokio::test]
async fn name_only_reference_falls_back_to_name_lookup() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (admin_id, _) = seed_admin(db, "Depot").await;
    let customer = seed_customer(db, admin_id, "C-104", "Iqbal Traders").await;

    let input = CreateDeliveryEntry {
        customer_id: None,
        customer_ref: Some("Iqbal Traders".to_string()),
        ..delivered(&customer, 4, 500, date(2026, 7, 3))
    };
    let entry = db.record_delivery(admin_id, &input).await.expect("record");

    assert_eq!(entry.customer_id, Some(customer.customer_id));
}

#[tokio::test]
async fn unresolvable_reference_keeps_the_raw_name_with_null_customer() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (admin_id, _) = seed_admin(db, "Depot").await;
    let customer = seed_customer(db, admin_id, "C-104", "Iqbal Traders").await;

    let input = CreateDeliveryEntry {
        customer_id: None,
        customer_ref: Some("X-999 · Unknown Shop".to_string()),
        ..delivered(&customer, 4, 500, date(2026, 7, 3))
    };
    let entry = db.record_delivery(admin_id, &input).await.expect("record");

    assert_eq!(entry.customer_id, None);
    assert_eq!(entry.customer_name, "X-999 · Unknown Shop");
}

#[tokio::test]
async fn deleting_a_delivered_entry_cascades_matching_received_entries() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (admin_id, owner) = seed_admin(db, "Depot").await;
    let customer = seed_customer(db, admin_id, "C-1", "Iqbal Traders").await;
    let scope = tenant_filter(&owner);
    let day = date(2026, 7, 3);

    let sent = db
        .record_delivery(admin_id, &delivered(&customer, 10, 500, day))
        .await
        .expect("record");
    db.record_delivery(admin_id, &received(&customer, 10, 500, day))
        .await
        .expect("record received");

    // Same customer and label, but a different day and price: untouched.
    db.record_delivery(admin_id, &delivered(&customer, 5, 450, date(2026, 7, 4)))
        .await
        .expect("record");

    let (deleted, cascade) = db.delete_delivery(&scope, sent.entry_id).await.expect("delete");
    assert_eq!(deleted.entry_id, sent.entry_id);
    assert_eq!(cascade, 1);

    let remaining = db
        .list_deliveries(&scope, &ListDeliveriesFilter::default())
        .await
        .expect("list");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].unit_price, 450);
}

#[tokio::test]
async fn deleting_a_received_entry_does_not_cascade() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (admin_id, owner) = seed_admin(db, "Depot").await;
    let customer = seed_customer(db, admin_id, "C-1", "Iqbal Traders").await;
    let scope = tenant_filter(&owner);
    let day = date(2026, 7, 3);

    db.record_delivery(admin_id, &delivered(&customer, 10, 500, day))
        .await
        .expect("record");
    let back = db
        .record_delivery(admin_id, &received(&customer, 10, 500, day))
        .await
        .expect("record received");

    let (_, cascade) = db.delete_delivery(&scope, back.entry_id).await.expect("delete");
    assert_eq!(cascade, 0);

    let remaining = db
        .list_deliveries(&scope, &ListDeliveriesFilter::default())
        .await
        .expect("list");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].kind, "delivered");
}

#[tokio::test]
async fn list_filters_by_kind_and_date_window() {
    let harness = spawn_db().await;
    let db = &harness.db;
    let (admin_id, owner) = seed_admin(db, "Depot").await;
    let customer = seed_customer(db, admin_id, "C-1", "Iqbal Traders").await;
    let scope = tenant_filter(&owner);

    db.record_delivery(admin_id, &delivered(&customer, 10, 500, date(2026, 6, 20)))
        .await
        .expect("record");
    db.record_delivery(admin_id, &delivered(&customer, 3, 500, date(2026, 7, 2)))
        .await
        .expect("record");
    db.record_delivery(admin_id, &received(&customer, 2, 500, date(2026, 7, 5)))
        .await
        .expect("record");

    let filter = ListDeliveriesFilter {
        kind: Some(EntryKind::Delivered),
        start_date: Some(date(2026, 7, 1)),
        end_date: Some(date(2026, 8, 1)),
        page_size: 50,
        ..Default::default()
    };
    let entries = db.list_deliveries(&scope, &filter).await.expect("list");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].quantity, 3);
}
