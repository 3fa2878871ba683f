//! Tenant isolation integration tests for billing-service.

mod common;

use billing_service::models::{ListBillsFilter, ListDeliveriesFilter};
use billing_service::tenant::{tenant_filter, Principal};
use common::{date, delivered, seed_admin, seed_customer, spawn_db};

#[tokio::test]
async fn reads_never_cross_tenants() {
    let harness = spawn_db().await;
    let db = &harness.db;

    let (admin_a, owner_a) = seed_admin(db, "Tenant A").await;
    let (admin_b, owner_b) = seed_admin(db, "Tenant B").await;

    for i in 0..4 {
        let customer = seed_customer(db, admin_a, &format!("A-{}", i), &format!("A Cust {}", i)).await;
        db.record_delivery(admin_a, &delivered(&customer, 5, 100, date(2026, 7, 3)))
            .await
            .expect("Failed to record delivery");
    }
    for i in 0..3 {
        let customer = seed_customer(db, admin_b, &format!("B-{}", i), &format!("B Cust {}", i)).await;
        db.record_delivery(admin_b, &delivered(&customer, 2, 900, date(2026, 7, 4)))
            .await
            .expect("Failed to record delivery");
    }

    let scope_a = tenant_filter(&owner_a);
    let customers_a = db.list_customers(&scope_a).await.expect("list");
    assert_eq!(customers_a.len(), 4);
    assert!(customers_a.iter().all(|c| c.admin_id == admin_a));

    let deliveries_a = db
        .list_deliveries(&scope_a, &ListDeliveriesFilter::default())
        .await
        .expect("list");
    assert_eq!(deliveries_a.len(), 4);
    assert!(deliveries_a.iter().all(|e| e.admin_id == admin_a));

    let scope_b = tenant_filter(&owner_b);
    let deliveries_b = db
        .list_deliveries(&scope_b, &ListDeliveriesFilter::default())
        .await
        .expect("list");
    assert_eq!(deliveries_b.len(), 3);
    assert!(deliveries_b.iter().all(|e| e.admin_id == admin_b));
}

#[tokio::test]
async fn cross_tenant_record_access_reads_as_not_found() {
    let harness = spawn_db().await;
    let db = &harness.db;

    let (admin_a, owner_a) = seed_admin(db, "Tenant A").await;
    let (_admin_b, owner_b) = seed_admin(db, "Tenant B").await;

    let customer = seed_customer(db, admin_a, "A-1", "A Customer").await;
    db.record_delivery(admin_a, &delivered(&customer, 10, 500, date(2026, 7, 3)))
        .await
        .expect("record");
    let report = db
        .generate_bills(admin_a, date(2026, 7, 1), date(2026, 8, 1))
        .await
        .expect("generate");
    let bill_id = report.generated[0].bill_id;

    // The owning tenant sees the bill.
    let scope_a = tenant_filter(&owner_a);
    assert!(db.get_bill(&scope_a, bill_id).await.is_ok());

    // Another tenant gets the same answer as for a nonexistent id.
    let scope_b = tenant_filter(&owner_b);
    let err = db.get_bill(&scope_b, bill_id).await.unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn unresolved_member_scope_matches_zero_rows() {
    let harness = spawn_db().await;
    let db = &harness.db;

    let (admin_a, _) = seed_admin(db, "Tenant A").await;
    seed_customer(db, admin_a, "A-1", "A Customer").await;

    let denied = tenant_filter(&Principal::Member { admin_id: None });
    assert!(db.list_customers(&denied).await.expect("list").is_empty());
    assert!(db
        .list_deliveries(&denied, &ListDeliveriesFilter::default())
        .await
        .expect("list")
        .is_empty());
    assert!(db
        .list_bills(&denied, &ListBillsFilter::default())
        .await
        .expect("list")
        .is_empty());
}

#[tokio::test]
async fn super_operator_sees_every_tenant() {
    let harness = spawn_db().await;
    let db = &harness.db;

    let (admin_a, _) = seed_admin(db, "Tenant A").await;
    let (admin_b, _) = seed_admin(db, "Tenant B").await;
    seed_customer(db, admin_a, "A-1", "A Customer").await;
    seed_customer(db, admin_b, "B-1", "B Customer").await;

    let scope = tenant_filter(&Principal::Super);
    let customers = db.list_customers(&scope).await.expect("list");
    assert_eq!(customers.len(), 2);
}

#[tokio::test]
async fn member_writes_land_in_owning_tenant() {
    let harness = spawn_db().await;
    let db = &harness.db;

    let (admin_a, _) = seed_admin(db, "Tenant A").await;
    let member = Principal::Member {
        admin_id: Some(admin_a),
    };
    assert_eq!(db.tenant_id_for_create(&member).await.expect("resolve"), admin_a);
}

#[tokio::test]
async fn super_creates_fall_back_to_earliest_owner() {
    let harness = spawn_db().await;
    let db = &harness.db;

    let (admin_first, _) = seed_admin(db, "First Tenant").await;
    seed_admin(db, "Second Tenant").await;

    let resolved = db
        .tenant_id_for_create(&Principal::Super)
        .await
        .expect("resolve");
    assert_eq!(resolved, admin_first);
}

#[tokio::test]
async fn super_creates_fail_without_any_owner() {
    let harness = spawn_db().await;
    let err = harness
        .db
        .tenant_id_for_create(&Principal::Super)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("No tenant owner"));
}
