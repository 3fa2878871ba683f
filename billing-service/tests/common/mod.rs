//! Common test utilities for billing-service integration tests.

#![allow(dead_code)]

use billing_service::models::{
    CreateAdmin, CreateCustomer, CreateDeliveryEntry, CreatePayment, Customer, EntryKind,
};
use billing_service::services::Database;
use billing_service::tenant::Principal;
use chrono::NaiveDate;
use std::sync::Once;
use tempfile::TempDir;
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,billing_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// A scratch database living in a temporary directory.
pub struct TestDb {
    pub db: Database,
    _dir: TempDir,
}

/// Spawn a migrated scratch database.
pub async fn spawn_db() -> TestDb {
    init_tracing();

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("billing-test.db");
    let url = format!("sqlite://{}", path.display());

    let db = Database::new(&url, 5, 1)
        .await
        .expect("Failed to open test database");
    db.run_migrations().await.expect("Failed to run migrations");

    TestDb { db, _dir: dir }
}

/// Register a tenant owner and return its id with an owner principal.
pub async fn seed_admin(db: &Database, name: &str) -> (Uuid, Principal) {
    let admin = db
        .create_admin(&CreateAdmin {
            name: name.to_string(),
        })
        .await
        .expect("Failed to create admin");
    (
        admin.admin_id,
        Principal::Owner {
            admin_id: admin.admin_id,
        },
    )
}

/// Create a customer inside a tenant.
pub async fn seed_customer(db: &Database, admin_id: Uuid, code: &str, name: &str) -> Customer {
    db.create_customer(
        admin_id,
        &CreateCustomer {
            code: code.to_string(),
            name: name.to_string(),
            phone: None,
        },
    )
    .await
    .expect("Failed to create customer")
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

/// A DELIVERED entry input for a known customer.
pub fn delivered(customer: &Customer, quantity: i64, unit_price: i64, on: NaiveDate) -> CreateDeliveryEntry {
    CreateDeliveryEntry {
        customer_id: Some(customer.customer_id),
        customer_ref: None,
        kind: EntryKind::Delivered,
        quantity,
        unit_price,
        cylinder_label: "45kg".to_string(),
        delivery_date: on,
        verified: false,
        empties_collected: None,
        payment_type: None,
        payment_amount: None,
        payment_received_by: None,
    }
}

/// A RECEIVED entry input for a known customer.
pub fn received(customer: &Customer, quantity: i64, unit_price: i64, on: NaiveDate) -> CreateDeliveryEntry {
    CreateDeliveryEntry {
        customer_id: Some(customer.customer_id),
        customer_ref: None,
        kind: EntryKind::Received,
        quantity,
        unit_price,
        cylinder_label: "45kg".to_string(),
        delivery_date: on,
        verified: false,
        empties_collected: Some(quantity),
        payment_type: None,
        payment_amount: None,
        payment_received_by: None,
    }
}

/// A payment input against a bill.
pub fn payment(bill_id: Uuid, amount: i64, on: NaiveDate) -> CreatePayment {
    CreatePayment {
        bill_id,
        amount,
        paid_on: on,
        method: "cash".to_string(),
        notes: None,
    }
}
