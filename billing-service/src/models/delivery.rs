//! Delivery ledger models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Direction of a cylinder movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Filled cylinders sent out to a customer.
    Delivered,
    /// Empty cylinders returned by a customer.
    Received,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Delivered => "delivered",
            EntryKind::Received => "received",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "delivered" => Some(EntryKind::Delivered),
            "received" => Some(EntryKind::Received),
            _ => None,
        }
    }
}

/// One cylinder movement event.
///
/// `customer_id` is nullable: legacy composite references that fail to
/// resolve leave the entry attached to the raw `customer_name` only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeliveryEntry {
    pub entry_id: Uuid,
    pub admin_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub customer_name: String,
    pub kind: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub amount: i64,
    pub cylinder_label: String,
    pub delivery_date: NaiveDate,
    pub verified: bool,
    pub empties_collected: Option<i64>,
    pub payment_type: Option<String>,
    pub payment_amount: Option<i64>,
    pub payment_received_by: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl DeliveryEntry {
    pub fn entry_kind(&self) -> Option<EntryKind> {
        EntryKind::from_string(&self.kind)
    }
}

/// Input for recording a delivery-ledger entry.
#[derive(Debug, Clone)]
pub struct CreateDeliveryEntry {
    pub customer_id: Option<Uuid>,
    /// Legacy composite reference, consulted only when `customer_id` is absent.
    pub customer_ref: Option<String>,
    pub kind: EntryKind,
    pub quantity: i64,
    pub unit_price: i64,
    pub cylinder_label: String,
    pub delivery_date: NaiveDate,
    pub verified: bool,
    pub empties_collected: Option<i64>,
    pub payment_type: Option<String>,
    pub payment_amount: Option<i64>,
    pub payment_received_by: Option<String>,
}

/// Partial update for a delivery-ledger entry.
#[derive(Debug, Clone, Default)]
pub struct UpdateDeliveryEntry {
    pub quantity: Option<i64>,
    pub unit_price: Option<i64>,
    pub cylinder_label: Option<String>,
    pub delivery_date: Option<NaiveDate>,
    pub verified: Option<bool>,
    pub empties_collected: Option<i64>,
    pub payment_type: Option<String>,
    pub payment_amount: Option<i64>,
    pub payment_received_by: Option<String>,
}

/// Filter parameters for listing delivery entries.
#[derive(Debug, Clone)]
pub struct ListDeliveriesFilter {
    pub customer_id: Option<Uuid>,
    pub kind: Option<EntryKind>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

impl Default for ListDeliveriesFilter {
    fn default() -> Self {
        Self {
            customer_id: None,
            kind: None,
            start_date: None,
            end_date: None,
            page_size: 50,
            page_token: None,
        }
    }
}
