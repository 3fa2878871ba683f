//! Append-only audit trail of billing events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Billing event kinds. Payment deletion gets its own kind rather than
/// reusing `PaymentReceived`, so the trail stays unambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentEventKind {
    BillGenerated,
    BillDeleted,
    PaymentReceived,
    PaymentDeleted,
    InvoiceGenerated,
    InvoiceDeleted,
}

impl PaymentEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentEventKind::BillGenerated => "BILL_GENERATED",
            PaymentEventKind::BillDeleted => "BILL_DELETED",
            PaymentEventKind::PaymentReceived => "PAYMENT_RECEIVED",
            PaymentEventKind::PaymentDeleted => "PAYMENT_DELETED",
            PaymentEventKind::InvoiceGenerated => "INVOICE_GENERATED",
            PaymentEventKind::InvoiceDeleted => "INVOICE_DELETED",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "BILL_GENERATED" => Some(PaymentEventKind::BillGenerated),
            "BILL_DELETED" => Some(PaymentEventKind::BillDeleted),
            "PAYMENT_RECEIVED" => Some(PaymentEventKind::PaymentReceived),
            "PAYMENT_DELETED" => Some(PaymentEventKind::PaymentDeleted),
            "INVOICE_GENERATED" => Some(PaymentEventKind::InvoiceGenerated),
            "INVOICE_DELETED" => Some(PaymentEventKind::InvoiceDeleted),
            _ => None,
        }
    }
}

/// One audit row. `bill_id` is nullable because log rows outlive the bills
/// they describe (bill deletion nulls the reference but keeps the row).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentLog {
    pub log_id: Uuid,
    pub admin_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub bill_id: Option<Uuid>,
    pub kind: String,
    pub amount: i64,
    pub details: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Filter parameters for listing audit rows.
#[derive(Debug, Clone)]
pub struct ListPaymentLogsFilter {
    pub customer_id: Option<Uuid>,
    pub bill_id: Option<Uuid>,
    pub kind: Option<PaymentEventKind>,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

impl Default for ListPaymentLogsFilter {
    fn default() -> Self {
        Self {
            customer_id: None,
            bill_id: None,
            kind: None,
            page_size: 50,
            page_token: None,
        }
    }
}
