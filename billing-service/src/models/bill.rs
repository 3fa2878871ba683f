//! Bill model and status derivation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::{Invoice, Payment};

/// Payment state of a bill. Always derived from the stored totals and the
/// payment rows, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    NotPaid,
    PartiallyPaid,
    Paid,
}

impl BillStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillStatus::NotPaid => "not_paid",
            BillStatus::PartiallyPaid => "partially_paid",
            BillStatus::Paid => "paid",
        }
    }
}

/// One customer's financial obligation for a period `[start, end)`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Bill {
    pub bill_id: Uuid,
    pub admin_id: Uuid,
    pub customer_id: Uuid,
    pub bill_start_date: NaiveDate,
    pub bill_end_date: NaiveDate,
    pub last_month_remaining: i64,
    pub current_month_bill: i64,
    pub cylinders: i64,
    pub created_utc: DateTime<Utc>,
}

/// Derived financial state of a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillTotals {
    pub total_amount: i64,
    pub paid_amount: i64,
    pub remaining_amount: i64,
    pub status: BillStatus,
}

/// Compute a bill's derived totals and status.
///
/// `remaining` clamps at zero so an over-credited bill still reads as paid
/// rather than negative.
pub fn derive_totals(last_month_remaining: i64, current_month_bill: i64, paid_amount: i64) -> BillTotals {
    let total_amount = last_month_remaining + current_month_bill;
    let remaining_amount = (total_amount - paid_amount).max(0);
    let status = if remaining_amount <= 0 {
        BillStatus::Paid
    } else if paid_amount > 0 {
        BillStatus::PartiallyPaid
    } else {
        BillStatus::NotPaid
    };
    BillTotals {
        total_amount,
        paid_amount,
        remaining_amount,
        status,
    }
}

/// A bill resolved with its payments, invoice link, and derived totals.
#[derive(Debug, Clone)]
pub struct BillWithPayments {
    pub bill: Bill,
    pub payments: Vec<Payment>,
    pub invoice: Option<Invoice>,
    pub totals: BillTotals,
}

/// A bill row with derived totals, as returned by list queries. Payments are
/// not expanded here; `BillWithPayments` carries them for single-bill reads.
#[derive(Debug, Clone)]
pub struct BillSummary {
    pub bill: Bill,
    pub totals: BillTotals,
    pub invoiced: bool,
}

/// Filter parameters for listing bills.
#[derive(Debug, Clone)]
pub struct ListBillsFilter {
    pub customer_id: Option<Uuid>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

impl Default for ListBillsFilter {
    fn default() -> Self {
        Self {
            customer_id: None,
            period_start: None,
            period_end: None,
            page_size: 50,
            page_token: None,
        }
    }
}

/// One customer's failure during bulk generation.
#[derive(Debug, Clone, Serialize)]
pub struct BillGenerationFailure {
    pub customer_id: Uuid,
    pub customer_name: String,
    pub reason: String,
}

/// Outcome of a bulk generation run. Failures are collected per customer;
/// one customer's failure never aborts the others.
#[derive(Debug, Clone, Default)]
pub struct BillGenerationReport {
    pub generated: Vec<Bill>,
    pub skipped_existing: usize,
    pub skipped_inactive: usize,
    pub failures: Vec<BillGenerationFailure>,
}
