//! Payment ledger model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A single payment event against exactly one bill.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub admin_id: Uuid,
    pub bill_id: Uuid,
    pub amount: i64,
    pub paid_on: NaiveDate,
    pub method: String,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Input for recording a payment.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub bill_id: Uuid,
    pub amount: i64,
    pub paid_on: NaiveDate,
    pub method: String,
    pub notes: Option<String>,
}
