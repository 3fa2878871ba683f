//! Invoice lock model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// 1:1 lock object attached to a bill. While present, the bill and its
/// payments are frozen against mutation and deletion.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub admin_id: Uuid,
    pub bill_id: Uuid,
    pub invoice_number: String,
    pub generated_utc: DateTime<Utc>,
}
