//! Tenant owner registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A tenant owner. The owner's id doubles as the tenant id every business
/// record is scoped by.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Admin {
    pub admin_id: Uuid,
    pub name: String,
    pub created_utc: DateTime<Utc>,
}

/// Input for registering a tenant owner.
#[derive(Debug, Clone)]
pub struct CreateAdmin {
    pub name: String,
}
