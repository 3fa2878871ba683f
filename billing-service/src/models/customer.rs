//! Customer registry model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Separator used by legacy composite customer references ("CODE · Name").
pub const CUSTOMER_REF_SEPARATOR: char = '·';

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub customer_id: Uuid,
    pub admin_id: Uuid,
    pub code: String,
    pub name: String,
    pub phone: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a customer.
#[derive(Debug, Clone)]
pub struct CreateCustomer {
    pub code: String,
    pub name: String,
    pub phone: Option<String>,
}

/// Split a legacy `"<code> · <name>"` reference into its parts.
///
/// Returns `(code, name)` when the separator is present, otherwise `None` —
/// the caller falls back to treating the whole string as a name.
pub fn parse_customer_ref(reference: &str) -> Option<(&str, &str)> {
    let (code, name) = reference.split_once(CUSTOMER_REF_SEPARATOR)?;
    let code = code.trim();
    let name = name.trim();
    if code.is_empty() || name.is_empty() {
        return None;
    }
    Some((code, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_code_and_name() {
        assert_eq!(parse_customer_ref("C-104 · Iqbal Traders"), Some(("C-104", "Iqbal Traders")));
    }

    #[test]
    fn plain_name_has_no_parts() {
        assert_eq!(parse_customer_ref("Iqbal Traders"), None);
    }

    #[test]
    fn empty_sides_are_rejected() {
        assert_eq!(parse_customer_ref(" · Iqbal Traders"), None);
        assert_eq!(parse_customer_ref("C-104 · "), None);
    }
}
