//! Tenant resolution and query scoping.
//!
//! Every engine operation takes an explicit [`Principal`]; nothing is read
//! from ambient request state. Reads are scoped through [`tenant_filter`],
//! writes are attributed through `Database::tenant_id_for_create`, and
//! record-level checks go through [`can_access`]. These three functions are
//! the sole isolation boundary between tenants.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated caller, as resolved by the (out-of-scope) auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Principal {
    /// System-wide operator with no tenant of its own; sees every tenant.
    Super,
    /// Owns exactly one tenant; `admin_id` is the tenant id.
    Owner { admin_id: Uuid },
    /// Staff inside a tenant. `admin_id` is the owning tenant's id; `None`
    /// means membership resolution failed upstream.
    Member { admin_id: Option<Uuid> },
}

/// The predicate every storage read applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantScope {
    /// No restriction (super-operator only).
    All,
    /// Restrict to one tenant.
    Tenant(Uuid),
    /// Matches zero rows. Used when tenant resolution fails: fail closed,
    /// never open.
    Denied,
}

impl TenantScope {
    /// Whether a record with the given tenant id is visible in this scope.
    pub fn allows(&self, admin_id: Uuid) -> bool {
        match self {
            TenantScope::All => true,
            TenantScope::Tenant(id) => *id == admin_id,
            TenantScope::Denied => false,
        }
    }
}

/// The tenant id that scopes the principal's data access, if any.
pub fn resolve_tenant(principal: &Principal) -> Option<Uuid> {
    match principal {
        Principal::Super => None,
        Principal::Owner { admin_id } => Some(*admin_id),
        Principal::Member { admin_id } => *admin_id,
    }
}

/// The read predicate for this principal.
pub fn tenant_filter(principal: &Principal) -> TenantScope {
    match principal {
        Principal::Super => TenantScope::All,
        Principal::Owner { admin_id } => TenantScope::Tenant(*admin_id),
        Principal::Member {
            admin_id: Some(admin_id),
        } => TenantScope::Tenant(*admin_id),
        Principal::Member { admin_id: None } => TenantScope::Denied,
    }
}

/// Whether the principal may touch a record owned by `record_admin_id`.
pub fn can_access(principal: &Principal, record_admin_id: Uuid) -> bool {
    match principal {
        Principal::Super => true,
        _ => resolve_tenant(principal) == Some(record_admin_id),
    }
}
