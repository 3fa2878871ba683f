//! Tenant context middleware for multi-tenancy support.
//!
//! Extracts the caller's role and tenant from request headers. These headers
//! are set by the authenticating frontend after validating the session; this
//! service never resolves sessions itself. The extracted [`Principal`] is
//! passed explicitly into every engine operation.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

use crate::tenant::Principal;

/// Role header values understood by the extractor.
const ROLE_HEADER: &str = "X-Role";
const ADMIN_ID_HEADER: &str = "X-Admin-ID";

/// Tenant context extracted from request headers.
#[derive(Debug, Clone)]
pub struct TenantContext {
    principal: Principal,
}

impl TenantContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    /// The authenticated caller.
    pub fn principal(&self) -> Principal {
        self.principal
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let role = parts
            .headers
            .get(ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!(
                    "Missing {} header (required from the auth frontend)",
                    ROLE_HEADER
                ))
            })?;

        let admin_id = parts
            .headers
            .get(ADMIN_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| {
                AppError::Unauthorized(anyhow::anyhow!("Invalid {} header: {}", ADMIN_ID_HEADER, e))
            })?;

        let principal = match role {
            "super" => Principal::Super,
            "owner" => {
                let admin_id = admin_id.ok_or_else(|| {
                    AppError::Unauthorized(anyhow::anyhow!(
                        "Missing {} header for owner principal",
                        ADMIN_ID_HEADER
                    ))
                })?;
                Principal::Owner { admin_id }
            }
            // A member without a resolved owning tenant still gets a
            // principal; the tenant filter fails closed for it.
            "member" => Principal::Member { admin_id },
            other => {
                return Err(AppError::Unauthorized(anyhow::anyhow!(
                    "Unknown role '{}'",
                    other
                )))
            }
        };

        let span = tracing::Span::current();
        span.record("role", role);
        if let Some(ref id) = admin_id {
            span.record("admin_id", id.to_string().as_str());
        }

        Ok(TenantContext::new(principal))
    }
}
