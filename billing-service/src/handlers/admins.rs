//! Tenant owner registration.

use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{AdminResponse, CreateAdminRequest},
    middleware::TenantContext,
    models::CreateAdmin,
    tenant::Principal,
    AppState,
};

/// Register a tenant owner. Only the super operator may do this.
pub async fn create_admin(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<CreateAdminRequest>,
) -> Result<(StatusCode, Json<AdminResponse>), AppError> {
    payload.validate()?;

    if !matches!(tenant.principal(), Principal::Super) {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only the super operator may register tenant owners"
        )));
    }

    let admin = state
        .db
        .create_admin(&CreateAdmin { name: payload.name })
        .await?;

    Ok((StatusCode::CREATED, Json(AdminResponse::from(admin))))
}
