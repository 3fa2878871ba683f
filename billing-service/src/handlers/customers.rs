//! Customer registry handlers.

use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{CreateCustomerRequest, CustomerResponse},
    middleware::TenantContext,
    models::CreateCustomer,
    tenant::tenant_filter,
    AppState,
};

/// Create a customer within the caller's tenant.
pub async fn create_customer(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<CreateCustomerRequest>,
) -> Result<(StatusCode, Json<CustomerResponse>), AppError> {
    payload.validate()?;

    let principal = tenant.principal();
    let admin_id = state.db.tenant_id_for_create(&principal).await?;

    let customer = state
        .db
        .create_customer(
            admin_id,
            &CreateCustomer {
                code: payload.code,
                name: payload.name,
                phone: payload.phone,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(CustomerResponse::from(customer))))
}

/// List customers within the caller's tenant.
pub async fn list_customers(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<Json<Vec<CustomerResponse>>, AppError> {
    let scope = tenant_filter(&tenant.principal());
    let customers = state.db.list_customers(&scope).await?;
    Ok(Json(
        customers.into_iter().map(CustomerResponse::from).collect(),
    ))
}
