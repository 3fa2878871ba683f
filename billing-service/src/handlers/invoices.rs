//! Invoice lock handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::InvoiceResponse, middleware::TenantContext, tenant::tenant_filter, AppState,
};

/// Issue an invoice against a bill, freezing its financial state.
pub async fn generate_invoice(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(bill_id): Path<Uuid>,
) -> Result<(StatusCode, Json<InvoiceResponse>), AppError> {
    let scope = tenant_filter(&tenant.principal());
    let invoice = state.db.generate_invoice(&scope, bill_id).await?;
    Ok((StatusCode::CREATED, Json(InvoiceResponse::from(invoice))))
}

/// Withdraw an invoice, unlocking its bill.
pub async fn delete_invoice(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let scope = tenant_filter(&tenant.principal());
    state.db.delete_invoice(&scope, invoice_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
