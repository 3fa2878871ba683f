//! Audit trail handlers.

use axum::{
    extract::{Query, State},
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{ListPaymentLogsQuery, PaymentLogResponse},
    middleware::TenantContext,
    tenant::tenant_filter,
    AppState,
};

/// List billing audit events within the caller's tenant.
pub async fn list_payment_logs(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<ListPaymentLogsQuery>,
) -> Result<Json<Vec<PaymentLogResponse>>, AppError> {
    let scope = tenant_filter(&tenant.principal());
    let filter = query.into_filter()?;
    let logs = state.db.list_payment_logs(&scope, &filter).await?;
    Ok(Json(logs.into_iter().map(PaymentLogResponse::from).collect()))
}
