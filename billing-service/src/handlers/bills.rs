//! Bill aggregation handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{
        BillDetailResponse, BillResponse, GenerateBillsRequest, GenerateBillsResponse,
        ListBillsQuery,
    },
    middleware::TenantContext,
    tenant::tenant_filter,
    AppState,
};

/// Generate bills for every active customer of the caller's tenant.
pub async fn generate_bills(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<GenerateBillsRequest>,
) -> Result<(StatusCode, Json<GenerateBillsResponse>), AppError> {
    let principal = tenant.principal();
    let admin_id = state.db.tenant_id_for_create(&principal).await?;

    tracing::info!(
        admin_id = %admin_id,
        period_start = %payload.period_start,
        period_end = %payload.period_end,
        "Generating bills"
    );

    let report = state
        .db
        .generate_bills(admin_id, payload.period_start, payload.period_end)
        .await?;

    Ok((StatusCode::CREATED, Json(GenerateBillsResponse::from(report))))
}

/// Get one bill with payments, invoice link, and derived status.
pub async fn get_bill(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(bill_id): Path<Uuid>,
) -> Result<Json<BillDetailResponse>, AppError> {
    let scope = tenant_filter(&tenant.principal());
    let bill = state.db.get_bill(&scope, bill_id).await?;
    Ok(Json(BillDetailResponse::from(bill)))
}

/// List bills with derived status.
pub async fn list_bills(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<ListBillsQuery>,
) -> Result<Json<Vec<BillResponse>>, AppError> {
    let scope = tenant_filter(&tenant.principal());
    let bills = state.db.list_bills(&scope, &query.into()).await?;
    Ok(Json(bills.into_iter().map(BillResponse::from).collect()))
}

/// Delete a bill and its payments. Rejected while an invoice is linked.
pub async fn delete_bill(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(bill_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let scope = tenant_filter(&tenant.principal());
    state.db.delete_bill(&scope, bill_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
