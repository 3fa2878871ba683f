//! Delivery ledger handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        CreateDeliveryRequest, DeleteDeliveryResponse, DeliveryResponse, ListDeliveriesQuery,
        UpdateDeliveryRequest,
    },
    middleware::TenantContext,
    models::EntryKind,
    tenant::tenant_filter,
    AppState,
};

/// Record a cylinder movement within the caller's tenant.
pub async fn create_delivery(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<CreateDeliveryRequest>,
) -> Result<(StatusCode, Json<DeliveryResponse>), AppError> {
    payload.validate()?;

    let principal = tenant.principal();
    let admin_id = state.db.tenant_id_for_create(&principal).await?;
    let input = payload.into_input()?;

    let entry = state.db.record_delivery(admin_id, &input).await?;

    // Delivered quantities feed bill aggregation; returned empties do not.
    if entry.entry_kind() == Some(EntryKind::Delivered) {
        if let Some(customer_id) = entry.customer_id {
            state
                .bill_sync
                .resync_bills_for_customer(entry.admin_id, customer_id, entry.delivery_date)
                .await;
        }
    }

    Ok((StatusCode::CREATED, Json(DeliveryResponse::from(entry))))
}

/// Update a delivery entry within the caller's tenant.
pub async fn update_delivery(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(entry_id): Path<Uuid>,
    Json(payload): Json<UpdateDeliveryRequest>,
) -> Result<Json<DeliveryResponse>, AppError> {
    let scope = tenant_filter(&tenant.principal());

    let previous = state
        .db
        .get_delivery(&scope, entry_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Delivery entry not found")))?;

    let entry = state
        .db
        .update_delivery(&scope, entry_id, &payload.into())
        .await?;

    if entry.entry_kind() == Some(EntryKind::Delivered) {
        if let Some(customer_id) = entry.customer_id {
            state
                .bill_sync
                .resync_bills_for_customer(entry.admin_id, customer_id, entry.delivery_date)
                .await;
            // A moved entry also leaves its old billing period stale.
            if previous.delivery_date != entry.delivery_date {
                state
                    .bill_sync
                    .resync_bills_for_customer(entry.admin_id, customer_id, previous.delivery_date)
                    .await;
            }
        }
    }

    Ok(Json(DeliveryResponse::from(entry)))
}

/// Delete a delivery entry within the caller's tenant.
///
/// Deleting a DELIVERED entry cascades to its mirrored RECEIVED entries and
/// re-syncs the affected month.
pub async fn delete_delivery(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(entry_id): Path<Uuid>,
) -> Result<Json<DeleteDeliveryResponse>, AppError> {
    let scope = tenant_filter(&tenant.principal());

    let (entry, cascade_deleted) = state.db.delete_delivery(&scope, entry_id).await?;

    if entry.entry_kind() == Some(EntryKind::Delivered) {
        state
            .bill_sync
            .resync_bills_for_month(entry.admin_id, entry.delivery_date)
            .await;
    }

    Ok(Json(DeleteDeliveryResponse {
        entry_id: entry.entry_id,
        cascade_deleted,
    }))
}

/// List delivery entries within the caller's tenant.
pub async fn list_deliveries(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<ListDeliveriesQuery>,
) -> Result<Json<Vec<DeliveryResponse>>, AppError> {
    let scope = tenant_filter(&tenant.principal());
    let filter = query.into_filter()?;
    let entries = state.db.list_deliveries(&scope, &filter).await?;
    Ok(Json(
        entries.into_iter().map(DeliveryResponse::from).collect(),
    ))
}
