//! Payment ledger handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{PaymentResponse, RecordPaymentRequest},
    middleware::TenantContext,
    models::CreatePayment,
    tenant::tenant_filter,
    AppState,
};

/// Record a payment against a bill.
pub async fn record_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(bill_id): Path<Uuid>,
    Json(payload): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), AppError> {
    payload.validate()?;

    let scope = tenant_filter(&tenant.principal());

    let payment = state
        .db
        .record_payment(
            &scope,
            &CreatePayment {
                bill_id,
                amount: payload.amount,
                paid_on: payload.paid_on,
                method: payload.method,
                notes: payload.notes,
            },
        )
        .await?;

    // The paid bill's outstanding balance feeds the next period's carry.
    let bill = state.db.get_bill(&scope, payment.bill_id).await?;
    state
        .bill_sync
        .resync_bills_for_customer(
            bill.bill.admin_id,
            bill.bill.customer_id,
            bill.bill.bill_end_date,
        )
        .await;

    Ok((StatusCode::CREATED, Json(PaymentResponse::from(payment))))
}

/// Delete a payment. Rejected while the owning bill is invoiced.
pub async fn delete_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(payment_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let scope = tenant_filter(&tenant.principal());

    let payment = state.db.delete_payment(&scope, payment_id).await?;

    if let Ok(bill) = state.db.get_bill(&scope, payment.bill_id).await {
        state
            .bill_sync
            .resync_bills_for_customer(
                bill.bill.admin_id,
                bill.bill.customer_id,
                bill.bill.bill_end_date,
            )
            .await;
    }

    Ok(StatusCode::NO_CONTENT)
}
