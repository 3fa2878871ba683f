//! Bill re-synchronization after ledger and payment mutations.
//!
//! The engine does not silently mutate bills from inside delivery or payment
//! code paths; instead the surrounding application is notified through
//! [`BillSync`] and decides how to re-aggregate. [`LiveBillSync`] is the
//! in-process implementation backed by the database service.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::services::Database;

/// Injected dependency invoked after any DELIVERED-entry create/update/delete
/// and after any payment create/delete, so bill totals track the delivery
/// ledger without a manual full regeneration.
#[async_trait]
pub trait BillSync: Send + Sync {
    /// Re-aggregate the bill covering `period_hint` for one customer.
    async fn resync_bills_for_customer(
        &self,
        admin_id: Uuid,
        customer_id: Uuid,
        period_hint: NaiveDate,
    );

    /// Re-aggregate every bill of the tenant overlapping the month that
    /// contains `month`.
    async fn resync_bills_for_month(&self, admin_id: Uuid, month: NaiveDate);
}

/// Live implementation that re-runs aggregation through the database
/// service. Resync is best effort: a failure is logged, never propagated
/// into the mutation that triggered it (which has already committed).
#[derive(Clone)]
pub struct LiveBillSync {
    db: Arc<Database>,
}

impl LiveBillSync {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BillSync for LiveBillSync {
    async fn resync_bills_for_customer(
        &self,
        admin_id: Uuid,
        customer_id: Uuid,
        period_hint: NaiveDate,
    ) {
        if let Err(e) = self
            .db
            .resync_bill_for_customer(admin_id, customer_id, period_hint)
            .await
        {
            warn!(
                admin_id = %admin_id,
                customer_id = %customer_id,
                error = %e,
                "Customer bill resync failed"
            );
        }
    }

    async fn resync_bills_for_month(&self, admin_id: Uuid, month: NaiveDate) {
        let month_start = month.with_day(1).unwrap_or(month);
        if let Err(e) = self.db.resync_bills_for_month(admin_id, month_start).await {
            warn!(admin_id = %admin_id, month = %month_start, error = %e, "Month resync failed");
        }
    }
}

/// No-op implementation for callers that handle re-aggregation themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBillSync;

#[async_trait]
impl BillSync for NoopBillSync {
    async fn resync_bills_for_customer(&self, _: Uuid, _: Uuid, _: NaiveDate) {}

    async fn resync_bills_for_month(&self, _: Uuid, _: NaiveDate) {}
}
