//! Request and response DTOs for the HTTP API.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    Admin, Bill, BillGenerationFailure, BillGenerationReport, BillSummary, BillTotals,
    BillWithPayments, CreateDeliveryEntry, Customer, DeliveryEntry, EntryKind, Invoice,
    ListBillsFilter, ListDeliveriesFilter, ListPaymentLogsFilter, Payment, PaymentEventKind,
    PaymentLog, UpdateDeliveryEntry,
};

const DEFAULT_PAGE_SIZE: i32 = 50;

// -----------------------------------------------------------------------------
// Tenancy
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAdminRequest {
    #[validate(length(min = 1))]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct AdminResponse {
    pub admin_id: Uuid,
    pub name: String,
    pub created_utc: DateTime<Utc>,
}

impl From<Admin> for AdminResponse {
    fn from(a: Admin) -> Self {
        Self {
            admin_id: a.admin_id,
            name: a.name,
            created_utc: a.created_utc,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCustomerRequest {
    #[validate(length(min = 1))]
    pub code: String,
    #[validate(length(min = 1))]
    pub name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CustomerResponse {
    pub customer_id: Uuid,
    pub code: String,
    pub name: String,
    pub phone: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl From<Customer> for CustomerResponse {
    fn from(c: Customer) -> Self {
        Self {
            customer_id: c.customer_id,
            code: c.code,
            name: c.name,
            phone: c.phone,
            created_utc: c.created_utc,
        }
    }
}

// -----------------------------------------------------------------------------
// Delivery ledger
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDeliveryRequest {
    pub customer_id: Option<Uuid>,
    /// Legacy `"<code> · <name>"` reference, used when `customer_id` is absent.
    pub customer_ref: Option<String>,
    pub kind: String,
    #[validate(range(min = 1))]
    pub quantity: i64,
    #[validate(range(min = 0))]
    pub unit_price: i64,
    #[validate(length(min = 1))]
    pub cylinder_label: String,
    pub delivery_date: NaiveDate,
    #[serde(default)]
    pub verified: bool,
    pub empties_collected: Option<i64>,
    pub payment_type: Option<String>,
    pub payment_amount: Option<i64>,
    pub payment_received_by: Option<String>,
}

impl CreateDeliveryRequest {
    pub fn into_input(self) -> Result<CreateDeliveryEntry, AppError> {
        let kind = EntryKind::from_string(&self.kind).ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "Unknown entry kind '{}', expected 'delivered' or 'received'",
                self.kind
            ))
        })?;
        Ok(CreateDeliveryEntry {
            customer_id: self.customer_id,
            customer_ref: self.customer_ref,
            kind,
            quantity: self.quantity,
            unit_price: self.unit_price,
            cylinder_label: self.cylinder_label,
            delivery_date: self.delivery_date,
            verified: self.verified,
            empties_collected: self.empties_collected,
            payment_type: self.payment_type,
            payment_amount: self.payment_amount,
            payment_received_by: self.payment_received_by,
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateDeliveryRequest {
    pub quantity: Option<i64>,
    pub unit_price: Option<i64>,
    pub cylinder_label: Option<String>,
    pub delivery_date: Option<NaiveDate>,
    pub verified: Option<bool>,
    pub empties_collected: Option<i64>,
    pub payment_type: Option<String>,
    pub payment_amount: Option<i64>,
    pub payment_received_by: Option<String>,
}

impl From<UpdateDeliveryRequest> for UpdateDeliveryEntry {
    fn from(r: UpdateDeliveryRequest) -> Self {
        Self {
            quantity: r.quantity,
            unit_price: r.unit_price,
            cylinder_label: r.cylinder_label,
            delivery_date: r.delivery_date,
            verified: r.verified,
            empties_collected: r.empties_collected,
            payment_type: r.payment_type,
            payment_amount: r.payment_amount,
            payment_received_by: r.payment_received_by,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ListDeliveriesQuery {
    pub customer_id: Option<Uuid>,
    pub kind: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page_size: Option<i32>,
    pub page_token: Option<Uuid>,
}

impl ListDeliveriesQuery {
    pub fn into_filter(self) -> Result<ListDeliveriesFilter, AppError> {
        let kind = self
            .kind
            .as_deref()
            .map(|k| {
                EntryKind::from_string(k).ok_or_else(|| {
                    AppError::BadRequest(anyhow::anyhow!("Unknown entry kind '{}'", k))
                })
            })
            .transpose()?;
        Ok(ListDeliveriesFilter {
            customer_id: self.customer_id,
            kind,
            start_date: self.start_date,
            end_date: self.end_date,
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            page_token: self.page_token,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct DeliveryResponse {
    pub entry_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub customer_name: String,
    pub kind: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub amount: i64,
    pub cylinder_label: String,
    pub delivery_date: NaiveDate,
    pub verified: bool,
    pub empties_collected: Option<i64>,
    pub payment_type: Option<String>,
    pub payment_amount: Option<i64>,
    pub payment_received_by: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl From<DeliveryEntry> for DeliveryResponse {
    fn from(e: DeliveryEntry) -> Self {
        Self {
            entry_id: e.entry_id,
            customer_id: e.customer_id,
            customer_name: e.customer_name,
            kind: e.kind,
            quantity: e.quantity,
            unit_price: e.unit_price,
            amount: e.amount,
            cylinder_label: e.cylinder_label,
            delivery_date: e.delivery_date,
            verified: e.verified,
            empties_collected: e.empties_collected,
            payment_type: e.payment_type,
            payment_amount: e.payment_amount,
            payment_received_by: e.payment_received_by,
            created_utc: e.created_utc,
            updated_utc: e.updated_utc,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteDeliveryResponse {
    pub entry_id: Uuid,
    pub cascade_deleted: u64,
}

// -----------------------------------------------------------------------------
// Bills
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GenerateBillsRequest {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct BillResponse {
    pub bill_id: Uuid,
    pub customer_id: Uuid,
    pub bill_start_date: NaiveDate,
    pub bill_end_date: NaiveDate,
    pub last_month_remaining: i64,
    pub current_month_bill: i64,
    pub cylinders: i64,
    pub total_amount: i64,
    pub paid_amount: i64,
    pub remaining_amount: i64,
    pub status: String,
    pub invoiced: bool,
    pub created_utc: DateTime<Utc>,
}

impl BillResponse {
    pub fn from_parts(bill: Bill, totals: BillTotals, invoiced: bool) -> Self {
        Self {
            bill_id: bill.bill_id,
            customer_id: bill.customer_id,
            bill_start_date: bill.bill_start_date,
            bill_end_date: bill.bill_end_date,
            last_month_remaining: bill.last_month_remaining,
            current_month_bill: bill.current_month_bill,
            cylinders: bill.cylinders,
            total_amount: totals.total_amount,
            paid_amount: totals.paid_amount,
            remaining_amount: totals.remaining_amount,
            status: totals.status.as_str().to_string(),
            invoiced,
            created_utc: bill.created_utc,
        }
    }
}

impl From<BillSummary> for BillResponse {
    fn from(s: BillSummary) -> Self {
        BillResponse::from_parts(s.bill, s.totals, s.invoiced)
    }
}

#[derive(Debug, Serialize)]
pub struct BillDetailResponse {
    #[serde(flatten)]
    pub bill: BillResponse,
    pub payments: Vec<PaymentResponse>,
    pub invoice: Option<InvoiceResponse>,
}

impl From<BillWithPayments> for BillDetailResponse {
    fn from(b: BillWithPayments) -> Self {
        let invoiced = b.invoice.is_some();
        Self {
            bill: BillResponse::from_parts(b.bill, b.totals, invoiced),
            payments: b.payments.into_iter().map(PaymentResponse::from).collect(),
            invoice: b.invoice.map(InvoiceResponse::from),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GenerateBillsResponse {
    pub generated: Vec<BillResponse>,
    pub skipped_existing: usize,
    pub skipped_inactive: usize,
    pub failures: Vec<BillGenerationFailure>,
}

impl From<BillGenerationReport> for GenerateBillsResponse {
    fn from(r: BillGenerationReport) -> Self {
        Self {
            generated: r
                .generated
                .into_iter()
                .map(|bill| {
                    // Freshly generated bills have no payments yet.
                    let totals = crate::models::derive_totals(
                        bill.last_month_remaining,
                        bill.current_month_bill,
                        0,
                    );
                    BillResponse::from_parts(bill, totals, false)
                })
                .collect(),
            skipped_existing: r.skipped_existing,
            skipped_inactive: r.skipped_inactive,
            failures: r.failures,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ListBillsQuery {
    pub customer_id: Option<Uuid>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub page_size: Option<i32>,
    pub page_token: Option<Uuid>,
}

impl From<ListBillsQuery> for ListBillsFilter {
    fn from(q: ListBillsQuery) -> Self {
        Self {
            customer_id: q.customer_id,
            period_start: q.period_start,
            period_end: q.period_end,
            page_size: q.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            page_token: q.page_token,
        }
    }
}

// -----------------------------------------------------------------------------
// Payments and invoices
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    #[validate(range(min = 1))]
    pub amount: i64,
    pub paid_on: NaiveDate,
    #[validate(length(min = 1))]
    pub method: String,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub payment_id: Uuid,
    pub bill_id: Uuid,
    pub amount: i64,
    pub paid_on: NaiveDate,
    pub method: String,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            payment_id: p.payment_id,
            bill_id: p.bill_id,
            amount: p.amount,
            paid_on: p.paid_on,
            method: p.method,
            notes: p.notes,
            created_utc: p.created_utc,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub invoice_id: Uuid,
    pub bill_id: Uuid,
    pub invoice_number: String,
    pub generated_utc: DateTime<Utc>,
}

impl From<Invoice> for InvoiceResponse {
    fn from(i: Invoice) -> Self {
        Self {
            invoice_id: i.invoice_id,
            bill_id: i.bill_id,
            invoice_number: i.invoice_number,
            generated_utc: i.generated_utc,
        }
    }
}

// -----------------------------------------------------------------------------
// Audit trail
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
pub struct ListPaymentLogsQuery {
    pub customer_id: Option<Uuid>,
    pub bill_id: Option<Uuid>,
    pub kind: Option<String>,
    pub page_size: Option<i32>,
    pub page_token: Option<Uuid>,
}

impl ListPaymentLogsQuery {
    pub fn into_filter(self) -> Result<ListPaymentLogsFilter, AppError> {
        let kind = self
            .kind
            .as_deref()
            .map(|k| {
                PaymentEventKind::from_string(k).ok_or_else(|| {
                    AppError::BadRequest(anyhow::anyhow!("Unknown event kind '{}'", k))
                })
            })
            .transpose()?;
        Ok(ListPaymentLogsFilter {
            customer_id: self.customer_id,
            bill_id: self.bill_id,
            kind,
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            page_token: self.page_token,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentLogResponse {
    pub log_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub bill_id: Option<Uuid>,
    pub kind: String,
    pub amount: i64,
    pub details: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl From<PaymentLog> for PaymentLogResponse {
    fn from(l: PaymentLog) -> Self {
        Self {
            log_id: l.log_id,
            customer_id: l.customer_id,
            bill_id: l.bill_id,
            kind: l.kind,
            amount: l.amount,
            details: l.details,
            created_utc: l.created_utc,
        }
    }
}
