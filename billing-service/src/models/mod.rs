//! Domain models for billing-service.

mod admin;
mod audit;
mod bill;
mod customer;
mod delivery;
mod invoice;
mod payment;

pub use admin::{Admin, CreateAdmin};
pub use audit::{ListPaymentLogsFilter, PaymentEventKind, PaymentLog};
pub use bill::{
    derive_totals, Bill, BillGenerationFailure, BillGenerationReport, BillStatus, BillSummary,
    BillTotals, BillWithPayments, ListBillsFilter,
};
pub use customer::{parse_customer_ref, CreateCustomer, Customer};
pub use delivery::{
    CreateDeliveryEntry, DeliveryEntry, EntryKind, ListDeliveriesFilter, UpdateDeliveryEntry,
};
pub use invoice::Invoice;
pub use payment::{CreatePayment, Payment};
