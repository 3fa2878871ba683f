//! Services module for billing-service.

pub mod database;
pub mod metrics;
pub mod sync;

pub use database::Database;
pub use metrics::{get_metrics, init_metrics};
pub use sync::{BillSync, LiveBillSync, NoopBillSync};
