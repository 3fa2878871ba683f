//! HTTP handlers with multi-tenant support.
//!
//! Every handler resolves the caller's [`Principal`](crate::tenant::Principal)
//! from the tenant middleware and passes it explicitly into the engine.

pub mod admins;
pub mod bills;
pub mod customers;
pub mod deliveries;
pub mod invoices;
pub mod logs;
pub mod payments;
