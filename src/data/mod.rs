//! Domain data model and event reconciliation.

pub mod models;
pub mod reconcile;
