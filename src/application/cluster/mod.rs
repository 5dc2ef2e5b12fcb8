//! Cluster lifecycle services.
//!
//! - [`service`]: multi-region creation with rollback, and teardown
//! - [`security`]: idempotent security group reconciliation

pub mod security;
pub mod service;
