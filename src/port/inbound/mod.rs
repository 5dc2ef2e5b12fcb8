//! Inbound (driving) ports consumed by inbound adapters.
//!
//! - [`operator`]: operator-facing use cases for clusters and configuration

pub mod operator;
