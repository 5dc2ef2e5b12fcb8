//! Operator implementations for inbound adapters.

pub mod cluster;
pub mod config;
pub mod entry;

mod interrupt;
