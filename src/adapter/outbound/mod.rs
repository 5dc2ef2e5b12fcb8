//! Outbound adapters (driven side).

pub mod chain;
pub mod clock;
pub mod cloud;
pub mod file;
pub mod process;
pub mod ssh;
