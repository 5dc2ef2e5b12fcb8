//! Application services (use cases).
//!
//! These services sequence domain logic and drive the outbound ports. They
//! never touch a concrete adapter.

pub mod cancel;
pub mod checks;
pub mod cluster;
pub mod context;
pub mod executor;
pub mod orchestration;
pub mod poll;
pub mod provision;
