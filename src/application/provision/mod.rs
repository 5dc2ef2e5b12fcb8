//! Host provisioning.
//!
//! - [`pipeline`]: staged per-host provisioning with failure isolation
//! - [`scripts`]: remote commands and rendered service files

pub mod pipeline;
pub mod scripts;
