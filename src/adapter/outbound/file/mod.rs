//! State kept as files under the state directory.

pub mod cluster_store;
pub mod json;
pub mod key_vault;
