//! Cluster orchestration.
//!
//! - [`wizard`]: the staged pipeline from an empty account to a validating subnet
//! - [`enrollment`]: node id discovery and validator enrollment
//! - [`relay`]: interchain relayer deployment
//! - [`settings`]: orchestrator settings resolved from configuration

pub mod enrollment;
pub mod relay;
pub mod settings;
pub mod wizard;
