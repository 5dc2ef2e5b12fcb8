//! Unified operator capability surface for inbound adapters.

use super::cluster::ClusterOperator;
use super::configuration::ConfigurationOperator;

/// Unified operator capability surface consumed by inbound adapters.
pub trait OperatorPort: ClusterOperator + ConfigurationOperator {}

impl<T> OperatorPort for T where T: ClusterOperator + ConfigurationOperator {}
