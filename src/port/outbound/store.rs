//! Persistence ports for cluster state and key material.

use std::path::PathBuf;

use crate::domain::cluster::{ClusterRegistry, ClusterState, NodeRecord};
use crate::domain::host::Host;
use crate::domain::id::HostId;
use crate::domain::keys::StakingKeys;
use crate::domain::subnet::SubnetDefinition;
use crate::error::{Error, Result};

/// Storage for the cluster registry, node records and subnet definitions.
///
/// Every write replaces the previous value atomically.
pub trait ClusterStore: Send + Sync {
    fn load_registry(&self) -> Result<ClusterRegistry>;

    fn save_registry(&self, registry: &ClusterRegistry) -> Result<()>;

    fn load_node(&self, id: &HostId) -> Result<Option<NodeRecord>>;

    fn save_node(&self, record: &NodeRecord) -> Result<()>;

    fn remove_node(&self, id: &HostId) -> Result<()>;

    fn load_subnet(&self, name: &str) -> Result<Option<SubnetDefinition>>;

    fn save_subnet(&self, definition: &SubnetDefinition) -> Result<()>;

    /// Read-modify-write a single cluster.
    fn save_cluster(&self, state: &ClusterState) -> Result<()> {
        let mut registry = self.load_registry()?;
        registry.upsert(state.clone());
        self.save_registry(&registry)
    }

    /// Load one cluster or fail with [`Error::ClusterNotFound`].
    fn load_cluster(&self, name: &str) -> Result<ClusterState> {
        self.load_registry()?
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ClusterNotFound(name.to_string()))
    }

    /// Join a cluster's host references with their node records.
    fn load_inventory(&self, state: &ClusterState) -> Result<Vec<Host>> {
        state
            .hosts
            .iter()
            .map(|r| {
                self.load_node(&r.id)?
                    .map(|record| record.to_host())
                    .ok_or_else(|| Error::State(format!("missing node record for {}", r.id)))
            })
            .collect()
    }
}

/// Storage for per-host staking keys.
pub trait KeyVault: Send + Sync {
    fn load(&self, host: &HostId) -> Result<Option<StakingKeys>>;

    fn store(&self, host: &HostId, keys: &StakingKeys) -> Result<()>;

    /// Local files to upload for `host`, with their remote file names.
    fn key_files(&self, host: &HostId) -> Result<Vec<(PathBuf, &'static str)>>;

    fn remove(&self, host: &HostId) -> Result<()>;
}
