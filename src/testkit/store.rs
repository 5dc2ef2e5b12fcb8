//! In-memory persistence.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::domain::cluster::{ClusterRegistry, NodeRecord};
use crate::domain::id::HostId;
use crate::domain::keys::StakingKeys;
use crate::domain::subnet::SubnetDefinition;
use crate::error::Result;
use crate::port::outbound::store::{ClusterStore, KeyVault};

/// [`ClusterStore`] backed by maps.
#[derive(Default)]
pub struct MemoryStore {
    registry: Mutex<ClusterRegistry>,
    nodes: Mutex<BTreeMap<HostId, NodeRecord>>,
    subnets: Mutex<BTreeMap<String, SubnetDefinition>>,
    registry_writes: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_ids(&self) -> Vec<HostId> {
        self.nodes.lock().keys().cloned().collect()
    }

    pub fn registry_writes(&self) -> u32 {
        self.registry_writes.load(Ordering::SeqCst)
    }
}

impl ClusterStore for MemoryStore {
    fn load_registry(&self) -> Result<ClusterRegistry> {
        Ok(self.registry.lock().clone())
    }

    fn save_registry(&self, registry: &ClusterRegistry) -> Result<()> {
        self.registry_writes.fetch_add(1, Ordering::SeqCst);
        *self.registry.lock() = registry.clone();
        Ok(())
    }

    fn load_node(&self, id: &HostId) -> Result<Option<NodeRecord>> {
        Ok(self.nodes.lock().get(id).cloned())
    }

    fn save_node(&self, record: &NodeRecord) -> Result<()> {
        self.nodes.lock().insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn remove_node(&self, id: &HostId) -> Result<()> {
        self.nodes.lock().remove(id);
        Ok(())
    }

    fn load_subnet(&self, name: &str) -> Result<Option<SubnetDefinition>> {
        Ok(self.subnets.lock().get(name).cloned())
    }

    fn save_subnet(&self, definition: &SubnetDefinition) -> Result<()> {
        self.subnets
            .lock()
            .insert(definition.name.clone(), definition.clone());
        Ok(())
    }
}

/// [`KeyVault`] backed by a map, with synthetic key file paths.
#[derive(Default)]
pub struct MemoryVault {
    keys: Mutex<BTreeMap<HostId, StakingKeys>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed key material, e.g. the same keys for two hosts.
    pub fn with_keys(self, host: &str, keys: StakingKeys) -> Self {
        self.keys.lock().insert(HostId::new(host), keys);
        self
    }

    pub fn holds(&self, host: &HostId) -> bool {
        self.keys.lock().contains_key(host)
    }

    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.lock().is_empty()
    }
}

impl KeyVault for MemoryVault {
    fn load(&self, host: &HostId) -> Result<Option<StakingKeys>> {
        Ok(self.keys.lock().get(host).cloned())
    }

    fn store(&self, host: &HostId, keys: &StakingKeys) -> Result<()> {
        self.keys.lock().insert(host.clone(), keys.clone());
        Ok(())
    }

    fn key_files(&self, host: &HostId) -> Result<Vec<(PathBuf, &'static str)>> {
        let dir = PathBuf::from("/vault").join(host.as_str());
        Ok(vec![
            (dir.join("signer.key"), "signer.key"),
            (dir.join("staker.key"), "staker.key"),
        ])
    }

    fn remove(&self, host: &HostId) -> Result<()> {
        self.keys.lock().remove(host);
        Ok(())
    }
}
