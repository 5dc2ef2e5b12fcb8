//! [`ClusterStore`] as JSON files.
//!
//! Layout under the state directory:
//!
//! ```text
//! clusters.json         registry of every cluster
//! nodes/<host>.json     one record per host
//! subnets/<name>.json   subnet definitions
//! ```

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::json;
use crate::domain::cluster::{ClusterRegistry, NodeRecord, REGISTRY_VERSION};
use crate::domain::id::HostId;
use crate::domain::subnet::SubnetDefinition;
use crate::error::{Error, Result};
use crate::port::outbound::store::ClusterStore;

/// File-backed cluster state.
#[derive(Debug)]
pub struct FileClusterStore {
    root: PathBuf,
    /// Serialises registry writes from concurrent tasks in this process.
    registry_lock: Mutex<()>,
}

impl FileClusterStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            registry_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn registry_path(&self) -> PathBuf {
        self.root.join("clusters.json")
    }

    fn node_path(&self, id: &HostId) -> PathBuf {
        self.root.join("nodes").join(format!("{}.json", file_name(id.as_str())))
    }

    fn subnet_path(&self, name: &str) -> PathBuf {
        self.root.join("subnets").join(format!("{}.json", file_name(name)))
    }
}

/// Ids and names come from providers and operators; keep them inside their
/// directory.
fn file_name(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

impl ClusterStore for FileClusterStore {
    fn load_registry(&self) -> Result<ClusterRegistry> {
        let path = self.registry_path();
        let Some(registry) = json::read::<ClusterRegistry>(&path)? else {
            return Ok(ClusterRegistry::default());
        };
        if registry.version != REGISTRY_VERSION {
            return Err(Error::State(format!(
                "{} has format version {}, this build reads version {REGISTRY_VERSION}",
                path.display(),
                registry.version
            )));
        }
        Ok(registry)
    }

    fn save_registry(&self, registry: &ClusterRegistry) -> Result<()> {
        let _guard = self.registry_lock.lock();
        json::write(&self.registry_path(), registry)
    }

    fn load_node(&self, id: &HostId) -> Result<Option<NodeRecord>> {
        json::read(&self.node_path(id))
    }

    fn save_node(&self, record: &NodeRecord) -> Result<()> {
        json::write(&self.node_path(&record.id), record)
    }

    fn remove_node(&self, id: &HostId) -> Result<()> {
        json::remove(&self.node_path(id))
    }

    fn load_subnet(&self, name: &str) -> Result<Option<SubnetDefinition>> {
        json::read(&self.subnet_path(name))
    }

    fn save_subnet(&self, definition: &SubnetDefinition) -> Result<()> {
        json::write(&self.subnet_path(&definition.name), definition)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::cluster::{ClusterState, NetworkKind};
    use crate::domain::host::{CloudKind, HostRole};

    fn record(id: &str) -> NodeRecord {
        NodeRecord {
            id: HostId::new(id),
            cloud: CloudKind::Aws,
            region: "us-east-1".into(),
            image: "ami-1".into(),
            instance_type: "c5.2xlarge".into(),
            security_group: "nodewiz".into(),
            address: Some("3.3.3.3".into()),
            static_address: false,
            allocation_id: None,
            role: HostRole::Validator,
            ssh_user: "ubuntu".into(),
            ssh_key: PathBuf::from("/k.pem"),
            node_id: None,
        }
    }

    #[test]
    fn empty_directory_reads_as_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileClusterStore::new(dir.path());
        assert!(store.load_registry().unwrap().clusters.is_empty());
        assert!(store.load_node(&HostId::new("i-1")).unwrap().is_none());
    }

    #[test]
    fn cluster_and_inventory_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = ClusterState::new("alpha", NetworkKind::Devnet, Utc::now());
        state.add_host(HostId::new("i-1"), HostRole::Validator);
        {
            let store = FileClusterStore::new(dir.path());
            store.save_node(&record("i-1")).unwrap();
            store.save_cluster(&state).unwrap();
        }

        let store = FileClusterStore::new(dir.path());
        let loaded = store.load_cluster("alpha").unwrap();
        assert_eq!(loaded, state);
        let hosts = store.load_inventory(&loaded).unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].address.as_deref(), Some("3.3.3.3"));
    }

    #[test]
    fn removed_node_leaves_inventory_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileClusterStore::new(dir.path());
        let mut state = ClusterState::new("alpha", NetworkKind::Devnet, Utc::now());
        state.add_host(HostId::new("i-1"), HostRole::Validator);
        store.save_node(&record("i-1")).unwrap();
        store.remove_node(&HostId::new("i-1")).unwrap();

        assert!(matches!(store.load_inventory(&state), Err(Error::State(_))));
    }

    #[test]
    fn unknown_registry_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clusters.json"), r#"{"version":"99","clusters":{}}"#).unwrap();
        let store = FileClusterStore::new(dir.path());
        assert!(matches!(store.load_registry(), Err(Error::State(_))));
    }

    #[test]
    fn file_names_stay_inside_their_directory() {
        assert_eq!(file_name("../etc/passwd"), "_etc_passwd");
        assert_eq!(file_name("i-0abc"), "i-0abc");
    }
}
