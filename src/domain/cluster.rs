//! Persisted cluster state.
//!
//! A [`ClusterRegistry`] maps cluster names to [`ClusterState`]. Each host
//! additionally owns a [`NodeRecord`] file with its cloud identity. Joining the
//! two yields the cluster's host inventory.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::DomainError;
use super::host::{CloudKind, Host, HostRole};
use super::id::{BlockchainId, HostId, NodeId, SubnetId};

/// Current on-disk registry format.
pub const REGISTRY_VERSION: &str = "1";

/// Network a cluster's validators join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Mainnet,
    Testnet,
    #[default]
    Devnet,
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Devnet => "devnet",
        };
        f.write_str(label)
    }
}

impl FromStr for NetworkKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" | "fuji" => Ok(Self::Testnet),
            "devnet" => Ok(Self::Devnet),
            other => Err(DomainError::UnknownNetwork(other.to_string())),
        }
    }
}

/// Instances to create in one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionPlan {
    pub region: String,
    pub validators: usize,
    pub apis: usize,
}

/// Operator's description of a cluster to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSpec {
    pub cloud: CloudKind,
    pub network: NetworkKind,
    pub regions: Vec<RegionPlan>,
    /// Overrides the provider's configured instance type.
    pub instance_type: Option<String>,
    /// Overrides the provider's configured image.
    pub image: Option<String>,
    /// Create a dedicated monitoring host in the first region.
    pub monitoring: bool,
    pub static_addresses: bool,
    /// Open the node API port on API hosts to everyone.
    pub public_api: bool,
}

impl ClusterSpec {
    /// Number of instances the cluster spec asks for, monitoring host included.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        let nodes: usize = self.regions.iter().map(|r| r.validators + r.apis).sum();
        nodes + usize::from(self.monitoring)
    }
}

/// Reference from a cluster to one of its hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRef {
    pub id: HostId,
    pub role: HostRole,
}

/// Key pair used to reach hosts in one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    pub name: String,
    pub private_key: PathBuf,
}

/// Chain identifiers produced by deploying a subnet onto a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetDeployment {
    #[serde(default)]
    pub subnet_id: Option<SubnetId>,
    #[serde(default)]
    pub blockchain_id: Option<BlockchainId>,
}

impl SubnetDeployment {
    /// Both deployment transactions have been accepted.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.subnet_id.is_some() && self.blockchain_id.is_some()
    }
}

/// Everything the tool remembers about one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterState {
    pub name: String,
    pub network: NetworkKind,
    #[serde(default)]
    pub hosts: Vec<HostRef>,
    #[serde(default)]
    pub regions: Vec<String>,
    /// Region to key pair.
    #[serde(default)]
    pub key_pairs: BTreeMap<String, KeyPair>,
    #[serde(default)]
    pub monitoring_host: Option<HostId>,
    #[serde(default)]
    pub relay_host: Option<HostId>,
    /// Subnet name to deployment.
    #[serde(default)]
    pub subnets: BTreeMap<String, SubnetDeployment>,
    pub created_at: DateTime<Utc>,
}

impl ClusterState {
    #[must_use]
    pub fn new(name: impl Into<String>, network: NetworkKind, created_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            network,
            hosts: Vec::new(),
            regions: Vec::new(),
            key_pairs: BTreeMap::new(),
            monitoring_host: None,
            relay_host: None,
            subnets: BTreeMap::new(),
            created_at,
        }
    }

    /// Record a host, ignoring duplicates.
    pub fn add_host(&mut self, id: HostId, role: HostRole) {
        if !self.hosts.iter().any(|h| h.id == id) {
            if role == HostRole::Monitoring {
                self.monitoring_host = Some(id.clone());
            }
            self.hosts.push(HostRef { id, role });
        }
    }

    /// Record a region, ignoring duplicates.
    pub fn add_region(&mut self, region: &str) {
        if !self.regions.iter().any(|r| r == region) {
            self.regions.push(region.to_string());
        }
    }

    /// Forget a host and any references to it.
    pub fn remove_host(&mut self, id: &HostId) {
        self.hosts.retain(|h| &h.id != id);
        if self.monitoring_host.as_ref() == Some(id) {
            self.monitoring_host = None;
        }
        if self.relay_host.as_ref() == Some(id) {
            self.relay_host = None;
        }
    }

    #[must_use]
    pub fn host_ids(&self) -> Vec<HostId> {
        self.hosts.iter().map(|h| h.id.clone()).collect()
    }

    /// Ids of hosts with the given role, in insertion order.
    #[must_use]
    pub fn ids_with_role(&self, role: HostRole) -> Vec<HostId> {
        self.hosts
            .iter()
            .filter(|h| h.role == role)
            .map(|h| h.id.clone())
            .collect()
    }

    /// Deployment record for `subnet`, created empty on first access.
    pub fn deployment_mut(&mut self, subnet: &str) -> &mut SubnetDeployment {
        self.subnets.entry(subnet.to_string()).or_default()
    }

    /// Blockchain ids of every fully deployed subnet.
    #[must_use]
    pub fn deployed_blockchains(&self) -> Vec<(String, BlockchainId)> {
        self.subnets
            .iter()
            .filter_map(|(name, d)| d.blockchain_id.clone().map(|b| (name.clone(), b)))
            .collect()
    }

    /// Subnet ids the nodes should track.
    #[must_use]
    pub fn tracked_subnets(&self) -> Vec<SubnetId> {
        self.subnets
            .values()
            .filter_map(|d| d.subnet_id.clone())
            .collect()
    }
}

/// The persisted registry of all clusters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRegistry {
    pub version: String,
    #[serde(default)]
    pub clusters: BTreeMap<String, ClusterState>,
}

impl Default for ClusterRegistry {
    fn default() -> Self {
        Self {
            version: REGISTRY_VERSION.to_string(),
            clusters: BTreeMap::new(),
        }
    }
}

impl ClusterRegistry {
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.clusters.contains_key(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ClusterState> {
        self.clusters.get(name)
    }

    pub fn upsert(&mut self, state: ClusterState) {
        self.clusters.insert(state.name.clone(), state);
    }

    pub fn remove(&mut self, name: &str) -> Option<ClusterState> {
        self.clusters.remove(name)
    }
}

/// Per-host persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: HostId,
    pub cloud: CloudKind,
    pub region: String,
    pub image: String,
    pub instance_type: String,
    pub security_group: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub static_address: bool,
    /// Provider id of the reserved address, released on teardown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocation_id: Option<String>,
    pub role: HostRole,
    pub ssh_user: String,
    pub ssh_key: PathBuf,
    #[serde(default)]
    pub node_id: Option<NodeId>,
}

impl NodeRecord {
    /// Build the runtime host view of this record.
    #[must_use]
    pub fn to_host(&self) -> Host {
        Host {
            id: self.id.clone(),
            cloud: self.cloud,
            region: self.region.clone(),
            address: self.address.clone(),
            ssh_user: self.ssh_user.clone(),
            ssh_key: self.ssh_key.clone(),
            role: self.role,
            node_id: self.node_id.clone(),
        }
    }
}

/// Outcome of tearing down the instances a failed run created.
///
/// Every instance handed to rollback ends up in exactly one of the two lists.
/// An instance counts as destroyed only once its reserved address, if any,
/// is released too.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    pub destroyed: Vec<HostId>,
    /// Instances, or their reserved addresses, that could not be removed and
    /// need manual cleanup.
    pub failed: BTreeMap<HostId, String>,
}

impl RollbackReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.destroyed.len() + self.failed.len()
    }
}

impl fmt::Display for RollbackReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rolled back {} instance(s)", self.destroyed.len())?;
        if !self.failed.is_empty() {
            let leaked: Vec<_> = self.failed.keys().map(HostId::as_str).collect();
            write!(f, ", could not destroy: {}", leaked.join(", "))?;
        }
        Ok(())
    }
}
