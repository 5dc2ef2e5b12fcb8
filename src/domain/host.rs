//! Host inventory: the machines a cluster is made of.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::DomainError;
use super::id::{HostId, NodeId};

/// Cloud provider that owns a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudKind {
    Aws,
    Gcp,
}

impl CloudKind {
    /// Human-facing provider name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Aws => "AWS",
            Self::Gcp => "GCP",
        }
    }
}

impl fmt::Display for CloudKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aws => f.write_str("aws"),
            Self::Gcp => f.write_str("gcp"),
        }
    }
}

impl FromStr for CloudKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(Self::Aws),
            "gcp" | "gce" => Ok(Self::Gcp),
            other => Err(DomainError::UnknownCloud(other.to_string())),
        }
    }
}

/// Role a host plays in its cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostRole {
    /// Participates in consensus.
    Validator,
    /// Non-validating node exposing the public API.
    Api,
    /// Runs the metrics and log collection stack.
    Monitoring,
    /// Dedicated interchain relayer host.
    Relay,
}

impl HostRole {
    /// Whether the host runs a node client.
    #[must_use]
    pub const fn runs_node(self) -> bool {
        matches!(self, Self::Validator | Self::Api)
    }
}

impl fmt::Display for HostRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Validator => "validator",
            Self::Api => "api",
            Self::Monitoring => "monitoring",
            Self::Relay => "relay",
        };
        f.write_str(label)
    }
}

/// A provisioned machine and the credentials needed to reach it.
///
/// A host is created when its cloud instance exists and is mutated exactly
/// once afterwards, when its public address is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub cloud: CloudKind,
    pub region: String,
    #[serde(default)]
    pub address: Option<String>,
    pub ssh_user: String,
    pub ssh_key: PathBuf,
    pub role: HostRole,
    /// Node id, known once the node client has started and reported it.
    #[serde(default)]
    pub node_id: Option<NodeId>,
}

impl Host {
    /// The resolved public address.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::AddressUnresolved`] if the address has not been
    /// attached yet.
    pub fn require_address(&self) -> Result<&str, DomainError> {
        self.address
            .as_deref()
            .ok_or_else(|| DomainError::AddressUnresolved(self.id.clone()))
    }

    /// Attach the resolved public address.
    pub fn attach_address(&mut self, address: impl Into<String>) {
        self.address = Some(address.into());
    }

    /// Whether `needle` names this host by instance id, address or node id.
    #[must_use]
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.trim();
        self.id.as_str() == needle
            || self.address.as_deref() == Some(needle)
            || self.node_id.as_ref().is_some_and(|n| n.as_str() == needle)
    }
}

/// Validator hosts only, preserving order.
#[must_use]
pub fn validators(hosts: &[Host]) -> Vec<Host> {
    hosts
        .iter()
        .filter(|h| h.role == HostRole::Validator)
        .cloned()
        .collect()
}

/// Hosts that run a node client (validators and API hosts), preserving order.
#[must_use]
pub fn node_hosts(hosts: &[Host]) -> Vec<Host> {
    hosts.iter().filter(|h| h.role.runs_node()).cloned().collect()
}

/// Select hosts named by `filter`, in filter order.
///
/// An empty filter selects every host.
///
/// # Errors
///
/// Returns [`DomainError::HostNotFound`] for the first entry that names no host.
pub fn filter_hosts(hosts: &[Host], filter: &[String]) -> Result<Vec<Host>, DomainError> {
    if filter.is_empty() {
        return Ok(hosts.to_vec());
    }
    let mut selected: Vec<Host> = Vec::with_capacity(filter.len());
    for needle in filter {
        let host = hosts
            .iter()
            .find(|h| h.matches(needle))
            .ok_or_else(|| DomainError::HostNotFound(needle.clone()))?;
        if !selected.iter().any(|h| h.id == host.id) {
            selected.push(host.clone());
        }
    }
    Ok(selected)
}
