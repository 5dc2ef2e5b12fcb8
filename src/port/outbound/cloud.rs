//! Cloud provider port.
//!
//! One implementation per provider. All calls are scoped to a region; the
//! orchestrator never assumes a provider-global view.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::domain::cluster::KeyPair;
use crate::domain::host::{CloudKind, HostRole};
use crate::domain::id::HostId;
use crate::domain::security::IngressRule;
use crate::error::Result;

/// Instances to launch in one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRequest {
    pub cluster: String,
    pub region: String,
    pub role: HostRole,
    pub count: usize,
    pub instance_type: String,
    pub image: String,
    pub key_pair: String,
    pub security_group: SecurityGroup,
}

/// A provider firewall group and its current inbound rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroup {
    pub id: String,
    pub name: String,
    pub rules: Vec<IngressRule>,
}

/// A reserved public address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticAddress {
    pub allocation_id: String,
    pub address: String,
}

/// Provider operations the orchestrator needs.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    fn kind(&self) -> CloudKind;

    /// Create the key pair if missing and return where its private key lives.
    async fn ensure_key_pair(&self, region: &str, name: &str) -> Result<KeyPair>;

    /// Fetch the group, creating it empty if it does not exist.
    async fn ensure_security_group(&self, region: &str, name: &str) -> Result<SecurityGroup>;

    /// Add inbound rules to a group. Rules already present are not an error.
    async fn authorize_ingress(
        &self,
        region: &str,
        group: &SecurityGroup,
        rules: &[IngressRule],
    ) -> Result<()>;

    /// Launch instances and wait until they are running.
    async fn create_instances(&self, request: &InstanceRequest) -> Result<Vec<HostId>>;

    /// Current public address per instance. Instances without one are omitted.
    async fn public_addresses(
        &self,
        region: &str,
        ids: &[HostId],
    ) -> Result<BTreeMap<HostId, String>>;

    async fn allocate_static_address(&self, region: &str, host: &HostId) -> Result<StaticAddress>;

    async fn associate_address(
        &self,
        region: &str,
        host: &HostId,
        address: &StaticAddress,
    ) -> Result<()>;

    /// Terminate one instance. An instance that no longer exists counts as
    /// destroyed.
    async fn destroy_instance(&self, region: &str, host: &HostId) -> Result<()>;

    /// Give a reserved address back. An allocation that no longer exists
    /// counts as released.
    async fn release_static_address(&self, region: &str, address: &StaticAddress) -> Result<()>;
}
