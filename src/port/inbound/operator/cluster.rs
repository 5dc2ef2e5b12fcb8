//! Cluster lifecycle use-cases for operator-facing adapters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::cluster::{ClusterSpec, NetworkKind};
use crate::domain::host::{CloudKind, HostRole};
use crate::domain::id::HostId;
use crate::domain::report::{CreateReport, DestroyReport, StageRunReport, WhitelistReport, WizardReport};
use crate::domain::stage::WizardPlan;
use crate::error::Result;
use crate::port::outbound::notifier::Notifier;

/// Request to create a cluster without deploying anything onto it.
#[derive(Debug, Clone)]
pub struct CreateClusterRequest {
    /// Raw TOML configuration content.
    pub config_toml: String,
    pub name: String,
    pub spec: ClusterSpec,
}

#[derive(Debug, Clone)]
pub struct DestroyClusterRequest {
    /// Raw TOML configuration content.
    pub config_toml: String,
    pub name: String,
}

/// Request to run the full orchestrator.
#[derive(Debug, Clone)]
pub struct WizardRequest {
    /// Raw TOML configuration content.
    pub config_toml: String,
    pub plan: WizardPlan,
}

/// Request to open the cluster's security groups to another address.
#[derive(Debug, Clone)]
pub struct WhitelistRequest {
    /// Raw TOML configuration content.
    pub config_toml: String,
    pub name: String,
    /// Address or CIDR range; the operator's own address when absent.
    pub source: Option<String>,
}

/// Request to make a cluster's nodes track and sync a deployed subnet.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    /// Raw TOML configuration content.
    pub config_toml: String,
    pub name: String,
    pub subnet: String,
}

/// What the cluster's validators should validate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationTarget {
    Primary,
    Subnet(String),
}

#[derive(Debug, Clone)]
pub struct ValidateRequest {
    /// Raw TOML configuration content.
    pub config_toml: String,
    pub name: String,
    pub target: ValidationTarget,
    /// Hosts to enroll; all validators when empty.
    pub validators: Vec<String>,
}

/// One row of `cluster list`.
#[derive(Debug, Clone)]
pub struct ClusterSummary {
    pub name: String,
    pub network: NetworkKind,
    pub hosts: usize,
    pub regions: Vec<String>,
    pub subnets: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// One host in `cluster describe`.
#[derive(Debug, Clone)]
pub struct HostView {
    pub id: HostId,
    pub role: HostRole,
    pub cloud: CloudKind,
    pub region: String,
    pub address: Option<String>,
    pub node_id: Option<String>,
}

/// A subnet deployed onto the cluster.
#[derive(Debug, Clone)]
pub struct DeploymentView {
    pub subnet: String,
    pub subnet_id: Option<String>,
    pub blockchain_id: Option<String>,
    pub rpc_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClusterDetail {
    pub summary: ClusterSummary,
    pub hosts: Vec<HostView>,
    pub monitoring_host: Option<HostId>,
    pub relay_host: Option<HostId>,
    pub deployments: Vec<DeploymentView>,
}

/// Cluster use-cases.
///
/// Long-running calls report progress through the supplied notifier and stop
/// cleanly on Ctrl-C.
#[async_trait]
pub trait ClusterOperator: Send + Sync {
    async fn create_cluster(
        &self,
        request: CreateClusterRequest,
        notifier: Box<dyn Notifier>,
    ) -> Result<CreateReport>;

    async fn destroy_cluster(
        &self,
        request: DestroyClusterRequest,
        notifier: Box<dyn Notifier>,
    ) -> Result<DestroyReport>;

    fn list_clusters(&self, config_toml: &str) -> Result<Vec<ClusterSummary>>;

    fn describe_cluster(&self, config_toml: &str, name: &str) -> Result<ClusterDetail>;

    async fn run_wizard(
        &self,
        request: WizardRequest,
        notifier: Box<dyn Notifier>,
    ) -> Result<WizardReport>;

    async fn whitelist(
        &self,
        request: WhitelistRequest,
        notifier: Box<dyn Notifier>,
    ) -> Result<WhitelistReport>;

    async fn sync_subnet(
        &self,
        request: SyncRequest,
        notifier: Box<dyn Notifier>,
    ) -> Result<StageRunReport>;

    async fn validate(
        &self,
        request: ValidateRequest,
        notifier: Box<dyn Notifier>,
    ) -> Result<StageRunReport>;
}
