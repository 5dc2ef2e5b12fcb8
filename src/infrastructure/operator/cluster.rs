//! Cluster operator implementation.

use async_trait::async_trait;
use tracing::info;

use crate::domain::cluster::ClusterState;
use crate::domain::host::{Host, HostRole};
use crate::domain::report::{CreateReport, DestroyReport, StageRunReport, WhitelistReport, WizardReport};
use crate::error::Result;
use crate::infrastructure::bootstrap;
use crate::port::inbound::operator::cluster::{
    ClusterDetail, ClusterOperator, ClusterSummary, CreateClusterRequest, DeploymentView,
    DestroyClusterRequest, HostView, SyncRequest, ValidateRequest, ValidationTarget,
    WhitelistRequest, WizardRequest,
};
use crate::port::outbound::notifier::{LogNotifier, Notifier, NotifierRegistry};
use crate::port::outbound::store::ClusterStore;

use super::entry::Operator;
use super::interrupt::watch_interrupt;

/// Caller's notifier plus structured logs.
fn fan_out(notifier: Box<dyn Notifier>) -> NotifierRegistry {
    let mut registry = NotifierRegistry::new();
    registry.register(notifier);
    registry.register(Box::new(LogNotifier));
    registry
}

fn summary(state: &ClusterState) -> ClusterSummary {
    ClusterSummary {
        name: state.name.clone(),
        network: state.network,
        hosts: state.hosts.len(),
        regions: state.regions.clone(),
        subnets: state.subnets.keys().cloned().collect(),
        created_at: state.created_at,
    }
}

/// Where a deployed chain's RPC is served: the first API host, else the
/// first validator.
fn rpc_server(hosts: &[Host]) -> Option<&Host> {
    hosts
        .iter()
        .find(|h| h.role == HostRole::Api)
        .or_else(|| hosts.iter().find(|h| h.role == HostRole::Validator))
}

#[async_trait]
impl ClusterOperator for Operator {
    async fn create_cluster(
        &self,
        request: CreateClusterRequest,
        notifier: Box<dyn Notifier>,
    ) -> Result<CreateReport> {
        let config = self.load_run_config(&request.config_toml)?;
        let wizard = bootstrap::build_wizard(&config).await?;
        let notifier = fan_out(notifier);
        let (_watch, cancel) = watch_interrupt();

        info!(cluster = %request.name, hosts = request.spec.instance_count(), "Creating cluster");
        wizard
            .create_cluster(&request.name, &request.spec, &notifier, &cancel)
            .await
    }

    async fn destroy_cluster(
        &self,
        request: DestroyClusterRequest,
        notifier: Box<dyn Notifier>,
    ) -> Result<DestroyReport> {
        let config = self.load_run_config(&request.config_toml)?;
        let wizard = bootstrap::build_without_lookup(&config)?;
        let notifier = fan_out(notifier);
        let (_watch, cancel) = watch_interrupt();

        info!(cluster = %request.name, "Destroying cluster");
        wizard.destroy_cluster(&request.name, &notifier, &cancel).await
    }

    fn list_clusters(&self, config_toml: &str) -> Result<Vec<ClusterSummary>> {
        let config = self.load_config(config_toml)?;
        let registry = bootstrap::build_store(&config).load_registry()?;
        Ok(registry.clusters.values().map(summary).collect())
    }

    fn describe_cluster(&self, config_toml: &str, name: &str) -> Result<ClusterDetail> {
        let config = self.load_config(config_toml)?;
        let store = bootstrap::build_store(&config);
        let state = store.load_cluster(name)?;
        let hosts = store.load_inventory(&state)?;

        let server = rpc_server(&hosts).and_then(|h| h.address.clone());
        let deployments = state
            .subnets
            .iter()
            .map(|(subnet, deployment)| DeploymentView {
                subnet: subnet.clone(),
                subnet_id: deployment.subnet_id.as_ref().map(ToString::to_string),
                blockchain_id: deployment.blockchain_id.as_ref().map(ToString::to_string),
                rpc_url: match (&server, &deployment.blockchain_id) {
                    (Some(address), Some(chain)) => Some(format!(
                        "http://{address}:{}/ext/bc/{chain}/rpc",
                        config.node.api_port
                    )),
                    _ => None,
                },
            })
            .collect();

        Ok(ClusterDetail {
            summary: summary(&state),
            hosts: hosts
                .into_iter()
                .map(|h| HostView {
                    id: h.id,
                    role: h.role,
                    cloud: h.cloud,
                    region: h.region,
                    address: h.address,
                    node_id: h.node_id.map(|n| n.to_string()),
                })
                .collect(),
            monitoring_host: state.monitoring_host.clone(),
            relay_host: state.relay_host.clone(),
            deployments,
        })
    }

    async fn run_wizard(
        &self,
        request: WizardRequest,
        notifier: Box<dyn Notifier>,
    ) -> Result<WizardReport> {
        let config = self.load_run_config(&request.config_toml)?;
        let wizard = bootstrap::build_wizard(&config).await?;
        let notifier = fan_out(notifier);
        let (_watch, cancel) = watch_interrupt();

        wizard.run(&request.plan, &notifier, &cancel).await
    }

    async fn whitelist(
        &self,
        request: WhitelistRequest,
        notifier: Box<dyn Notifier>,
    ) -> Result<WhitelistReport> {
        let config = self.load_run_config(&request.config_toml)?;
        let source = match request.source {
            Some(source) => source,
            None => bootstrap::operator_cidr(&config).await?,
        };
        let wizard = bootstrap::build_without_lookup(&config)?;
        let notifier = fan_out(notifier);
        let (_watch, cancel) = watch_interrupt();

        info!(cluster = %request.name, source = %source, "Whitelisting address");
        wizard.whitelist(&request.name, &source, &notifier, &cancel).await
    }

    async fn sync_subnet(
        &self,
        request: SyncRequest,
        notifier: Box<dyn Notifier>,
    ) -> Result<StageRunReport> {
        let config = self.load_run_config(&request.config_toml)?;
        let wizard = bootstrap::build_wizard(&config).await?;
        let notifier = fan_out(notifier);
        let (_watch, cancel) = watch_interrupt();

        wizard
            .sync_subnet(&request.name, &request.subnet, &notifier, &cancel)
            .await
    }

    async fn validate(
        &self,
        request: ValidateRequest,
        notifier: Box<dyn Notifier>,
    ) -> Result<StageRunReport> {
        let config = self.load_run_config(&request.config_toml)?;
        let wizard = bootstrap::build_wizard(&config).await?;
        let notifier = fan_out(notifier);
        let (_watch, cancel) = watch_interrupt();

        match &request.target {
            ValidationTarget::Primary => {
                wizard
                    .validate_primary(&request.name, &request.validators, &notifier, &cancel)
                    .await
            }
            ValidationTarget::Subnet(subnet) => {
                wizard
                    .validate_subnet(&request.name, subnet, &request.validators, &notifier, &cancel)
                    .await
            }
        }
    }
}
