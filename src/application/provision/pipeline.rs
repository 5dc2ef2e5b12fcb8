//! Per-host provisioning pipeline.
//!
//! Hosts move through [`ProvisionStage`]s in order. Each stage fans out over
//! the hosts still in the pipeline; a host that fails a stage is recorded
//! with that stage and dropped, and the rest carry on.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::OsRng;
use tracing::{info, warn};

use super::scripts::{self, MonitoringSettings, NodeSettings};
use crate::application::context::StageContext;
use crate::domain::cluster::NetworkKind;
use crate::domain::error::DomainError;
use crate::domain::host::{Host, HostRole};
use crate::domain::id::{HostId, SubnetId};
use crate::domain::keys::{ensure_unique, StakingKeys};
use crate::domain::report::{ProvisionReport, ProvisionStage, StageFailure};
use crate::error::{Error, Result};
use crate::port::outbound::notifier::Event;
use crate::port::outbound::remote::{CopyDirection, RemoteExecutor};
use crate::port::outbound::store::KeyVault;

/// Timeouts and node settings used while provisioning.
#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    pub ssh_port: u16,
    /// How long to wait for a fresh instance's SSH port.
    pub reachability_timeout: Duration,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub node: NodeSettings,
    pub monitoring: MonitoringSettings,
}

/// Hosts to provision and what to configure on them.
#[derive(Debug, Clone)]
pub struct ProvisionTarget {
    /// Node hosts (validators and API hosts).
    pub hosts: Vec<Host>,
    pub monitoring: Option<Host>,
    pub network: NetworkKind,
    /// Subnets the node config should track from the start.
    pub tracked: Vec<SubnetId>,
}

impl ProvisionTarget {
    /// Split a cluster inventory into node hosts and the monitoring host.
    #[must_use]
    pub fn from_inventory(hosts: &[Host], network: NetworkKind) -> Self {
        Self {
            hosts: hosts.iter().filter(|h| h.role.runs_node()).cloned().collect(),
            monitoring: hosts.iter().find(|h| h.role == HostRole::Monitoring).cloned(),
            network,
            tracked: Vec::new(),
        }
    }
}

/// Brings freshly created hosts to a running node.
pub struct ProvisioningPipeline {
    remote: Arc<dyn RemoteExecutor>,
    vault: Arc<dyn KeyVault>,
    settings: ProvisionSettings,
}

impl ProvisioningPipeline {
    pub fn new(
        remote: Arc<dyn RemoteExecutor>,
        vault: Arc<dyn KeyVault>,
        settings: ProvisionSettings,
    ) -> Self {
        Self {
            remote,
            vault,
            settings,
        }
    }

    /// Provision every host in `target`.
    ///
    /// Per-host failures are collected in the report, which always accounts
    /// for every host exactly once.
    ///
    /// # Errors
    ///
    /// Only [`Error::Cancelled`].
    pub async fn run(&self, ctx: &StageContext<'_>, target: &ProvisionTarget) -> Result<ProvisionReport> {
        let mut report = ProvisionReport::default();
        let mut all = target.hosts.clone();
        all.extend(target.monitoring.iter().cloned());

        let alive = self.reachable(ctx, all, &mut report).await?;
        let (nodes, monitoring): (Vec<Host>, Vec<Host>) = alive.into_iter().partition(|h| {
            target
                .monitoring
                .as_ref()
                .map_or(true, |m| m.id != h.id)
        });

        let nodes = self.credentialed(ctx, nodes, &mut report).await?;
        let nodes = self.install_node(ctx, nodes, target, &mut report).await?;
        let monitoring = self.install_monitoring(ctx, monitoring, &nodes, &mut report).await?;
        let nodes = match monitoring.first() {
            Some(monitor) => self.monitored(ctx, nodes, monitor, &mut report).await?,
            None => nodes,
        };
        let nodes = self.running(ctx, nodes, &mut report).await?;

        let running: BTreeSet<&HostId> = nodes.iter().chain(&monitoring).map(|h| &h.id).collect();
        report.running = target
            .hosts
            .iter()
            .chain(target.monitoring.iter())
            .filter(|h| running.contains(&h.id))
            .map(|h| h.id.clone())
            .collect();

        ctx.emit(Event::ProvisionSummary {
            running: report.running.len(),
            total: report.total(),
        });
        info!(summary = %report.summary(), "Provisioning finished");
        Ok(report)
    }

    async fn reachable(
        &self,
        ctx: &StageContext<'_>,
        hosts: Vec<Host>,
        report: &mut ProvisionReport,
    ) -> Result<Vec<Host>> {
        let remote = Arc::clone(&self.remote);
        let port = self.settings.ssh_port;
        let wait = self.settings.reachability_timeout;
        let connect = self.settings.connect_timeout;
        run_stage(ctx, ProvisionStage::Reachable, hosts, report, move |host| {
            let remote = Arc::clone(&remote);
            async move {
                remote.wait_for_port(&host, port, wait).await?;
                remote.connect(&host, connect).await
            }
        })
        .await
    }

    async fn credentialed(
        &self,
        ctx: &StageContext<'_>,
        hosts: Vec<Host>,
        report: &mut ProvisionReport,
    ) -> Result<Vec<Host>> {
        let mut keys: BTreeMap<HostId, StakingKeys> = BTreeMap::new();
        let mut hosts_with_keys = Vec::with_capacity(hosts.len());
        for host in hosts {
            match self.load_or_generate(&host.id) {
                Ok(material) => {
                    keys.insert(host.id.clone(), material);
                    hosts_with_keys.push(host);
                }
                Err(e) => fail(ctx, report, &host.id, ProvisionStage::Credentialed, &e),
            }
        }

        while let Err(DomainError::DuplicateKeyMaterial { first, second }) = ensure_unique(keys.iter()) {
            let err = Error::Domain(DomainError::DuplicateKeyMaterial {
                first: first.clone(),
                second: second.clone(),
            });
            for id in [first, second] {
                keys.remove(&id);
                fail(ctx, report, &id, ProvisionStage::Credentialed, &err);
            }
        }
        hosts_with_keys.retain(|h| keys.contains_key(&h.id));

        let remote = Arc::clone(&self.remote);
        let vault = Arc::clone(&self.vault);
        let timeout = self.settings.command_timeout;
        run_stage(ctx, ProvisionStage::Credentialed, hosts_with_keys, report, move |host| {
            let remote = Arc::clone(&remote);
            let vault = Arc::clone(&vault);
            async move {
                remote.run_command(&host, &scripts::prepare_dirs(), timeout).await?;
                for (local, name) in vault.key_files(&host.id)? {
                    let target = format!("{}/{name}", scripts::STAKING_DIR);
                    remote
                        .copy_file(&host, &local, &target, CopyDirection::Upload, timeout)
                        .await?;
                }
                Ok(())
            }
        })
        .await
    }

    fn load_or_generate(&self, host: &HostId) -> Result<StakingKeys> {
        if let Some(existing) = self.vault.load(host)? {
            return Ok(existing);
        }
        let keys = StakingKeys::generate(&mut OsRng);
        self.vault.store(host, &keys)?;
        info!(host = %host, fingerprint = %keys.fingerprint(), "Generated staking keys");
        Ok(keys)
    }

    async fn install_node(
        &self,
        ctx: &StageContext<'_>,
        hosts: Vec<Host>,
        target: &ProvisionTarget,
        report: &mut ProvisionReport,
    ) -> Result<Vec<Host>> {
        let remote = Arc::clone(&self.remote);
        let timeout = self.settings.command_timeout;
        let node = self.settings.node.clone();
        let config = scripts::node_config(target.network, &target.tracked);
        run_stage(ctx, ProvisionStage::SoftwareInstalled, hosts, report, move |host| {
            let remote = Arc::clone(&remote);
            let commands = [
                scripts::install_runtime(),
                scripts::pull_image(&node.image, &node.version),
                scripts::write_file(scripts::NODE_CONFIG, &config),
                scripts::write_file(scripts::NODE_COMPOSE, &scripts::node_compose(&node)),
            ];
            async move { run_all(remote.as_ref(), &host, &commands, timeout).await }
        })
        .await
    }

    async fn install_monitoring(
        &self,
        ctx: &StageContext<'_>,
        hosts: Vec<Host>,
        nodes: &[Host],
        report: &mut ProvisionReport,
    ) -> Result<Vec<Host>> {
        if hosts.is_empty() {
            return Ok(hosts);
        }
        let addresses: Vec<String> = nodes.iter().filter_map(|h| h.address.clone()).collect();
        let targets = scripts::monitoring_targets(&addresses, &self.settings.node, &self.settings.monitoring);
        let compose = scripts::monitoring_compose(&self.settings.monitoring);
        let remote = Arc::clone(&self.remote);
        let timeout = self.settings.command_timeout;
        run_stage(ctx, ProvisionStage::MonitoringStack, hosts, report, move |host| {
            let remote = Arc::clone(&remote);
            let commands = [
                scripts::install_runtime(),
                scripts::prepare_dirs(),
                scripts::write_file(scripts::MONITORING_TARGETS, &targets),
                scripts::write_file(scripts::MONITORING_COMPOSE, &compose),
                scripts::compose_up(scripts::MONITORING_COMPOSE),
            ];
            async move { run_all(remote.as_ref(), &host, &commands, timeout).await }
        })
        .await
    }

    async fn monitored(
        &self,
        ctx: &StageContext<'_>,
        hosts: Vec<Host>,
        monitor: &Host,
        report: &mut ProvisionReport,
    ) -> Result<Vec<Host>> {
        let monitor_address = match monitor.require_address() {
            Ok(address) => address.to_string(),
            Err(e) => {
                warn!(error = %e, "Skipping monitoring agents");
                return Ok(hosts);
            }
        };
        let logs_port = self.settings.monitoring.logs_port;
        let compose = scripts::agent_compose(&self.settings.monitoring);
        let remote = Arc::clone(&self.remote);
        let timeout = self.settings.command_timeout;
        run_stage(ctx, ProvisionStage::Monitored, hosts, report, move |host| {
            let remote = Arc::clone(&remote);
            let commands = [
                scripts::write_file(
                    scripts::AGENT_CONFIG,
                    &scripts::agent_config(&monitor_address, logs_port, host.id.as_str()),
                ),
                scripts::write_file(scripts::AGENT_COMPOSE, &compose),
                scripts::compose_up(scripts::AGENT_COMPOSE),
            ];
            async move { run_all(remote.as_ref(), &host, &commands, timeout).await }
        })
        .await
    }

    async fn running(
        &self,
        ctx: &StageContext<'_>,
        hosts: Vec<Host>,
        report: &mut ProvisionReport,
    ) -> Result<Vec<Host>> {
        let remote = Arc::clone(&self.remote);
        let timeout = self.settings.command_timeout;
        run_stage(ctx, ProvisionStage::Running, hosts, report, move |host| {
            let remote = Arc::clone(&remote);
            async move {
                remote
                    .run_command(&host, &scripts::compose_up(scripts::NODE_COMPOSE), timeout)
                    .await
                    .map(drop)
            }
        })
        .await
    }
}

/// Run `commands` in order on one host, stopping at the first failure.
pub(crate) async fn run_all(
    remote: &dyn RemoteExecutor,
    host: &Host,
    commands: &[String],
    timeout: Duration,
) -> Result<()> {
    for command in commands {
        remote.run_command(host, command, timeout).await?;
    }
    Ok(())
}

/// Fan `op` out over `hosts` and keep the ones that succeeded, in order.
async fn run_stage<F, Fut>(
    ctx: &StageContext<'_>,
    stage: ProvisionStage,
    hosts: Vec<Host>,
    report: &mut ProvisionReport,
    op: F,
) -> Result<Vec<Host>>
where
    F: Fn(Host) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    if hosts.is_empty() {
        return Ok(hosts);
    }
    let (_, failed) = ctx.executor.run(&hosts, op, ctx.cancel).await?.partition();
    for (id, err) in &failed {
        fail(ctx, report, id, stage, err);
    }
    Ok(hosts.into_iter().filter(|h| !failed.contains_key(&h.id)).collect())
}

fn fail(ctx: &StageContext<'_>, report: &mut ProvisionReport, host: &HostId, stage: ProvisionStage, err: &Error) {
    warn!(host = %host, stage = %stage, error = %err, "Host dropped from provisioning");
    ctx.emit(Event::HostFailed {
        host: host.clone(),
        stage: stage.to_string(),
        reason: err.to_string(),
    });
    report.failed.insert(
        host.clone(),
        StageFailure {
            stage,
            error: err.to_string(),
        },
    );
}
