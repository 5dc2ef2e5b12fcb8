//! The cluster orchestrator.
//!
//! A run walks the stages below in order. Every stage first looks at
//! persisted state and skips what is already done, so re-running a failed
//! or interrupted command resumes where it stopped.
//!
//! ```text
//! S0 subnet defined      S4 blockchain deployed
//! S1 cluster ready       S5 primary validators
//! S2 healthy             S6 subnet tracking (+ health, syncing gates)
//! S3 rpc compatible      S7 subnet validators (+ validating gate)
//! S3b bootstrapped       S8 relayer
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};
use uuid::Uuid;

use super::enrollment::{discover_node_ids, enroll, EnrollmentOutcome, Membership};
use super::relay::RelayDeployer;
use super::settings::OrchestratorSettings;
use crate::application::cancel::CancelSignal;
use crate::application::checks::{ChainStatus, NodeProbe};
use crate::application::cluster::security::reconcile_security_group;
use crate::application::cluster::service::{CloudSet, ClusterProvisioner};
use crate::application::context::StageContext;
use crate::application::executor::ParallelExecutor;
use crate::application::poll::poll_until;
use crate::application::provision::pipeline::{run_all, ProvisionTarget, ProvisioningPipeline};
use crate::application::provision::scripts::{self, RelayedChain};
use crate::domain::cluster::{ClusterSpec, ClusterState, NetworkKind};
use crate::domain::gate::{Readiness, StageGate};
use crate::domain::host::{filter_hosts, validators, CloudKind, Host, HostRole};
use crate::domain::id::{BlockchainId, SubnetId};
use crate::domain::report::{
    CreateReport, DestroyReport, ProvisionReport, StageRunReport, WhitelistReport, WizardReport,
};
use crate::domain::security::{is_cidr, normalize_cidr, operator_rules};
use crate::domain::stage::{StageOutcome, StageRecord, WizardPlan, WizardStage};
use crate::domain::subnet::SubnetDefinition;
use crate::error::{ConfigError, Error, Result};
use crate::port::outbound::chain::{ChainClient, ChainEndpoint};
use crate::port::outbound::clock::Clock;
use crate::port::outbound::notifier::{Event, Notifier};
use crate::port::outbound::remote::RemoteExecutor;
use crate::port::outbound::store::{ClusterStore, KeyVault};

/// Outbound collaborators.
#[derive(Clone)]
pub struct Services {
    pub clouds: CloudSet,
    pub remote: Arc<dyn RemoteExecutor>,
    pub chain: Arc<dyn ChainClient>,
    pub store: Arc<dyn ClusterStore>,
    pub vault: Arc<dyn KeyVault>,
    pub clock: Arc<dyn Clock>,
}

/// Drives clusters from nothing to validating a subnet.
pub struct Wizard {
    services: Services,
    settings: OrchestratorSettings,
    executor: ParallelExecutor,
    provisioner: ClusterProvisioner,
    pipeline: ProvisioningPipeline,
}

impl Wizard {
    pub fn new(services: Services, settings: OrchestratorSettings) -> Self {
        let executor = ParallelExecutor::new(settings.max_concurrency);
        let provisioner = ClusterProvisioner::new(
            services.clouds.clone(),
            Arc::clone(&services.store),
            Arc::clone(&services.vault),
            settings.cluster.clone(),
        );
        let pipeline = ProvisioningPipeline::new(
            Arc::clone(&services.remote),
            Arc::clone(&services.vault),
            settings.provision.clone(),
        );
        Self {
            services,
            settings,
            executor,
            provisioner,
            pipeline,
        }
    }

    #[must_use]
    pub fn store(&self) -> &dyn ClusterStore {
        self.services.store.as_ref()
    }

    fn context<'a>(&'a self, notifier: &'a dyn Notifier, cancel: &'a CancelSignal) -> StageContext<'a> {
        StageContext::new(&self.executor, self.services.clock.as_ref(), cancel, notifier)
    }

    fn probe(&self) -> NodeProbe {
        NodeProbe::new(
            Arc::clone(&self.services.remote),
            self.settings.provision.node.api_port,
            self.settings.provision.command_timeout,
        )
    }

    /// Create a cluster and provision its hosts.
    pub async fn create_cluster(
        &self,
        name: &str,
        spec: &ClusterSpec,
        notifier: &dyn Notifier,
        cancel: &CancelSignal,
    ) -> Result<CreateReport> {
        let ctx = self.context(notifier, cancel);
        let (hosts, provision) = self.create_and_provision(&ctx, name, spec).await?;
        Ok(CreateReport {
            cluster: name.to_string(),
            hosts: hosts.into_iter().map(|h| h.id).collect(),
            provision,
        })
    }

    pub async fn destroy_cluster(
        &self,
        name: &str,
        notifier: &dyn Notifier,
        cancel: &CancelSignal,
    ) -> Result<DestroyReport> {
        let ctx = self.context(notifier, cancel);
        self.provisioner.destroy(&ctx, name).await
    }

    /// Give `source` the operator's access to every security group the
    /// cluster's hosts sit in. Rules already present are left alone.
    ///
    /// # Errors
    ///
    /// A configuration error when `source` is not an address or CIDR range,
    /// [`Error::ClusterNotFound`], or a provider error.
    pub async fn whitelist(
        &self,
        name: &str,
        source: &str,
        notifier: &dyn Notifier,
        cancel: &CancelSignal,
    ) -> Result<WhitelistReport> {
        if !is_cidr(source) {
            return Err(ConfigError::InvalidValue {
                field: "ip",
                reason: format!("`{source}` is not an address or CIDR range"),
            }
            .into());
        }
        let ctx = self.context(notifier, cancel);
        let (_, hosts) = self.open_cluster(name)?;
        if hosts.is_empty() {
            return Err(Error::State(format!("cluster {name} has no hosts")));
        }

        let cidr = normalize_cidr(source);
        let rules = operator_rules(&self.settings.cluster.ports, &cidr);
        let regions: BTreeSet<(CloudKind, String)> =
            hosts.iter().map(|h| (h.cloud, h.region.clone())).collect();
        let group = &self.settings.cluster.security_group;
        let mut added = BTreeMap::new();
        for (kind, region) in regions {
            ctx.cancel.check()?;
            let cloud = self.services.clouds.get(kind)?;
            let (_, reconciled) =
                reconcile_security_group(cloud.as_ref(), &region, group, &rules).await?;
            added.insert(region, reconciled.added);
        }

        let report = WhitelistReport {
            cluster: name.to_string(),
            cidr,
            added,
        };
        info!(cluster = name, cidr = %report.cidr, added = report.rules_added(), "Whitelist applied");
        Ok(report)
    }

    /// Run S2, S3b and S5 against an existing cluster.
    pub async fn validate_primary(
        &self,
        name: &str,
        filter: &[String],
        notifier: &dyn Notifier,
        cancel: &CancelSignal,
    ) -> Result<StageRunReport> {
        let ctx = self.context(notifier, cancel);
        let (state, mut hosts) = self.open_cluster(name)?;
        let targets = filter_hosts(&validators(&hosts), filter)?;
        let gates = self.settings.gates;
        let mut report = stage_run(name, None);

        let started = begin(&ctx, WizardStage::Healthy);
        self.gate(&ctx, &gates.health, &targets, health_check).await?;
        report.stages.push(record(&ctx, WizardStage::Healthy, started, StageOutcome::Completed));

        let started = begin(&ctx, WizardStage::Bootstrapped);
        self.gate(&ctx, &gates.bootstrapped, &targets, bootstrapped_check).await?;
        report.stages.push(record(&ctx, WizardStage::Bootstrapped, started, StageOutcome::Completed));

        let endpoint = self.endpoint(state.network, &hosts)?;
        let started = begin(&ctx, WizardStage::PrimaryValidators);
        let (_, enrolled) = self.enroll_primary(&ctx, &endpoint, &mut hosts, filter).await?;
        let outcome = if enrolled.enrolled.is_empty() {
            skipped("all hosts validate the primary network")
        } else {
            StageOutcome::Completed
        };
        report.stages.push(record(&ctx, WizardStage::PrimaryValidators, started, outcome));
        report.enrolled = enrolled.enrolled;
        Ok(report)
    }

    /// Run S6 against an existing cluster: every node tracks `subnet` and
    /// the chain syncs everywhere.
    pub async fn sync_subnet(
        &self,
        name: &str,
        subnet: &str,
        notifier: &dyn Notifier,
        cancel: &CancelSignal,
    ) -> Result<StageRunReport> {
        let ctx = self.context(notifier, cancel);
        let (state, hosts) = self.open_cluster(name)?;
        let (_, blockchain_id) = deployed_ids(&state, subnet)?;
        let mut report = stage_run(name, Some(subnet));

        let started = begin(&ctx, WizardStage::SubnetTracking);
        let tracking = trackers(&hosts, &validators(&hosts));
        let outcome = self.track_subnet(&ctx, &state, &tracking, &blockchain_id).await?;
        report.stages.push(record(&ctx, WizardStage::SubnetTracking, started, outcome));
        Ok(report)
    }

    /// Run S7 against an existing cluster. The selected validators must
    /// already sync `subnet`; otherwise the syncing gate times out.
    pub async fn validate_subnet(
        &self,
        name: &str,
        subnet: &str,
        filter: &[String],
        notifier: &dyn Notifier,
        cancel: &CancelSignal,
    ) -> Result<StageRunReport> {
        let ctx = self.context(notifier, cancel);
        let (state, mut hosts) = self.open_cluster(name)?;
        let (subnet_id, blockchain_id) = deployed_ids(&state, subnet)?;
        let endpoint = self.endpoint(state.network, &hosts)?;
        let mut report = stage_run(name, Some(subnet));

        let started = begin(&ctx, WizardStage::SubnetValidators);
        discover_node_ids(&ctx, &self.probe(), self.services.store.as_ref(), &mut hosts).await?;
        let targets = filter_hosts(&validators(&hosts), filter)?;
        self.syncing_gate(&ctx, &targets, &blockchain_id).await?;
        let enrolled = self
            .enroll_subnet(&ctx, &endpoint, &subnet_id, &blockchain_id, &targets)
            .await?;
        let outcome = if enrolled.enrolled.is_empty() {
            skipped("all hosts validate the subnet")
        } else {
            StageOutcome::Completed
        };
        report.stages.push(record(&ctx, WizardStage::SubnetValidators, started, outcome));
        report.enrolled = enrolled.enrolled;
        Ok(report)
    }

    /// Persisted state and inventory of an existing cluster.
    fn open_cluster(&self, name: &str) -> Result<(ClusterState, Vec<Host>)> {
        let state = self.services.store.load_cluster(name)?;
        let hosts = self.services.store.load_inventory(&state)?;
        Ok((state, hosts))
    }

    async fn create_and_provision(
        &self,
        ctx: &StageContext<'_>,
        name: &str,
        spec: &ClusterSpec,
    ) -> Result<(Vec<Host>, ProvisionReport)> {
        let created = self.provisioner.create(ctx, name, spec).await?;
        let target = ProvisionTarget::from_inventory(&created.hosts, spec.network);
        let provision = self.pipeline.run(ctx, &target).await?;
        if !provision.is_complete() {
            warn!(cluster = name, summary = %provision.summary(), "Some hosts failed provisioning");
        }
        Ok((created.hosts, provision))
    }

    /// Run the full pipeline for `plan`.
    ///
    /// # Errors
    ///
    /// The first stage that cannot complete ends the run: a gate timeout,
    /// an incompatible RPC version, host failures during enrollment or
    /// tracking, a provisioning failure with its rollback, or cancellation.
    pub async fn run(
        &self,
        plan: &WizardPlan,
        notifier: &dyn Notifier,
        cancel: &CancelSignal,
    ) -> Result<WizardReport> {
        let ctx = self.context(notifier, cancel);
        let run_id = Uuid::new_v4().to_string();
        info!(run_id = %run_id, cluster = %plan.cluster, "Wizard run started");

        let mut report = WizardReport {
            run_id,
            cluster: plan.cluster.clone(),
            created: false,
            provision: None,
            stages: Vec::new(),
            subnet: plan.subnet.as_ref().map(|s| s.name.clone()),
            rpc_url: None,
            relay_host: None,
        };

        let existing = self.services.store.load_registry()?.get(&plan.cluster).cloned();
        if let Some(state) = &existing {
            if plan.subnet.is_none() {
                return Err(Error::MissingSubnet(plan.cluster.clone()));
            }
            if state.network != plan.spec.network {
                return Err(Error::NetworkMismatch {
                    cluster: plan.cluster.clone(),
                    stored: state.network,
                    requested: plan.spec.network,
                });
            }
        }

        let definition = self.define_subnet(&ctx, plan, &mut report)?;

        let started = begin(&ctx, WizardStage::ClusterReady);
        let (mut state, mut hosts) = match existing {
            Some(state) => {
                let hosts = self.services.store.load_inventory(&state)?;
                finish(&ctx, &mut report, WizardStage::ClusterReady, started, skipped("cluster exists"));
                (state, hosts)
            }
            None => {
                let (hosts, provision) = self.create_and_provision(&ctx, &plan.cluster, &plan.spec).await?;
                report.created = true;
                report.provision = Some(provision);
                finish(&ctx, &mut report, WizardStage::ClusterReady, started, StageOutcome::Completed);
                (self.services.store.load_cluster(&plan.cluster)?, hosts)
            }
        };

        let mut targets = filter_hosts(&validators(&hosts), &plan.validators)?;

        let gates = self.settings.gates;
        let started = begin(&ctx, WizardStage::Healthy);
        self.gate(&ctx, &gates.health, &targets, health_check).await?;
        finish(&ctx, &mut report, WizardStage::Healthy, started, StageOutcome::Completed);

        let Some(definition) = definition else {
            info!(cluster = %plan.cluster, "Cluster is ready");
            return Ok(report);
        };

        let started = begin(&ctx, WizardStage::RpcCompatible);
        self.rpc_gate(&ctx, &definition, &targets).await?;
        finish(&ctx, &mut report, WizardStage::RpcCompatible, started, StageOutcome::Completed);

        let started = begin(&ctx, WizardStage::Bootstrapped);
        self.gate(&ctx, &gates.bootstrapped, &targets, bootstrapped_check).await?;
        finish(&ctx, &mut report, WizardStage::Bootstrapped, started, StageOutcome::Completed);

        let endpoint = self.endpoint(state.network, &hosts)?;

        let started = begin(&ctx, WizardStage::BlockchainDeployed);
        let outcome = self.deploy_blockchain(&ctx, &mut state, &endpoint, &definition).await?;
        finish(&ctx, &mut report, WizardStage::BlockchainDeployed, started, outcome);
        let (subnet_id, blockchain_id) = deployed_ids(&state, &definition.name)?;
        report.rpc_url = Some(self.rpc_url(&hosts, &blockchain_id)?);

        let started = begin(&ctx, WizardStage::PrimaryValidators);
        let (selected, enrolled) = self
            .enroll_primary(&ctx, &endpoint, &mut hosts, &plan.validators)
            .await?;
        targets = selected;
        let outcome = if enrolled.enrolled.is_empty() {
            skipped("all hosts validate the primary network")
        } else {
            StageOutcome::Completed
        };
        finish(&ctx, &mut report, WizardStage::PrimaryValidators, started, outcome);

        let started = begin(&ctx, WizardStage::SubnetTracking);
        let tracking = trackers(&hosts, &targets);
        let outcome = self.track_subnet(&ctx, &state, &tracking, &blockchain_id).await?;
        finish(&ctx, &mut report, WizardStage::SubnetTracking, started, outcome);

        let started = begin(&ctx, WizardStage::SubnetValidators);
        let enrolled = self
            .enroll_subnet(&ctx, &endpoint, &subnet_id, &blockchain_id, &targets)
            .await?;
        let outcome = if enrolled.enrolled.is_empty() {
            skipped("all hosts validate the subnet")
        } else {
            StageOutcome::Completed
        };
        finish(&ctx, &mut report, WizardStage::SubnetValidators, started, outcome);

        let started = begin(&ctx, WizardStage::Relayer);
        let outcome = if !plan.relayer {
            StageOutcome::NotRequested
        } else if !definition.relay_ready {
            skipped("subnet is not relay-ready")
        } else {
            let relayed = self.relayed_chains(&state, &hosts)?;
            let deployer = RelayDeployer {
                clouds: &self.services.clouds,
                remote: Arc::clone(&self.services.remote),
                chain: self.services.chain.as_ref(),
                store: self.services.store.as_ref(),
                settings: &self.settings.relayer,
                security_group: &self.settings.cluster.security_group,
                api_port: self.settings.provision.node.api_port,
                command_timeout: self.settings.provision.command_timeout,
            };
            let relay = deployer
                .deploy(&mut state, &hosts, &endpoint, &blockchain_id, &relayed)
                .await?;
            report.relay_host = Some(relay);
            StageOutcome::Completed
        };
        finish(&ctx, &mut report, WizardStage::Relayer, started, outcome);

        info!(
            run_id = %report.run_id,
            cluster = %plan.cluster,
            subnet = %definition.name,
            "Subnet is validating"
        );
        Ok(report)
    }

    /// S0: store the subnet definition unless one exists already.
    fn define_subnet(
        &self,
        ctx: &StageContext<'_>,
        plan: &WizardPlan,
        report: &mut WizardReport,
    ) -> Result<Option<SubnetDefinition>> {
        let started = begin(ctx, WizardStage::SubnetDefined);
        let Some(spec) = &plan.subnet else {
            finish(ctx, report, WizardStage::SubnetDefined, started, StageOutcome::NotRequested);
            return Ok(None);
        };
        if !plan.force_subnet_define {
            if let Some(existing) = self.services.store.load_subnet(&spec.name)? {
                finish(ctx, report, WizardStage::SubnetDefined, started, skipped("subnet already defined"));
                return Ok(Some(existing));
            }
        }
        let definition = spec.define(ctx.clock.utc_now());
        self.services.store.save_subnet(&definition)?;
        info!(subnet = %definition.name, vm = ?definition.vm, "Subnet defined");
        finish(ctx, report, WizardStage::SubnetDefined, started, StageOutcome::Completed);
        Ok(Some(definition))
    }

    async fn gate<F, Fut>(
        &self,
        ctx: &StageContext<'_>,
        gate: &StageGate,
        hosts: &[Host],
        check: F,
    ) -> Result<()>
    where
        F: Fn(NodeProbe, Host) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Readiness>> + Send + 'static,
    {
        let probe = self.probe();
        poll_until(ctx, hosts, gate, move |host| check(probe.clone(), host))
            .await?
            .into_result(gate)
    }

    /// S3: a version mismatch is permanent, so the gate reports
    /// [`Error::VersionIncompatible`] instead of a timeout.
    async fn rpc_gate(&self, ctx: &StageContext<'_>, definition: &SubnetDefinition, hosts: &[Host]) -> Result<()> {
        let required = definition.rpc_version;
        let probe = self.probe();
        let gate = self.settings.gates.rpc_compatibility;
        let outcome = poll_until(ctx, hosts, &gate, move |host| {
            let probe = probe.clone();
            async move {
                let version = probe.rpc_version(&host).await?;
                Ok(Readiness::when(version == required, || {
                    format!("node speaks RPC version {version}")
                }))
            }
        })
        .await?;
        if outcome.is_satisfied() {
            return Ok(());
        }
        Err(Error::VersionIncompatible {
            subnet: definition.name.clone(),
            required,
            hosts: outcome.failing,
        })
    }

    /// S4: issue whichever of the two deployment transactions is missing,
    /// persisting each id as soon as it is known.
    async fn deploy_blockchain(
        &self,
        ctx: &StageContext<'_>,
        state: &mut ClusterState,
        endpoint: &ChainEndpoint,
        definition: &SubnetDefinition,
    ) -> Result<StageOutcome> {
        let name = definition.name.as_str();
        if state.subnets.get(name).is_some_and(|d| d.is_complete()) {
            return Ok(skipped("blockchain already deployed"));
        }
        let chain = self.services.chain.as_ref();

        let subnet_id = match state.deployment_mut(name).subnet_id.clone() {
            Some(id) => id,
            None => {
                ctx.cancel.check()?;
                let id = chain.create_subnet(endpoint, definition).await?;
                state.deployment_mut(name).subnet_id = Some(id.clone());
                self.services.store.save_cluster(state)?;
                info!(subnet = name, subnet_id = %id, "Subnet created");
                id
            }
        };

        ctx.cancel.check()?;
        let blockchain_id = chain.create_blockchain(endpoint, &subnet_id, definition).await?;
        state.deployment_mut(name).blockchain_id = Some(blockchain_id.clone());
        self.services.store.save_cluster(state)?;
        info!(subnet = name, blockchain_id = %blockchain_id, "Blockchain created");
        Ok(StageOutcome::Completed)
    }

    /// S6: make every node track the cluster's subnets, then wait until the
    /// new chain is syncing everywhere.
    async fn track_subnet(
        &self,
        ctx: &StageContext<'_>,
        state: &ClusterState,
        hosts: &[Host],
        blockchain: &BlockchainId,
    ) -> Result<StageOutcome> {
        let probe = self.probe();
        let remote = Arc::clone(&self.services.remote);
        let timeout = self.settings.provision.command_timeout;
        let chain = blockchain.clone();
        let config = scripts::node_config(state.network, &state.tracked_subnets());
        let results = ctx
            .executor
            .run(
                hosts,
                move |host| {
                    let probe = probe.clone();
                    let remote = Arc::clone(&remote);
                    let chain = chain.clone();
                    let commands = [
                        scripts::write_file(scripts::NODE_CONFIG, &config),
                        scripts::compose_restart(scripts::NODE_COMPOSE),
                    ];
                    async move {
                        if let Ok(status) = probe.blockchain_status(&host, &chain).await {
                            if status.is_tracking() {
                                return Ok(false);
                            }
                        }
                        run_all(remote.as_ref(), &host, &commands, timeout).await?;
                        Ok(true)
                    }
                },
                ctx.cancel,
            )
            .await?;

        if results.has_errors() {
            let failures = results.errors_by_host();
            for (host, reason) in &failures {
                ctx.emit(Event::HostFailed {
                    host: host.clone(),
                    stage: WizardStage::SubnetTracking.to_string(),
                    reason: reason.clone(),
                });
            }
            return Err(Error::HostFailures {
                stage: WizardStage::SubnetTracking.to_string(),
                failures,
            });
        }
        let restarted = results.successes().values().filter(|r| **r).count();
        info!(restarted, hosts = hosts.len(), "Subnet tracking configured");

        let gates = self.settings.gates;
        if restarted > 0 {
            self.gate(ctx, &gates.health, hosts, health_check).await?;
        }
        self.syncing_gate(ctx, hosts, blockchain).await?;

        if restarted == 0 {
            return Ok(skipped("all hosts already track the subnet"));
        }
        Ok(StageOutcome::Completed)
    }

    /// S5: learn node ids, then enroll the selected validators in the
    /// primary network. Returns the selected hosts with their node ids.
    async fn enroll_primary(
        &self,
        ctx: &StageContext<'_>,
        endpoint: &ChainEndpoint,
        hosts: &mut [Host],
        filter: &[String],
    ) -> Result<(Vec<Host>, EnrollmentOutcome)> {
        discover_node_ids(ctx, &self.probe(), self.services.store.as_ref(), hosts).await?;
        let targets = filter_hosts(&validators(hosts), filter)?;
        let policy = self.settings.enrollment.primary_policy(endpoint.network);
        let enrolled = enroll(
            ctx,
            self.services.chain.as_ref(),
            endpoint,
            Membership::Primary,
            &targets,
            &policy,
        )
        .await?;
        Ok((targets, enrolled))
    }

    /// S7: enroll `targets` as subnet validators, then wait until each one
    /// reports validating the chain.
    async fn enroll_subnet(
        &self,
        ctx: &StageContext<'_>,
        endpoint: &ChainEndpoint,
        subnet: &SubnetId,
        blockchain: &BlockchainId,
        targets: &[Host],
    ) -> Result<EnrollmentOutcome> {
        let policy = self.settings.enrollment.subnet_policy();
        let enrolled = enroll(
            ctx,
            self.services.chain.as_ref(),
            endpoint,
            Membership::Subnet(subnet),
            targets,
            &policy,
        )
        .await?;
        let chain = blockchain.clone();
        self.gate(ctx, &self.settings.gates.subnet_validating, targets, move |probe, host| {
            let chain = chain.clone();
            async move {
                let status = probe.blockchain_status(&host, &chain).await?;
                Ok(Readiness::when(status == ChainStatus::Validating, || {
                    format!("blockchain status {status}")
                }))
            }
        })
        .await?;
        Ok(enrolled)
    }

    async fn syncing_gate(&self, ctx: &StageContext<'_>, hosts: &[Host], blockchain: &BlockchainId) -> Result<()> {
        let chain = blockchain.clone();
        self.gate(ctx, &self.settings.gates.subnet_syncing, hosts, move |probe, host| {
            let chain = chain.clone();
            async move {
                let status = probe.blockchain_status(&host, &chain).await?;
                Ok(Readiness::when(status.is_tracking(), || format!("blockchain status {status}")))
            }
        })
        .await
    }

    fn endpoint(&self, network: NetworkKind, hosts: &[Host]) -> Result<ChainEndpoint> {
        let url = match network {
            NetworkKind::Mainnet => self.settings.chain.mainnet_url.clone(),
            NetworkKind::Testnet => self.settings.chain.testnet_url.clone(),
            NetworkKind::Devnet => {
                let first = validators(hosts)
                    .into_iter()
                    .next()
                    .ok_or_else(|| Error::State("cluster has no validators".into()))?;
                format!(
                    "http://{}:{}",
                    first.require_address()?,
                    self.settings.provision.node.api_port
                )
            }
        };
        Ok(ChainEndpoint { network, url })
    }

    /// Public RPC URL of `blockchain`, served by the first API host or, when
    /// there is none, the first validator.
    fn rpc_url(&self, hosts: &[Host], blockchain: &BlockchainId) -> Result<String> {
        let server = hosts
            .iter()
            .find(|h| h.role == HostRole::Api)
            .or_else(|| hosts.iter().find(|h| h.role == HostRole::Validator))
            .ok_or_else(|| Error::State("cluster has no node hosts".into()))?;
        Ok(format!(
            "http://{}:{}/ext/bc/{blockchain}/rpc",
            server.require_address()?,
            self.settings.provision.node.api_port
        ))
    }

    /// Every relay-ready chain deployed on the cluster.
    fn relayed_chains(&self, state: &ClusterState, hosts: &[Host]) -> Result<Vec<RelayedChain>> {
        let mut chains = Vec::new();
        for (name, deployment) in &state.subnets {
            let (Some(subnet_id), Some(blockchain_id)) = (&deployment.subnet_id, &deployment.blockchain_id) else {
                continue;
            };
            let relay_ready = self
                .services
                .store
                .load_subnet(name)?
                .is_some_and(|d| d.relay_ready);
            if relay_ready {
                chains.push(RelayedChain {
                    subnet_id: subnet_id.clone(),
                    blockchain_id: blockchain_id.clone(),
                    rpc_url: self.rpc_url(hosts, blockchain_id)?,
                });
            }
        }
        Ok(chains)
    }
}

fn health_check(probe: NodeProbe, host: Host) -> impl Future<Output = Result<Readiness>> + Send {
    async move {
        let healthy = probe.health(&host).await?;
        Ok(Readiness::when(healthy, || "node reports unhealthy".into()))
    }
}

fn bootstrapped_check(probe: NodeProbe, host: Host) -> impl Future<Output = Result<Readiness>> + Send {
    async move {
        let done = probe.bootstrapped(&host).await?;
        Ok(Readiness::when(done, || "platform chain still bootstrapping".into()))
    }
}

/// Validators being validated plus every API host.
fn trackers(hosts: &[Host], targets: &[Host]) -> Vec<Host> {
    let mut out = targets.to_vec();
    out.extend(hosts.iter().filter(|h| h.role == HostRole::Api).cloned());
    out
}

fn deployed_ids(state: &ClusterState, subnet: &str) -> Result<(SubnetId, BlockchainId)> {
    state
        .subnets
        .get(subnet)
        .and_then(|d| Some((d.subnet_id.clone()?, d.blockchain_id.clone()?)))
        .ok_or_else(|| Error::State(format!("subnet {subnet} has no deployment record")))
}

fn skipped(reason: &str) -> StageOutcome {
    StageOutcome::Skipped(reason.to_string())
}

fn begin(ctx: &StageContext<'_>, stage: WizardStage) -> Instant {
    ctx.emit(Event::StageStarted(stage));
    ctx.clock.now()
}

fn record(ctx: &StageContext<'_>, stage: WizardStage, started: Instant, outcome: StageOutcome) -> StageRecord {
    let record = StageRecord {
        stage,
        outcome,
        elapsed: ctx.clock.now().saturating_duration_since(started),
    };
    ctx.emit(Event::StageFinished(record.clone()));
    record
}

fn finish(
    ctx: &StageContext<'_>,
    report: &mut WizardReport,
    stage: WizardStage,
    started: Instant,
    outcome: StageOutcome,
) {
    report.stages.push(record(ctx, stage, started, outcome));
}

fn stage_run(cluster: &str, subnet: Option<&str>) -> StageRunReport {
    StageRunReport {
        cluster: cluster.to_string(),
        subnet: subnet.map(str::to_string),
        stages: Vec::new(),
        enrolled: Vec::new(),
    }
}
