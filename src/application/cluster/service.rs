//! Cluster creation and teardown.
//!
//! Creation walks the requested regions in order. Nothing is persisted until
//! every region has its instances and addresses; if any step fails, or the
//! run is cancelled, the instances and reserved addresses made so far are
//! torn down again and the caller gets a [`RollbackReport`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{info, warn};

use super::security::reconcile_security_group;
use crate::application::cancel::CancelSignal;
use crate::application::context::StageContext;
use crate::domain::cluster::{ClusterSpec, ClusterState, NodeRecord, RegionPlan, RollbackReport};
use crate::domain::host::{CloudKind, Host, HostRole};
use crate::domain::id::HostId;
use crate::domain::report::DestroyReport;
use crate::domain::security::{required_rules, IngressRule, ServicePorts};
use crate::error::{ConfigError, Error, Result};
use crate::port::outbound::cloud::{CloudProvider, InstanceRequest, SecurityGroup, StaticAddress};
use crate::port::outbound::notifier::Event;
use crate::port::outbound::store::{ClusterStore, KeyVault};

/// Configured cloud backends, one per provider.
#[derive(Clone, Default)]
pub struct CloudSet {
    providers: BTreeMap<CloudKind, Arc<dyn CloudProvider>>,
}

impl CloudSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, provider: Arc<dyn CloudProvider>) -> Self {
        self.insert(provider);
        self
    }

    pub fn insert(&mut self, provider: Arc<dyn CloudProvider>) {
        self.providers.insert(provider.kind(), provider);
    }

    /// # Errors
    ///
    /// Returns a configuration error when no backend is set up for `kind`.
    pub fn get(&self, kind: CloudKind) -> Result<Arc<dyn CloudProvider>> {
        self.providers.get(&kind).cloned().ok_or_else(|| {
            Error::Config(ConfigError::Other(format!(
                "no {} provider is configured",
                kind.display_name()
            )))
        })
    }
}

/// Instance type and image used when a cluster spec does not override them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudDefaults {
    pub instance_type: String,
    pub image: String,
}

#[derive(Debug, Clone)]
pub struct ClusterSettings {
    pub ssh_user: String,
    pub security_group: String,
    pub key_pair: String,
    pub aws: CloudDefaults,
    pub gcp: CloudDefaults,
    pub ports: ServicePorts,
    /// Source range for operator-only ports.
    pub operator_cidr: String,
}

impl ClusterSettings {
    #[must_use]
    pub fn defaults(&self, kind: CloudKind) -> &CloudDefaults {
        match kind {
            CloudKind::Aws => &self.aws,
            CloudKind::Gcp => &self.gcp,
        }
    }

    #[must_use]
    pub fn required_rules(&self, public_api: bool) -> Vec<IngressRule> {
        required_rules(&self.ports, &self.operator_cidr, public_api)
    }
}

/// A cluster that was just created and persisted.
#[derive(Debug, Clone)]
pub struct CreatedCluster {
    pub state: ClusterState,
    pub hosts: Vec<Host>,
}

/// Cloud resources a creation run has made so far.
#[derive(Default)]
struct Launched {
    hosts: Vec<Host>,
    addresses: BTreeMap<HostId, StaticAddress>,
}

/// Creates and destroys clusters.
pub struct ClusterProvisioner {
    clouds: CloudSet,
    store: Arc<dyn ClusterStore>,
    vault: Arc<dyn KeyVault>,
    settings: ClusterSettings,
}

impl ClusterProvisioner {
    pub fn new(
        clouds: CloudSet,
        store: Arc<dyn ClusterStore>,
        vault: Arc<dyn KeyVault>,
        settings: ClusterSettings,
    ) -> Self {
        Self {
            clouds,
            store,
            vault,
            settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &ClusterSettings {
        &self.settings
    }

    #[must_use]
    pub fn clouds(&self) -> &CloudSet {
        &self.clouds
    }

    /// Create every instance in `spec`, resolve addresses and persist the
    /// cluster.
    ///
    /// # Errors
    ///
    /// - [`Error::Provisioning`] when a cloud step fails, with the rollback
    ///   outcome attached.
    /// - [`Error::Cancelled`] when cancelled; created instances are rolled
    ///   back first.
    pub async fn create(
        &self,
        ctx: &StageContext<'_>,
        name: &str,
        spec: &ClusterSpec,
    ) -> Result<CreatedCluster> {
        validate_spec(spec)?;
        if self.store.load_registry()?.contains(name) {
            return Err(Error::State(format!("cluster {name:?} already exists")));
        }
        let cloud = self.clouds.get(spec.cloud)?;

        let mut launched = Launched::default();
        match self.create_regions(ctx, cloud.as_ref(), name, spec, &mut launched).await {
            Ok(cluster) => Ok(cluster),
            Err(err) => {
                warn!(
                    cluster = name,
                    error = %err,
                    created = launched.hosts.len(),
                    addresses = launched.addresses.len(),
                    "Cluster creation failed, rolling back"
                );
                let rollback = rollback(ctx, &cloud, &launched).await;
                ctx.emit(Event::RollbackCompleted(rollback.clone()));
                if matches!(err, Error::Cancelled) {
                    return Err(Error::Cancelled);
                }
                Err(Error::Provisioning {
                    source: Box::new(err),
                    rollback,
                })
            }
        }
    }

    async fn create_regions(
        &self,
        ctx: &StageContext<'_>,
        cloud: &dyn CloudProvider,
        name: &str,
        spec: &ClusterSpec,
        launched: &mut Launched,
    ) -> Result<CreatedCluster> {
        let mut state = ClusterState::new(name, spec.network, ctx.clock.utc_now());
        let mut records = Vec::new();
        let required = self.settings.required_rules(spec.public_api);

        for (index, plan) in spec.regions.iter().enumerate() {
            ctx.cancel.check()?;
            let key_pair = cloud.ensure_key_pair(&plan.region, &self.settings.key_pair).await?;
            let (group, _) =
                reconcile_security_group(cloud, &plan.region, &self.settings.security_group, &required).await?;

            let first = launched.hosts.len();
            for (role, count) in batches(plan, index == 0 && spec.monitoring) {
                let request = self.instance_request(name, spec, plan, role, count, &group);
                let ids = cloud.create_instances(&request).await?;
                launched.hosts.extend(ids.iter().map(|id| Host {
                    id: id.clone(),
                    cloud: spec.cloud,
                    region: plan.region.clone(),
                    address: None,
                    ssh_user: self.settings.ssh_user.clone(),
                    ssh_key: key_pair.private_key.clone(),
                    role,
                    node_id: None,
                }));
                ctx.emit(Event::InstancesCreated {
                    region: plan.region.clone(),
                    count: ids.len(),
                });
                info!(cluster = name, region = %plan.region, role = %role, count = ids.len(), "Instances created");
            }
            ctx.cancel.check()?;

            let region_ids: Vec<HostId> = launched.hosts[first..].iter().map(|h| h.id.clone()).collect();
            let addresses = self
                .resolve_addresses(
                    cloud,
                    &plan.region,
                    &region_ids,
                    spec.static_addresses,
                    &mut launched.addresses,
                )
                .await?;
            for host in &mut launched.hosts[first..] {
                let address = addresses.get(&host.id).ok_or_else(|| Error::Cloud {
                    provider: spec.cloud,
                    message: format!("instance {} has no public address", host.id),
                })?;
                host.attach_address(address.clone());
                records.push(NodeRecord {
                    id: host.id.clone(),
                    cloud: spec.cloud,
                    region: plan.region.clone(),
                    image: spec.image.clone().unwrap_or_else(|| self.settings.defaults(spec.cloud).image.clone()),
                    instance_type: spec
                        .instance_type
                        .clone()
                        .unwrap_or_else(|| self.settings.defaults(spec.cloud).instance_type.clone()),
                    security_group: group.id.clone(),
                    address: host.address.clone(),
                    static_address: spec.static_addresses,
                    allocation_id: launched.addresses.get(&host.id).map(|a| a.allocation_id.clone()),
                    role: host.role,
                    ssh_user: host.ssh_user.clone(),
                    ssh_key: host.ssh_key.clone(),
                    node_id: None,
                });
            }
            state.add_region(&plan.region);
            state.key_pairs.insert(plan.region.clone(), key_pair);
        }

        ctx.cancel.check()?;
        for record in &records {
            self.store.save_node(record)?;
            state.add_host(record.id.clone(), record.role);
        }
        self.store.save_cluster(&state)?;
        info!(cluster = name, hosts = records.len(), "Cluster recorded");

        Ok(CreatedCluster {
            state,
            hosts: launched.hosts.clone(),
        })
    }

    fn instance_request(
        &self,
        cluster: &str,
        spec: &ClusterSpec,
        plan: &RegionPlan,
        role: HostRole,
        count: usize,
        group: &SecurityGroup,
    ) -> InstanceRequest {
        let defaults = self.settings.defaults(spec.cloud);
        InstanceRequest {
            cluster: cluster.to_string(),
            region: plan.region.clone(),
            role,
            count,
            instance_type: spec
                .instance_type
                .clone()
                .unwrap_or_else(|| defaults.instance_type.clone()),
            image: spec.image.clone().unwrap_or_else(|| defaults.image.clone()),
            key_pair: self.settings.key_pair.clone(),
            security_group: group.clone(),
        }
    }

    /// Public address per instance. Reserved addresses land in `allocated`
    /// as soon as they exist, so a failed association is still rolled back.
    async fn resolve_addresses(
        &self,
        cloud: &dyn CloudProvider,
        region: &str,
        ids: &[HostId],
        static_addresses: bool,
        allocated: &mut BTreeMap<HostId, StaticAddress>,
    ) -> Result<BTreeMap<HostId, String>> {
        if !static_addresses {
            return cloud.public_addresses(region, ids).await;
        }
        let mut addresses = BTreeMap::new();
        for id in ids {
            let address = cloud.allocate_static_address(region, id).await?;
            allocated.insert(id.clone(), address.clone());
            cloud.associate_address(region, id, &address).await?;
            addresses.insert(id.clone(), address.address);
        }
        Ok(addresses)
    }

    /// Destroy every instance of cluster `name`, release its reserved
    /// addresses and forget the hosts that are fully gone. A host whose
    /// address could not be released keeps its record so a later destroy
    /// retries. The cluster record is removed once no hosts remain.
    ///
    /// # Errors
    ///
    /// [`Error::ClusterNotFound`], [`Error::CredentialExpired`] when a
    /// provider rejected the credentials, or a store error.
    pub async fn destroy(&self, ctx: &StageContext<'_>, name: &str) -> Result<DestroyReport> {
        let mut state = self.store.load_cluster(name)?;
        let mut hosts = Vec::with_capacity(state.hosts.len());
        let mut addresses = BTreeMap::new();
        for host_ref in state.hosts.clone() {
            match self.store.load_node(&host_ref.id)? {
                Some(record) => {
                    if let Some(allocation_id) = &record.allocation_id {
                        addresses.insert(
                            record.id.clone(),
                            StaticAddress {
                                allocation_id: allocation_id.clone(),
                                address: record.address.clone().unwrap_or_default(),
                            },
                        );
                    }
                    hosts.push(record.to_host());
                }
                None => {
                    warn!(host = %host_ref.id, "No node record, treating as destroyed");
                    state.remove_host(&host_ref.id);
                }
            }
        }

        let clouds = self.clouds.clone();
        let addresses = Arc::new(addresses);
        let results = ctx
            .executor
            .run(
                &hosts,
                move |host| {
                    let clouds = clouds.clone();
                    let addresses = Arc::clone(&addresses);
                    async move {
                        let cloud = clouds.get(host.cloud)?;
                        teardown(cloud.as_ref(), &host, addresses.get(&host.id)).await
                    }
                },
                ctx.cancel,
            )
            .await?;
        let (destroyed, mut failed) = results.partition();

        let mut report = RollbackReport::default();
        for host in &hosts {
            if destroyed.contains_key(&host.id) {
                self.store.remove_node(&host.id)?;
                self.vault.remove(&host.id)?;
                state.remove_host(&host.id);
                report.destroyed.push(host.id.clone());
            }
        }

        let removed = state.hosts.is_empty();
        if removed {
            let mut registry = self.store.load_registry()?;
            registry.remove(name);
            self.store.save_registry(&registry)?;
        } else {
            self.store.save_cluster(&state)?;
        }
        info!(cluster = name, destroyed = report.destroyed.len(), failed = failed.len(), removed, "Cluster destroy finished");

        let expired = failed
            .iter()
            .find(|(_, e)| e.is_credential_expired())
            .map(|(id, _)| id.clone());
        if let Some(id) = expired {
            if let Some(err) = failed.remove(&id) {
                return Err(err);
            }
        }
        report.failed = failed.into_iter().map(|(id, e)| (id, e.to_string())).collect();
        Ok(DestroyReport::from((name.to_string(), report, removed)))
    }
}

fn validate_spec(spec: &ClusterSpec) -> Result<()> {
    if spec.regions.is_empty() {
        return Err(ConfigError::MissingField { field: "region" }.into());
    }
    let mut seen = BTreeSet::new();
    for plan in &spec.regions {
        if !seen.insert(plan.region.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "region",
                reason: format!("{} listed twice", plan.region),
            }
            .into());
        }
    }
    if spec.regions.iter().all(|r| r.validators == 0) {
        return Err(ConfigError::InvalidValue {
            field: "num_validators",
            reason: "at least one validator is required".into(),
        }
        .into());
    }
    Ok(())
}

fn batches(plan: &RegionPlan, monitoring: bool) -> Vec<(HostRole, usize)> {
    let mut batches = vec![(HostRole::Validator, plan.validators), (HostRole::Api, plan.apis)];
    if monitoring {
        batches.push((HostRole::Monitoring, 1));
    }
    batches.retain(|(_, count)| *count > 0);
    batches
}

/// Terminate one instance, then release its reserved address.
async fn teardown(cloud: &dyn CloudProvider, host: &Host, address: Option<&StaticAddress>) -> Result<()> {
    cloud.destroy_instance(&host.region, &host.id).await?;
    if let Some(address) = address {
        cloud.release_static_address(&host.region, address).await?;
    }
    Ok(())
}

/// Tear down everything in `launched` regardless of cancellation; every host
/// ends up in exactly one of the report's lists.
async fn rollback(ctx: &StageContext<'_>, cloud: &Arc<dyn CloudProvider>, launched: &Launched) -> RollbackReport {
    let mut report = RollbackReport::default();
    let created = launched.hosts.as_slice();
    if created.is_empty() {
        return report;
    }
    let never = CancelSignal::never();
    let cloud = Arc::clone(cloud);
    let addresses = Arc::new(launched.addresses.clone());
    let outcome = ctx
        .executor
        .run(
            created,
            move |host| {
                let cloud = Arc::clone(&cloud);
                let addresses = Arc::clone(&addresses);
                async move { teardown(cloud.as_ref(), &host, addresses.get(&host.id)).await }
            },
            &never,
        )
        .await;

    match outcome {
        Ok(results) => {
            let (_, failed) = results.partition();
            for host in created {
                match failed.get(&host.id) {
                    Some(err) => {
                        report.failed.insert(host.id.clone(), err.to_string());
                    }
                    None => report.destroyed.push(host.id.clone()),
                }
            }
        }
        Err(err) => {
            for host in created {
                report.failed.insert(host.id.clone(), err.to_string());
            }
        }
    }
    info!(destroyed = report.destroyed.len(), failed = report.failed.len(), "Rollback finished");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cluster::NetworkKind;

    fn spec(regions: Vec<RegionPlan>) -> ClusterSpec {
        ClusterSpec {
            cloud: CloudKind::Aws,
            network: NetworkKind::Devnet,
            regions,
            instance_type: None,
            image: None,
            monitoring: false,
            static_addresses: false,
            public_api: false,
        }
    }

    fn plan(region: &str, validators: usize, apis: usize) -> RegionPlan {
        RegionPlan {
            region: region.into(),
            validators,
            apis,
        }
    }

    #[test]
    fn spec_needs_regions_and_validators() {
        assert!(validate_spec(&spec(vec![])).is_err());
        assert!(validate_spec(&spec(vec![plan("a", 0, 2)])).is_err());
        assert!(validate_spec(&spec(vec![plan("a", 1, 0), plan("a", 1, 0)])).is_err());
        assert!(validate_spec(&spec(vec![plan("a", 1, 0), plan("b", 0, 1)])).is_ok());
    }

    #[test]
    fn batches_skip_empty_roles() {
        let roles: Vec<HostRole> = batches(&plan("a", 2, 0), true).into_iter().map(|(r, _)| r).collect();
        assert_eq!(roles, vec![HostRole::Validator, HostRole::Monitoring]);
    }
}
