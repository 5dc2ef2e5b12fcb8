//! In-memory cloud provider.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::cluster::KeyPair;
use crate::domain::host::{CloudKind, HostRole};
use crate::domain::id::HostId;
use crate::domain::security::IngressRule;
use crate::error::{Error, Result};
use crate::port::outbound::cloud::{CloudProvider, InstanceRequest, SecurityGroup, StaticAddress};

#[derive(Debug, Clone)]
struct Instance {
    region: String,
    role: HostRole,
    address: String,
}

#[derive(Default)]
struct Inner {
    next: u32,
    instances: BTreeMap<HostId, Instance>,
    created: Vec<HostId>,
    destroyed: Vec<HostId>,
    groups: BTreeMap<(String, String), SecurityGroup>,
    allocations: u32,
    /// Reserved addresses by allocation id.
    addresses: BTreeMap<String, String>,
}

/// Scripted [`CloudProvider`].
///
/// Instances get sequential ids and addresses. Failures can be injected per
/// region, per instance, or for every call (expired credentials).
pub struct FakeCloud {
    kind: CloudKind,
    inner: Mutex<Inner>,
    failing_regions: BTreeSet<String>,
    undestroyable: BTreeSet<HostId>,
    unassociable: BTreeSet<HostId>,
    unreleasable: BTreeSet<HostId>,
    expired: bool,
    create_calls: AtomicU32,
    authorize_calls: AtomicU32,
}

impl FakeCloud {
    pub fn new(kind: CloudKind) -> Self {
        Self {
            kind,
            inner: Mutex::new(Inner::default()),
            failing_regions: BTreeSet::new(),
            undestroyable: BTreeSet::new(),
            unassociable: BTreeSet::new(),
            unreleasable: BTreeSet::new(),
            expired: false,
            create_calls: AtomicU32::new(0),
            authorize_calls: AtomicU32::new(0),
        }
    }

    pub fn aws() -> Self {
        Self::new(CloudKind::Aws)
    }

    pub fn gcp() -> Self {
        Self::new(CloudKind::Gcp)
    }

    /// `create_instances` in `region` fails.
    pub fn with_failing_region(mut self, region: &str) -> Self {
        self.failing_regions.insert(region.to_string());
        self
    }

    /// `destroy_instance` for `id` fails.
    pub fn with_undestroyable(mut self, id: &str) -> Self {
        self.undestroyable.insert(HostId::new(id));
        self
    }

    /// `associate_address` to `id` fails after the address was allocated.
    pub fn with_failing_association(mut self, id: &str) -> Self {
        self.unassociable.insert(HostId::new(id));
        self
    }

    /// Releasing the address allocated for `id` fails.
    pub fn with_unreleasable_address(mut self, id: &str) -> Self {
        self.unreleasable.insert(HostId::new(id));
        self
    }

    /// Every call fails with [`Error::CredentialExpired`].
    pub fn with_expired_credentials(mut self) -> Self {
        self.expired = true;
        self
    }

    /// Every instance ever created, in creation order.
    pub fn created(&self) -> Vec<HostId> {
        self.inner.lock().created.clone()
    }

    pub fn destroyed(&self) -> Vec<HostId> {
        self.inner.lock().destroyed.clone()
    }

    /// Instances that exist right now.
    pub fn live(&self) -> Vec<HostId> {
        self.inner.lock().instances.keys().cloned().collect()
    }

    /// Allocation ids of reserved addresses not yet released.
    pub fn live_addresses(&self) -> Vec<String> {
        self.inner.lock().addresses.keys().cloned().collect()
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn authorize_calls(&self) -> u32 {
        self.authorize_calls.load(Ordering::SeqCst)
    }

    /// Current rules of a group, sorted.
    pub fn group_rules(&self, region: &str, name: &str) -> Vec<IngressRule> {
        let inner = self.inner.lock();
        let mut rules = inner
            .groups
            .get(&(region.to_string(), name.to_string()))
            .map(|g| g.rules.clone())
            .unwrap_or_default();
        rules.sort();
        rules
    }

    /// Role recorded for an instance at creation.
    pub fn role_of(&self, id: &HostId) -> Option<HostRole> {
        self.inner.lock().instances.get(id).map(|i| i.role)
    }

    fn check_credentials(&self) -> Result<()> {
        if self.expired {
            return Err(Error::CredentialExpired {
                provider: self.kind,
                detail: "ExpiredToken: the security token included in the request is expired".into(),
                remediation: "refresh credentials".into(),
            });
        }
        Ok(())
    }

    fn failure(&self, message: String) -> Error {
        Error::Cloud {
            provider: self.kind,
            message,
        }
    }
}

#[async_trait]
impl CloudProvider for FakeCloud {
    fn kind(&self) -> CloudKind {
        self.kind
    }

    async fn ensure_key_pair(&self, region: &str, name: &str) -> Result<KeyPair> {
        self.check_credentials()?;
        Ok(KeyPair {
            name: name.to_string(),
            private_key: PathBuf::from(format!("/keys/{region}/{name}.pem")),
        })
    }

    async fn ensure_security_group(&self, region: &str, name: &str) -> Result<SecurityGroup> {
        self.check_credentials()?;
        let mut inner = self.inner.lock();
        let count = inner.groups.len();
        let group = inner
            .groups
            .entry((region.to_string(), name.to_string()))
            .or_insert_with(|| SecurityGroup {
                id: format!("sg-{count}"),
                name: name.to_string(),
                rules: Vec::new(),
            });
        Ok(group.clone())
    }

    async fn authorize_ingress(&self, region: &str, group: &SecurityGroup, rules: &[IngressRule]) -> Result<()> {
        self.check_credentials()?;
        self.authorize_calls.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock();
        let stored = inner
            .groups
            .get_mut(&(region.to_string(), group.name.clone()))
            .ok_or_else(|| self.failure(format!("no group {} in {region}", group.name)))?;
        for rule in rules {
            if !stored.rules.contains(rule) {
                stored.rules.push(rule.clone());
            }
        }
        Ok(())
    }

    async fn create_instances(&self, request: &InstanceRequest) -> Result<Vec<HostId>> {
        self.check_credentials()?;
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_regions.contains(&request.region) {
            return Err(self.failure(format!("insufficient capacity in {}", request.region)));
        }
        let prefix = match self.kind {
            CloudKind::Aws => "i",
            CloudKind::Gcp => "gce",
        };
        let mut inner = self.inner.lock();
        let mut ids = Vec::with_capacity(request.count);
        for _ in 0..request.count {
            inner.next += 1;
            let n = inner.next;
            let id = HostId::new(format!("{prefix}-{n:04}"));
            inner.instances.insert(
                id.clone(),
                Instance {
                    region: request.region.clone(),
                    role: request.role,
                    address: format!("10.0.{}.{}", n / 250, n % 250 + 1),
                },
            );
            inner.created.push(id.clone());
            ids.push(id);
        }
        Ok(ids)
    }

    async fn public_addresses(&self, region: &str, ids: &[HostId]) -> Result<BTreeMap<HostId, String>> {
        self.check_credentials()?;
        let inner = self.inner.lock();
        Ok(ids
            .iter()
            .filter_map(|id| {
                inner
                    .instances
                    .get(id)
                    .filter(|i| i.region == region)
                    .map(|i| (id.clone(), i.address.clone()))
            })
            .collect())
    }

    async fn allocate_static_address(&self, _region: &str, host: &HostId) -> Result<StaticAddress> {
        self.check_credentials()?;
        let mut inner = self.inner.lock();
        inner.allocations += 1;
        let address = StaticAddress {
            allocation_id: format!("eipalloc-{host}"),
            address: format!("203.0.113.{}", inner.allocations),
        };
        inner
            .addresses
            .insert(address.allocation_id.clone(), address.address.clone());
        Ok(address)
    }

    async fn associate_address(&self, _region: &str, host: &HostId, address: &StaticAddress) -> Result<()> {
        self.check_credentials()?;
        if self.unassociable.contains(host) {
            return Err(self.failure(format!("{} cannot be attached to {host}", address.address)));
        }
        let mut inner = self.inner.lock();
        let instance = inner
            .instances
            .get_mut(host)
            .ok_or_else(|| self.failure(format!("no instance {host}")))?;
        instance.address = address.address.clone();
        Ok(())
    }

    async fn destroy_instance(&self, _region: &str, host: &HostId) -> Result<()> {
        self.check_credentials()?;
        if self.undestroyable.contains(host) {
            return Err(self.failure(format!("{host} is protected from termination")));
        }
        let mut inner = self.inner.lock();
        inner.instances.remove(host);
        inner.destroyed.push(host.clone());
        Ok(())
    }

    async fn release_static_address(&self, _region: &str, address: &StaticAddress) -> Result<()> {
        self.check_credentials()?;
        let owner = address.allocation_id.strip_prefix("eipalloc-").map(HostId::new);
        if owner.is_some_and(|id| self.unreleasable.contains(&id)) {
            return Err(self.failure(format!("{} is still in use", address.address)));
        }
        self.inner.lock().addresses.remove(&address.allocation_id);
        Ok(())
    }
}
