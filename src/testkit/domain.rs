//! Builders for domain values and a notifier that records events.

use std::path::PathBuf;

use parking_lot::Mutex;

use crate::domain::cluster::{ClusterSpec, NetworkKind, RegionPlan};
use crate::domain::host::{CloudKind, Host, HostRole};
use crate::domain::id::HostId;
use crate::domain::stage::WizardPlan;
use crate::domain::subnet::{SubnetSpec, VmKind};
use crate::port::outbound::notifier::{Event, Notifier};

/// A host with an address derived from its id.
pub fn host(id: &str, role: HostRole) -> Host {
    Host {
        id: HostId::new(id),
        cloud: CloudKind::Aws,
        region: "us-east-1".into(),
        address: Some(format!("10.9.0.{}", id.bytes().map(u32::from).sum::<u32>() % 250 + 1)),
        ssh_user: "ubuntu".into(),
        ssh_key: PathBuf::from("/keys/us-east-1/nodewiz.pem"),
        role,
        node_id: None,
    }
}

/// `count` validators named `v0`, `v1`, ...
pub fn validators(count: usize) -> Vec<Host> {
    (0..count)
        .map(|i| host(&format!("v{i}"), HostRole::Validator))
        .collect()
}

/// Devnet spec with `validators` per region and no extras.
pub fn cluster_spec(cloud: CloudKind, regions: &[&str], validators: usize) -> ClusterSpec {
    ClusterSpec {
        cloud,
        network: NetworkKind::Devnet,
        regions: regions
            .iter()
            .map(|r| RegionPlan {
                region: (*r).to_string(),
                validators,
                apis: 0,
            })
            .collect(),
        instance_type: None,
        image: None,
        monitoring: false,
        static_addresses: false,
        public_api: false,
    }
}

pub fn subnet_spec(name: &str) -> SubnetSpec {
    SubnetSpec {
        name: name.to_string(),
        vm: VmKind::SubnetEvm,
        rpc_version: super::fleet::DEFAULT_RPC_VERSION,
        evm_chain_id: Some(7777),
        token_symbol: Some("TST".into()),
        relay_ready: false,
    }
}

/// Plan that creates `cluster` from `spec` and deploys `subnet` if given.
pub fn plan(cluster: &str, spec: ClusterSpec, subnet: Option<SubnetSpec>) -> WizardPlan {
    WizardPlan {
        cluster: cluster.to_string(),
        spec,
        subnet,
        validators: Vec::new(),
        relayer: false,
        force_subnet_define: false,
    }
}

/// Keeps every event it receives.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<Event>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// `(host, stage)` of every `HostFailed` event.
    pub fn host_failures(&self) -> Vec<(HostId, String)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::HostFailed { host, stage, .. } => Some((host.clone(), stage.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| matches(e)).count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: Event) {
        self.events.lock().push(event);
    }
}
