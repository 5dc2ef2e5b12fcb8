//! A [`Wizard`] wired to in-memory fakes.

use std::sync::Arc;
use std::time::Duration;

use super::chain::FakeChain;
use super::clock::ManualClock;
use super::cloud::FakeCloud;
use super::fleet::FakeFleet;
use super::store::{MemoryStore, MemoryVault};
use crate::application::cluster::service::{CloudDefaults, CloudSet, ClusterSettings};
use crate::application::orchestration::settings::{
    ChainSettings, EnrollmentSettings, GateSettings, OrchestratorSettings, RelayerSettings,
};
use crate::application::orchestration::wizard::{Services, Wizard};
use crate::application::provision::pipeline::ProvisionSettings;
use crate::application::provision::scripts::{MonitoringSettings, NodeSettings};
use crate::domain::gate::{GateKind, StageGate};
use crate::domain::security::ServicePorts;

pub const API_PORT: u16 = 9650;
pub const OPERATOR_CIDR: &str = "198.51.100.7/32";
pub const RELAYER_ACCOUNT: &str = "0x00000000000000000000000000000000000e1a7e";

/// Gates that give up after one virtual minute, polling every five seconds.
pub fn gate_settings() -> GateSettings {
    let gate = |kind| StageGate::new(kind, Duration::from_secs(60), Duration::from_secs(5));
    GateSettings {
        health: gate(GateKind::Healthy),
        bootstrapped: gate(GateKind::Bootstrapped),
        rpc_compatibility: gate(GateKind::RpcCompatible),
        subnet_syncing: gate(GateKind::SubnetSyncing),
        subnet_validating: gate(GateKind::SubnetValidating),
    }
}

pub fn cluster_settings() -> ClusterSettings {
    ClusterSettings {
        ssh_user: "ubuntu".into(),
        security_group: "nodewiz".into(),
        key_pair: "nodewiz".into(),
        aws: CloudDefaults {
            instance_type: "c5.2xlarge".into(),
            image: "ami-0abcdef1234567890".into(),
        },
        gcp: CloudDefaults {
            instance_type: "e2-standard-8".into(),
            image: "ubuntu-2204-lts".into(),
        },
        ports: ServicePorts {
            ssh: 22,
            api: API_PORT,
            staking: 9651,
            metrics: 9090,
            dashboard: 3000,
        },
        operator_cidr: OPERATOR_CIDR.into(),
    }
}

pub fn provision_settings() -> ProvisionSettings {
    ProvisionSettings {
        ssh_port: 22,
        reachability_timeout: Duration::from_secs(300),
        connect_timeout: Duration::from_secs(30),
        command_timeout: Duration::from_secs(120),
        node: NodeSettings {
            image: "avaplatform/avalanchego".into(),
            version: "v1.11.0".into(),
            api_port: API_PORT,
            staking_port: 9651,
        },
        monitoring: MonitoringSettings {
            metrics_port: 9090,
            dashboard_port: 3000,
            logs_port: 3100,
            exporter_port: 9100,
        },
    }
}

pub fn orchestrator_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        max_concurrency: Some(4),
        gates: gate_settings(),
        provision: provision_settings(),
        cluster: cluster_settings(),
        enrollment: EnrollmentSettings::default(),
        chain: ChainSettings {
            testnet_url: "https://api.testnet.example".into(),
            mainnet_url: "https://api.mainnet.example".into(),
        },
        relayer: RelayerSettings {
            image: "avaplatform/icm-relayer:v1.4.0".into(),
            address: Some(RELAYER_ACCOUNT.into()),
            fund_amount: 100,
        },
    }
}

/// Every fake behind one [`Wizard`], kept around for assertions.
pub struct Rig {
    pub cloud: Arc<FakeCloud>,
    pub chain: Arc<FakeChain>,
    pub fleet: Arc<FakeFleet>,
    pub store: Arc<MemoryStore>,
    pub vault: Arc<MemoryVault>,
    pub clock: Arc<ManualClock>,
    pub wizard: Wizard,
}

impl Rig {
    /// Default fakes: an AWS account and a fleet where every host behaves.
    pub fn new() -> Self {
        RigBuilder::default().build()
    }

    pub fn builder() -> RigBuilder {
        RigBuilder::default()
    }

    /// A second wizard over the same fakes, e.g. to re-run after a failure.
    pub fn rebuild(&self, settings: OrchestratorSettings) -> Wizard {
        Wizard::new(self.services(), settings)
    }

    pub fn services(&self) -> Services {
        Services {
            clouds: CloudSet::new().with(self.cloud.clone()),
            remote: self.fleet.clone(),
            chain: self.chain.clone(),
            store: self.store.clone(),
            vault: self.vault.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl Default for Rig {
    fn default() -> Self {
        Self::new()
    }
}

type FleetSetup = Box<dyn FnOnce(FakeFleet) -> FakeFleet>;

pub struct RigBuilder {
    cloud: FakeCloud,
    chain: FakeChain,
    fleet: FleetSetup,
    vault: MemoryVault,
    settings: OrchestratorSettings,
}

impl Default for RigBuilder {
    fn default() -> Self {
        Self {
            cloud: FakeCloud::aws(),
            chain: FakeChain::new(),
            fleet: Box::new(|fleet| fleet),
            vault: MemoryVault::new(),
            settings: orchestrator_settings(),
        }
    }
}

impl RigBuilder {
    pub fn cloud(mut self, cloud: FakeCloud) -> Self {
        self.cloud = cloud;
        self
    }

    pub fn chain(mut self, chain: FakeChain) -> Self {
        self.chain = chain;
        self
    }

    /// Adjust the fleet once it is attached to the chain.
    pub fn fleet(mut self, setup: impl FnOnce(FakeFleet) -> FakeFleet + 'static) -> Self {
        self.fleet = Box::new(setup);
        self
    }

    pub fn vault(mut self, vault: MemoryVault) -> Self {
        self.vault = vault;
        self
    }

    pub fn settings(mut self, adjust: impl FnOnce(&mut OrchestratorSettings)) -> Self {
        adjust(&mut self.settings);
        self
    }

    pub fn build(self) -> Rig {
        let chain = Arc::new(self.chain);
        let fleet = Arc::new((self.fleet)(FakeFleet::new(chain.clone())));
        let cloud = Arc::new(self.cloud);
        let store = Arc::new(MemoryStore::new());
        let vault = Arc::new(self.vault);
        let clock = Arc::new(ManualClock::new());

        let services = Services {
            clouds: CloudSet::new().with(cloud.clone()),
            remote: fleet.clone(),
            chain: chain.clone(),
            store: store.clone(),
            vault: vault.clone(),
            clock: clock.clone(),
        };
        let wizard = Wizard::new(services, self.settings);
        Rig {
            cloud,
            chain,
            fleet,
            store,
            vault,
            clock,
            wizard,
        }
    }
}
