//! Settings the orchestrator runs with, resolved from configuration.

use std::time::Duration;

use crate::application::cluster::service::ClusterSettings;
use crate::application::provision::pipeline::ProvisionSettings;
use crate::domain::cluster::NetworkKind;
use crate::domain::gate::StageGate;
use crate::domain::validator::StakingPolicy;

/// One gate per waiting point of the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct GateSettings {
    pub health: StageGate,
    pub bootstrapped: StageGate,
    pub rpc_compatibility: StageGate,
    pub subnet_syncing: StageGate,
    pub subnet_validating: StageGate,
}

const HOUR: Duration = Duration::from_secs(3600);

/// Enrollment terms. Unset primary values fall back to the network's
/// defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrollmentSettings {
    pub primary_weight: Option<u64>,
    pub primary_duration: Option<Duration>,
    pub stagger: Duration,
    pub lead_time: Duration,
    pub subnet_weight: u64,
    pub subnet_duration: Duration,
}

impl Default for EnrollmentSettings {
    fn default() -> Self {
        Self {
            primary_weight: None,
            primary_duration: None,
            stagger: HOUR * 24,
            lead_time: Duration::from_secs(60),
            subnet_weight: 20,
            subnet_duration: HOUR * 24,
        }
    }
}

impl EnrollmentSettings {
    /// Primary network terms: the network's minimum stake unless overridden.
    #[must_use]
    pub fn primary_policy(&self, network: NetworkKind) -> StakingPolicy {
        let (weight, duration) = match network {
            NetworkKind::Mainnet => (2_000_000_000_000, HOUR * 24 * 14),
            NetworkKind::Testnet | NetworkKind::Devnet => (1_000_000_000, HOUR * 48),
        };
        StakingPolicy {
            weight: self.primary_weight.unwrap_or(weight),
            duration: self.primary_duration.unwrap_or(duration),
            stagger: self.stagger,
            lead_time: self.lead_time,
        }
    }

    #[must_use]
    pub fn subnet_policy(&self) -> StakingPolicy {
        StakingPolicy {
            weight: self.subnet_weight,
            duration: self.subnet_duration,
            stagger: self.stagger,
            lead_time: self.lead_time,
        }
    }
}

/// Public chain endpoints. Devnet clusters talk to their own first validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSettings {
    pub testnet_url: String,
    pub mainnet_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayerSettings {
    pub image: String,
    /// Account the relayer pays fees from.
    pub address: Option<String>,
    pub fund_amount: u64,
}

/// Everything [`super::wizard::Wizard`] needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_concurrency: Option<usize>,
    pub gates: GateSettings,
    pub provision: ProvisionSettings,
    pub cluster: ClusterSettings,
    pub enrollment: EnrollmentSettings,
    pub chain: ChainSettings,
    pub relayer: RelayerSettings,
}
