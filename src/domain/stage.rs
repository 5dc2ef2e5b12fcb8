//! Orchestrator stages and the per-run record of what each one did.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use super::cluster::ClusterSpec;
use super::subnet::SubnetSpec;

/// Everything one orchestrator run was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardPlan {
    pub cluster: String,
    /// Used only when the cluster does not exist yet.
    pub spec: ClusterSpec,
    pub subnet: Option<SubnetSpec>,
    /// Restrict validation to these hosts (instance id, address or node id).
    pub validators: Vec<String>,
    pub relayer: bool,
    /// Redefine the subnet even if a definition exists.
    pub force_subnet_define: bool,
}

/// Stages of the cluster orchestrator, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum WizardStage {
    SubnetDefined,
    ClusterReady,
    Healthy,
    RpcCompatible,
    Bootstrapped,
    BlockchainDeployed,
    PrimaryValidators,
    SubnetTracking,
    SubnetValidators,
    Relayer,
}

impl WizardStage {
    /// Short code used in progress output.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::SubnetDefined => "S0",
            Self::ClusterReady => "S1",
            Self::Healthy => "S2",
            Self::RpcCompatible => "S3",
            Self::Bootstrapped => "S3b",
            Self::BlockchainDeployed => "S4",
            Self::PrimaryValidators => "S5",
            Self::SubnetTracking => "S6",
            Self::SubnetValidators => "S7",
            Self::Relayer => "S8",
        }
    }
}

impl fmt::Display for WizardStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::SubnetDefined => "subnet definition",
            Self::ClusterReady => "cluster",
            Self::Healthy => "health gate",
            Self::RpcCompatible => "rpc compatibility",
            Self::Bootstrapped => "bootstrap gate",
            Self::BlockchainDeployed => "blockchain deployment",
            Self::PrimaryValidators => "primary network validators",
            Self::SubnetTracking => "subnet tracking",
            Self::SubnetValidators => "subnet validators",
            Self::Relayer => "interchain relayer",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum StageOutcome {
    Completed,
    /// Nothing to do; the reason says what was already in place.
    Skipped(String),
    /// The run did not ask for this stage.
    NotRequested,
}

/// What one stage did during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRecord {
    pub stage: WizardStage,
    pub outcome: StageOutcome,
    pub elapsed: Duration,
}

impl StageRecord {
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, StageOutcome::Skipped(_))
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.outcome == StageOutcome::Completed
    }
}
