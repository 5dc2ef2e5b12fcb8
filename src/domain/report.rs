//! Run reports returned to the operator.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::cluster::RollbackReport;
use super::id::HostId;
use super::security::IngressRule;
use super::stage::StageRecord;

/// Per-host provisioning stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisionStage {
    Reachable,
    Credentialed,
    SoftwareInstalled,
    Monitored,
    Running,
    MonitoringStack,
}

impl fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Reachable => "reachable",
            Self::Credentialed => "credentialed",
            Self::SoftwareInstalled => "software-installed",
            Self::Monitored => "monitored",
            Self::Running => "running",
            Self::MonitoringStack => "monitoring-stack",
        };
        f.write_str(label)
    }
}

/// Where and why a host dropped out of provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub stage: ProvisionStage,
    pub error: String,
}

/// Result of running the provisioning pipeline over a host set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub running: Vec<HostId>,
    pub failed: BTreeMap<HostId, StageFailure>,
}

impl ProvisionReport {
    #[must_use]
    pub fn total(&self) -> usize {
        self.running.len() + self.failed.len()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// "5/6 hosts running".
    #[must_use]
    pub fn summary(&self) -> String {
        format!("{}/{} hosts running", self.running.len(), self.total())
    }

    /// Rendered failure per host.
    #[must_use]
    pub fn failures(&self) -> BTreeMap<HostId, String> {
        self.failed
            .iter()
            .map(|(id, f)| (id.clone(), format!("{}: {}", f.stage, f.error)))
            .collect()
    }
}

/// What `cluster create` produced.
#[derive(Debug, Clone, Serialize)]
pub struct CreateReport {
    pub cluster: String,
    pub hosts: Vec<HostId>,
    pub provision: ProvisionReport,
}

/// What `cluster destroy` did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DestroyReport {
    pub cluster: String,
    pub destroyed: Vec<HostId>,
    pub failed: BTreeMap<HostId, String>,
    /// Whether the cluster record itself was removed.
    pub removed: bool,
}

impl From<(String, RollbackReport, bool)> for DestroyReport {
    fn from((cluster, report, removed): (String, RollbackReport, bool)) -> Self {
        Self {
            cluster,
            destroyed: report.destroyed,
            failed: report.failed,
            removed,
        }
    }
}

/// What one orchestrator run did.
#[derive(Debug, Clone, Serialize)]
pub struct WizardReport {
    pub run_id: String,
    pub cluster: String,
    /// The cluster was created by this run.
    pub created: bool,
    pub provision: Option<ProvisionReport>,
    pub stages: Vec<StageRecord>,
    pub subnet: Option<String>,
    pub rpc_url: Option<String>,
    pub relay_host: Option<HostId>,
}

impl WizardReport {
    #[must_use]
    pub fn stage(&self, stage: super::stage::WizardStage) -> Option<&StageRecord> {
        self.stages.iter().find(|r| r.stage == stage)
    }
}

/// What running a few stages against an existing cluster did.
#[derive(Debug, Clone, Serialize)]
pub struct StageRunReport {
    pub cluster: String,
    pub subnet: Option<String>,
    pub stages: Vec<StageRecord>,
    /// Hosts that became validators during this run.
    pub enrolled: Vec<HostId>,
}

/// Rules `cluster whitelist` added, per region.
#[derive(Debug, Clone, Serialize)]
pub struct WhitelistReport {
    pub cluster: String,
    pub cidr: String,
    pub added: BTreeMap<String, Vec<IngressRule>>,
}

impl WhitelistReport {
    #[must_use]
    pub fn rules_added(&self) -> usize {
        self.added.values().map(Vec::len).sum()
    }
}
