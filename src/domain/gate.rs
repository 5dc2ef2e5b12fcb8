//! Stage gates: named conditions a host set must reach before the pipeline
//! moves on.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Conditions the orchestrator waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GateKind {
    Healthy,
    Bootstrapped,
    RpcCompatible,
    SubnetSyncing,
    SubnetValidating,
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Healthy => "healthy",
            Self::Bootstrapped => "bootstrapped",
            Self::RpcCompatible => "rpc-compatible",
            Self::SubnetSyncing => "subnet-syncing",
            Self::SubnetValidating => "subnet-validating",
        };
        f.write_str(label)
    }
}

/// A gate with its polling cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageGate {
    pub kind: GateKind,
    pub timeout: Duration,
    pub interval: Duration,
}

impl StageGate {
    #[must_use]
    pub const fn new(kind: GateKind, timeout: Duration, interval: Duration) -> Self {
        Self {
            kind,
            timeout,
            interval,
        }
    }
}

/// One host's answer to a gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Not there yet; the reason is surfaced if the gate times out.
    Pending(String),
}

impl Readiness {
    pub fn pending(reason: impl Into<String>) -> Self {
        Self::Pending(reason.into())
    }

    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// `Ready` when `condition` holds, `Pending(reason)` otherwise.
    pub fn when(condition: bool, reason: impl FnOnce() -> String) -> Self {
        if condition {
            Self::Ready
        } else {
            Self::Pending(reason())
        }
    }
}
