//! Stage gate timing.

use std::time::Duration;

use serde::Deserialize;

use crate::application::orchestration::settings::GateSettings;
use crate::domain::gate::{GateKind, StageGate};
use crate::error::{ConfigError, Result};

/// Timeout and polling interval of one gate, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct GateConfig {
    pub timeout_secs: u64,
    pub interval_secs: u64,
}

impl GateConfig {
    const fn new(timeout_secs: u64, interval_secs: u64) -> Self {
        Self {
            timeout_secs,
            interval_secs,
        }
    }

    fn to_gate(self, kind: GateKind) -> StageGate {
        StageGate::new(
            kind,
            Duration::from_secs(self.timeout_secs),
            Duration::from_secs(self.interval_secs),
        )
    }

    fn validate(&self, field: &'static str) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field,
                reason: "timeout_secs must be greater than 0".to_string(),
            }
            .into());
        }
        if self.interval_secs == 0 || self.interval_secs > self.timeout_secs {
            return Err(ConfigError::InvalidValue {
                field,
                reason: "interval_secs must be between 1 and timeout_secs".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// `[gates.*]` sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GatesConfig {
    /// Node API answers `healthy`.
    pub health: GateConfig,
    /// Primary network chains bootstrapped. Slow on a fresh node.
    pub bootstrapped: GateConfig,
    pub rpc_compatibility: GateConfig,
    pub subnet_syncing: GateConfig,
    pub subnet_validating: GateConfig,
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self {
            health: GateConfig::new(600, 10),
            bootstrapped: GateConfig::new(3600, 30),
            rpc_compatibility: GateConfig::new(120, 10),
            subnet_syncing: GateConfig::new(900, 15),
            subnet_validating: GateConfig::new(900, 15),
        }
    }
}

impl GatesConfig {
    #[must_use]
    pub fn to_settings(&self) -> GateSettings {
        GateSettings {
            health: self.health.to_gate(GateKind::Healthy),
            bootstrapped: self.bootstrapped.to_gate(GateKind::Bootstrapped),
            rpc_compatibility: self.rpc_compatibility.to_gate(GateKind::RpcCompatible),
            subnet_syncing: self.subnet_syncing.to_gate(GateKind::SubnetSyncing),
            subnet_validating: self.subnet_validating.to_gate(GateKind::SubnetValidating),
        }
    }

    /// Every gate with its config key, in pipeline order.
    #[must_use]
    pub fn named(&self) -> [(&'static str, GateConfig); 5] {
        [
            ("health", self.health),
            ("bootstrapped", self.bootstrapped),
            ("rpc_compatibility", self.rpc_compatibility),
            ("subnet_syncing", self.subnet_syncing),
            ("subnet_validating", self.subnet_validating),
        ]
    }

    pub(crate) fn validate(&self) -> Result<()> {
        self.health.validate("gates.health")?;
        self.bootstrapped.validate("gates.bootstrapped")?;
        self.rpc_compatibility.validate("gates.rpc_compatibility")?;
        self.subnet_syncing.validate("gates.subnet_syncing")?;
        self.subnet_validating.validate("gates.subnet_validating")
    }
}
