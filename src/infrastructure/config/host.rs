//! What runs on cluster hosts and how they are reached.

use std::time::Duration;

use serde::Deserialize;

use crate::application::provision::pipeline::ProvisionSettings;
use crate::application::provision::scripts::{MonitoringSettings, NodeSettings};
use crate::error::{ConfigError, Result};

/// `[remote]`: SSH access.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub ssh_user: String,
    pub ssh_port: u16,
    /// How long a fresh instance may take to open its SSH port.
    pub reachability_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            ssh_user: "ubuntu".into(),
            ssh_port: 22,
            reachability_timeout_secs: 300,
            connect_timeout_secs: 30,
            command_timeout_secs: 600,
        }
    }
}

/// `[node]`: the node client container.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub image: String,
    pub version: String,
    pub api_port: u16,
    pub staking_port: u16,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            image: "avaplatform/avalanchego".into(),
            version: "latest".into(),
            api_port: 9650,
            staking_port: 9651,
        }
    }
}

/// `[monitoring]`: ports of the metrics and log stack.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub metrics_port: u16,
    pub dashboard_port: u16,
    pub logs_port: u16,
    pub exporter_port: u16,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_port: 9090,
            dashboard_port: 3000,
            logs_port: 3100,
            exporter_port: 9100,
        }
    }
}

impl NodeConfig {
    fn to_settings(&self) -> NodeSettings {
        NodeSettings {
            image: self.image.clone(),
            version: self.version.clone(),
            api_port: self.api_port,
            staking_port: self.staking_port,
        }
    }
}

impl MonitoringConfig {
    fn to_settings(&self) -> MonitoringSettings {
        MonitoringSettings {
            metrics_port: self.metrics_port,
            dashboard_port: self.dashboard_port,
            logs_port: self.logs_port,
            exporter_port: self.exporter_port,
        }
    }
}

/// Combine the host-side sections into pipeline settings.
#[must_use]
pub fn provision_settings(
    remote: &RemoteConfig,
    node: &NodeConfig,
    monitoring: &MonitoringConfig,
) -> ProvisionSettings {
    ProvisionSettings {
        ssh_port: remote.ssh_port,
        reachability_timeout: Duration::from_secs(remote.reachability_timeout_secs),
        connect_timeout: Duration::from_secs(remote.connect_timeout_secs),
        command_timeout: Duration::from_secs(remote.command_timeout_secs),
        node: node.to_settings(),
        monitoring: monitoring.to_settings(),
    }
}

pub(crate) fn validate(remote: &RemoteConfig, node: &NodeConfig) -> Result<()> {
    if remote.ssh_user.trim().is_empty() {
        return Err(ConfigError::MissingField {
            field: "remote.ssh_user",
        }
        .into());
    }
    for (field, secs) in [
        ("remote.reachability_timeout_secs", remote.reachability_timeout_secs),
        ("remote.connect_timeout_secs", remote.connect_timeout_secs),
        ("remote.command_timeout_secs", remote.command_timeout_secs),
    ] {
        if secs == 0 {
            return Err(ConfigError::InvalidValue {
                field,
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }
    }
    if node.image.trim().is_empty() {
        return Err(ConfigError::MissingField { field: "node.image" }.into());
    }
    if node.api_port == node.staking_port {
        return Err(ConfigError::InvalidValue {
            field: "node.staking_port",
            reason: "must differ from node.api_port".to_string(),
        }
        .into());
    }
    Ok(())
}
