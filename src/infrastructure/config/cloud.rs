//! Cloud accounts and cluster networking.

use serde::Deserialize;

use crate::application::cluster::service::{CloudDefaults, ClusterSettings};
use crate::domain::security::{is_cidr, ServicePorts};
use crate::error::{ConfigError, Result};

use super::host::{MonitoringConfig, NodeConfig, RemoteConfig};

/// `[aws]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    /// Named profile passed to the `aws` CLI. `AWS_PROFILE` overrides it.
    pub profile: String,
    pub instance_type: String,
    /// AMI id, or an SSM parameter reference the CLI resolves.
    pub image: String,
    /// Path or name of the `aws` executable.
    pub binary: String,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            profile: "default".into(),
            instance_type: "c5.2xlarge".into(),
            image: "resolve:ssm:/aws/service/canonical/ubuntu/server/22.04/stable/current/amd64/hvm/ebs-gp2/ami-id".into(),
            binary: "aws".into(),
        }
    }
}

/// `[gcp]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GcpConfig {
    /// Required only when a GCP cluster is created.
    pub project: Option<String>,
    pub instance_type: String,
    pub image: String,
    /// Zone letter appended to the region, e.g. `us-east1` + `b`.
    pub zone_suffix: String,
    pub binary: String,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project: None,
            instance_type: "e2-standard-8".into(),
            image: "projects/ubuntu-os-cloud/global/images/family/ubuntu-2204-lts".into(),
            zone_suffix: "b".into(),
            binary: "gcloud".into(),
        }
    }
}

/// `[network]`: security group and key pair naming, operator access.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub security_group: String,
    pub key_pair: String,
    /// Range allowed to reach SSH, the API and dashboards. Discovered from
    /// the operator's public address when unset.
    pub operator_cidr: Option<String>,
    /// Service that echoes the caller's public address.
    pub address_lookup_url: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            security_group: "nodewiz".into(),
            key_pair: "nodewiz".into(),
            operator_cidr: None,
            address_lookup_url: "https://api.ipify.org".into(),
        }
    }
}

/// Build cluster settings once the operator range is known.
#[must_use]
pub fn cluster_settings(
    aws: &AwsConfig,
    gcp: &GcpConfig,
    network: &NetworkConfig,
    remote: &RemoteConfig,
    node: &NodeConfig,
    monitoring: &MonitoringConfig,
    operator_cidr: String,
) -> ClusterSettings {
    ClusterSettings {
        ssh_user: remote.ssh_user.clone(),
        security_group: network.security_group.clone(),
        key_pair: network.key_pair.clone(),
        aws: CloudDefaults {
            instance_type: aws.instance_type.clone(),
            image: aws.image.clone(),
        },
        gcp: CloudDefaults {
            instance_type: gcp.instance_type.clone(),
            image: gcp.image.clone(),
        },
        ports: ServicePorts {
            ssh: remote.ssh_port,
            api: node.api_port,
            staking: node.staking_port,
            metrics: monitoring.metrics_port,
            dashboard: monitoring.dashboard_port,
        },
        operator_cidr,
    }
}

pub(crate) fn validate(network: &NetworkConfig, gcp: &GcpConfig) -> Result<()> {
    if network.security_group.trim().is_empty() {
        return Err(ConfigError::MissingField {
            field: "network.security_group",
        }
        .into());
    }
    if network.key_pair.trim().is_empty() {
        return Err(ConfigError::MissingField {
            field: "network.key_pair",
        }
        .into());
    }
    if let Some(cidr) = &network.operator_cidr {
        if !is_cidr(cidr) {
            return Err(ConfigError::InvalidValue {
                field: "network.operator_cidr",
                reason: format!("`{cidr}` is not an address or CIDR range"),
            }
            .into());
        }
    }
    if gcp.project.as_deref().is_some_and(|p| p.trim().is_empty()) {
        return Err(ConfigError::InvalidValue {
            field: "gcp.project",
            reason: "must not be empty when set".to_string(),
        }
        .into());
    }
    Ok(())
}
