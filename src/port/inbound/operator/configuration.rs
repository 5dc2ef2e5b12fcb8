//! Configuration use-cases for operator-facing adapters.

use crate::error::Result;

/// Polling cadence of one gate.
#[derive(Debug, Clone)]
pub struct GateView {
    pub name: String,
    pub timeout_secs: u64,
    pub interval_secs: u64,
}

/// Effective configuration for `config show`.
#[derive(Debug, Clone)]
pub struct ConfigView {
    pub state_dir: String,
    pub log_level: String,
    pub log_format: String,
    /// `None` means unbounded.
    pub max_concurrency: Option<usize>,
    pub gates: Vec<GateView>,
    pub ssh_user: String,
    pub node_image: String,
    pub aws_profile: String,
    pub aws_instance_type: String,
    pub gcp_project: Option<String>,
    pub gcp_instance_type: String,
    pub operator_cidr: Option<String>,
    pub signer_url: Option<String>,
}

/// Outcome of `config validate`.
#[derive(Debug, Clone, Default)]
pub struct ConfigValidationReport {
    pub warnings: Vec<String>,
}

pub trait ConfigurationOperator: Send + Sync {
    fn show_config(&self, config_toml: &str) -> Result<ConfigView>;

    fn validate_config(&self, config_toml: &str) -> Result<ConfigValidationReport>;
}
