//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all application settings.
//! Configuration is loaded from a TOML file. Every section is optional and
//! falls back to defaults; a few values can be overridden from the
//! environment:
//!
//! - `NODEWIZ_STATE_DIR` replaces `state.dir`
//! - `AWS_PROFILE` replaces `aws.profile`
//! - `NODEWIZ_SIGNER_URL` replaces `chain.signer_url`
//!
//! # Example
//!
//! ```no_run
//! use nodewiz::infrastructure::config::settings::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::chain::{self, ChainConfig, RelayerConfig, ValidatorConfig};
use super::cloud::{self, AwsConfig, GcpConfig, NetworkConfig};
use super::gate::GatesConfig;
use super::host::{self, MonitoringConfig, NodeConfig, RemoteConfig};
use super::logging::LoggingConfig;
use crate::application::orchestration::settings::OrchestratorSettings;
use crate::error::{ConfigError, Result};

/// `[state]`: where clusters, node records and keys are kept.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Defaults to `~/.nodewiz`.
    pub dir: Option<PathBuf>,
}

/// `[executor]`: fan-out limits.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Upper bound on concurrent per-host tasks. Unset means one task per
    /// host.
    pub max_concurrency: Option<usize>,
}

/// Main application configuration.
///
/// Load from a TOML file using [`Config::load`] or parse directly with
/// [`Config::parse_toml`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub state: StateConfig,
    pub executor: ExecutorConfig,
    pub gates: GatesConfig,
    pub remote: RemoteConfig,
    pub node: NodeConfig,
    pub monitoring: MonitoringConfig,
    pub network: NetworkConfig,
    pub aws: AwsConfig,
    pub gcp: GcpConfig,
    pub chain: ChainConfig,
    pub validator: ValidatorConfig,
    pub relayer: RelayerConfig,
}

impl Config {
    /// Parse configuration from TOML content and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML content is malformed or validation fails.
    #[allow(clippy::result_large_err)]
    pub fn parse_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the TOML content is
    /// malformed, or validation fails.
    #[allow(clippy::result_large_err)]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Overlay environment values. Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(dir) = var("NODEWIZ_STATE_DIR") {
            self.state.dir = Some(PathBuf::from(dir));
        }
        if let Some(profile) = var("AWS_PROFILE") {
            self.aws.profile = profile;
        }
        if let Some(url) = var("NODEWIZ_SIGNER_URL") {
            self.chain.signer_url = Some(url);
        }
    }

    /// Validate configuration values.
    #[allow(clippy::result_large_err)]
    fn validate(&self) -> Result<()> {
        self.logging.validate()?;
        if self.executor.max_concurrency == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "executor.max_concurrency",
                reason: "must be greater than 0 when set".to_string(),
            }
            .into());
        }
        self.gates.validate()?;
        host::validate(&self.remote, &self.node)?;
        cloud::validate(&self.network, &self.gcp)?;
        chain::validate(&self.chain, &self.validator)?;
        Ok(())
    }

    /// Initialize logging based on configuration.
    pub fn init_logging(&self) {
        self.logging.init();
    }

    /// Resolved state directory.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.state.dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".nodewiz")
        })
    }

    /// Settings for the orchestrator, given the operator's source range.
    #[must_use]
    pub fn orchestrator_settings(&self, operator_cidr: String) -> OrchestratorSettings {
        OrchestratorSettings {
            max_concurrency: self.executor.max_concurrency,
            gates: self.gates.to_settings(),
            provision: host::provision_settings(&self.remote, &self.node, &self.monitoring),
            cluster: cloud::cluster_settings(
                &self.aws,
                &self.gcp,
                &self.network,
                &self.remote,
                &self.node,
                &self.monitoring,
                operator_cidr,
            ),
            enrollment: self.validator.to_settings(),
            chain: self.chain.to_settings(),
            relayer: self.relayer.to_settings(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn parse(toml: &str) -> Result<Config> {
        let mut config: Config = toml::from_str(toml).map_err(ConfigError::Parse)?;
        config.apply_env(|_| None);
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.remote.ssh_user, "ubuntu");
        assert_eq!(config.node.api_port, 9650);
        assert_eq!(config.gates.health.timeout_secs, 600);
        assert!(config.executor.max_concurrency.is_none());
        assert!(config.state_dir().ends_with(".nodewiz"));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = parse(
            r#"
            [gates.health]
            timeout_secs = 30
            interval_secs = 2

            [node]
            version = "v1.11.13"
            "#,
        )
        .unwrap();
        assert_eq!(config.gates.health.timeout_secs, 30);
        assert_eq!(config.gates.bootstrapped.timeout_secs, 3600);
        assert_eq!(config.node.version, "v1.11.13");
        assert_eq!(config.node.image, "avaplatform/avalanchego");
    }

    #[test]
    fn interval_longer_than_timeout_is_rejected() {
        let err = parse(
            r#"
            [gates.subnet_syncing]
            timeout_secs = 5
            interval_secs = 10
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidValue { field: "gates.subnet_syncing", .. })
        ));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = parse("[executor]\nmax_concurrency = 0").unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidValue { field: "executor.max_concurrency", .. })
        ));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        assert!(parse("[logging]\nformat = \"xml\"").is_err());
    }

    #[test]
    fn bad_operator_cidr_is_rejected() {
        assert!(parse("[network]\noperator_cidr = \"10.0.0.1/33x\"").is_err());
        assert!(parse("[network]\noperator_cidr = \"10.0.0.1\"").is_ok());
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config: Config = toml::from_str(
            r#"
            [aws]
            profile = "work"
            "#,
        )
        .unwrap();
        config.apply_env(|key| match key {
            "AWS_PROFILE" => Some("ops".to_string()),
            "NODEWIZ_STATE_DIR" => Some("/srv/nodewiz".to_string()),
            "NODEWIZ_SIGNER_URL" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.aws.profile, "ops");
        assert_eq!(config.state_dir(), PathBuf::from("/srv/nodewiz"));
        assert!(config.chain.signer_url.is_none());
    }

    #[test]
    fn orchestrator_settings_carry_ports_into_rules() {
        let config = parse("[node]\napi_port = 9700\nstaking_port = 9701").unwrap();
        let settings = config.orchestrator_settings("203.0.113.9/32".into());
        assert_eq!(settings.provision.node.api_port, 9700);
        assert_eq!(settings.cluster.ports.api, 9700);
        assert_eq!(settings.cluster.operator_cidr, "203.0.113.9/32");
        assert_eq!(settings.enrollment.stagger.as_secs(), 24 * 3600);
    }
}
