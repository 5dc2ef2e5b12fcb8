//! Operator entry point installed by the binary.

use crate::error::Result;
use crate::infrastructure::config::settings::Config;

/// Implements every inbound operator port on top of the configured
/// adapters. Stateless: each call parses the configuration it is given.
#[derive(Debug, Clone, Copy, Default)]
pub struct Operator;

impl Operator {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    pub(super) fn load_config(&self, config_toml: &str) -> Result<Config> {
        Config::parse_toml(config_toml)
    }

    /// Parse the configuration and start logging, for long-running calls.
    pub(super) fn load_run_config(&self, config_toml: &str) -> Result<Config> {
        let config = self.load_config(config_toml)?;
        config.init_logging();
        Ok(config)
    }
}
