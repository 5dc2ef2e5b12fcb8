//! Chain endpoints, enrollment terms and the relayer.

use std::time::Duration;

use serde::Deserialize;

use crate::application::orchestration::settings::{ChainSettings, EnrollmentSettings, RelayerSettings};
use crate::error::{ConfigError, Result};

const HOUR_SECS: u64 = 3600;

/// `[chain]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub testnet_url: String,
    pub mainnet_url: String,
    /// Service holding the funding key that signs transactions.
    /// `NODEWIZ_SIGNER_URL` overrides it.
    pub signer_url: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            testnet_url: "https://api.avax-test.network".into(),
            mainnet_url: "https://api.avax.network".into(),
            signer_url: None,
            request_timeout_secs: 30,
        }
    }
}

impl ChainConfig {
    #[must_use]
    pub fn to_settings(&self) -> ChainSettings {
        ChainSettings {
            testnet_url: self.testnet_url.clone(),
            mainnet_url: self.mainnet_url.clone(),
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// `[validator]`: enrollment terms.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Defaults to the network's minimum stake.
    pub primary_weight: Option<u64>,
    pub primary_duration_hours: Option<u64>,
    /// Extra validity per host, so end times are spread out.
    pub stagger_hours: u64,
    pub lead_time_secs: u64,
    pub subnet_weight: u64,
    pub subnet_duration_hours: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        let defaults = EnrollmentSettings::default();
        Self {
            primary_weight: None,
            primary_duration_hours: None,
            stagger_hours: defaults.stagger.as_secs() / HOUR_SECS,
            lead_time_secs: defaults.lead_time.as_secs(),
            subnet_weight: defaults.subnet_weight,
            subnet_duration_hours: defaults.subnet_duration.as_secs() / HOUR_SECS,
        }
    }
}

impl ValidatorConfig {
    #[must_use]
    pub fn to_settings(&self) -> EnrollmentSettings {
        let hours = |h: u64| Duration::from_secs(h.saturating_mul(HOUR_SECS));
        EnrollmentSettings {
            primary_weight: self.primary_weight,
            primary_duration: self.primary_duration_hours.map(hours),
            stagger: hours(self.stagger_hours),
            lead_time: Duration::from_secs(self.lead_time_secs),
            subnet_weight: self.subnet_weight,
            subnet_duration: hours(self.subnet_duration_hours),
        }
    }
}

/// `[relayer]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayerConfig {
    pub image: String,
    /// Account the relayer pays fees from. Required for `--relayer`.
    pub address: Option<String>,
    /// Amount sent to the relayer account on each chain.
    pub fund_amount: u64,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        Self {
            image: "avaplatform/icm-relayer:latest".into(),
            address: None,
            fund_amount: 5_000_000_000_000_000_000,
        }
    }
}

impl RelayerConfig {
    #[must_use]
    pub fn to_settings(&self) -> RelayerSettings {
        RelayerSettings {
            image: self.image.clone(),
            address: self.address.clone(),
            fund_amount: self.fund_amount,
        }
    }
}

pub(crate) fn validate(chain: &ChainConfig, validator: &ValidatorConfig) -> Result<()> {
    for (field, value) in [
        ("chain.testnet_url", &chain.testnet_url),
        ("chain.mainnet_url", &chain.mainnet_url),
    ] {
        url::Url::parse(value).map_err(|e| ConfigError::InvalidValue {
            field,
            reason: e.to_string(),
        })?;
    }
    if let Some(signer) = &chain.signer_url {
        url::Url::parse(signer).map_err(|e| ConfigError::InvalidValue {
            field: "chain.signer_url",
            reason: e.to_string(),
        })?;
    }
    if chain.request_timeout_secs == 0 {
        return Err(ConfigError::InvalidValue {
            field: "chain.request_timeout_secs",
            reason: "must be greater than 0".to_string(),
        }
        .into());
    }
    if validator.primary_weight == Some(0) || validator.subnet_weight == 0 {
        return Err(ConfigError::InvalidValue {
            field: "validator.weight",
            reason: "validator weights must be greater than 0".to_string(),
        }
        .into());
    }
    if validator.subnet_duration_hours == 0 || validator.primary_duration_hours == Some(0) {
        return Err(ConfigError::InvalidValue {
            field: "validator.duration",
            reason: "validation periods must be at least one hour".to_string(),
        }
        .into());
    }
    Ok(())
}
