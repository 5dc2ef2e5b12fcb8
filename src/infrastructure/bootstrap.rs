//! Composition root: turns a [`Config`] into wired services.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::adapter::outbound::chain::RpcChainClient;
use crate::adapter::outbound::clock::SystemClock;
use crate::adapter::outbound::cloud::aws::AwsCli;
use crate::adapter::outbound::cloud::gcp::GcloudCli;
use crate::adapter::outbound::file::cluster_store::FileClusterStore;
use crate::adapter::outbound::file::key_vault::FileKeyVault;
use crate::adapter::outbound::ssh::SshExecutor;
use crate::application::cluster::service::CloudSet;
use crate::application::orchestration::wizard::{Services, Wizard};
use crate::domain::security::normalize_cidr;
use crate::error::{ConfigError, Result};
use crate::infrastructure::config::settings::Config;

/// Upper bound on one provider CLI call. Covers `wait instance-running`.
const CLOUD_CALL_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Cluster registry under the configured state directory.
#[must_use]
pub fn build_store(config: &Config) -> FileClusterStore {
    FileClusterStore::new(config.state_dir())
}

/// Cloud backends. AWS is always available; GCP needs `gcp.project`.
#[must_use]
pub fn build_clouds(config: &Config) -> CloudSet {
    let key_dir = config.state_dir().join("ssh");
    let mut clouds = CloudSet::new().with(Arc::new(AwsCli::new(
        &config.aws.binary,
        &config.aws.profile,
        key_dir.clone(),
        CLOUD_CALL_TIMEOUT,
    )));
    if let Some(project) = &config.gcp.project {
        clouds.insert(Arc::new(GcloudCli::new(
            &config.gcp.binary,
            project,
            &config.gcp.zone_suffix,
            &config.remote.ssh_user,
            key_dir,
            CLOUD_CALL_TIMEOUT,
        )));
    }
    clouds
}

/// Every outbound adapter the orchestrator drives.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn build_services(config: &Config) -> Result<Services> {
    let state_dir = config.state_dir();
    Ok(Services {
        clouds: build_clouds(config),
        remote: Arc::new(SshExecutor::new(
            config.remote.ssh_port,
            Duration::from_secs(config.remote.connect_timeout_secs),
        )),
        chain: Arc::new(RpcChainClient::new(
            config.chain.signer_url.clone(),
            config.chain.request_timeout(),
        )?),
        store: Arc::new(FileClusterStore::new(&state_dir)),
        vault: Arc::new(FileKeyVault::new(state_dir.join("keys"))),
        clock: Arc::new(SystemClock),
    })
}

/// Source range for operator-only ports: the configured one, or this
/// machine's public address as a `/32`.
///
/// # Errors
///
/// Returns an error when the lookup service is unreachable or answers with
/// something that is not an address.
pub async fn operator_cidr(config: &Config) -> Result<String> {
    if let Some(cidr) = &config.network.operator_cidr {
        return Ok(normalize_cidr(cidr));
    }

    let url = &config.network.address_lookup_url;
    debug!(url = %url, "Looking up operator address");
    let body = reqwest::Client::builder()
        .timeout(config.chain.request_timeout())
        .build()?
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    let cidr = parse_lookup(&body)?;
    info!(operator_cidr = %cidr, "Discovered operator address");
    Ok(cidr)
}

fn parse_lookup(body: &str) -> Result<String> {
    let address: IpAddr = body.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: "network.address_lookup_url",
        reason: format!("lookup answered `{}`, not an address", body.trim()),
    })?;
    Ok(normalize_cidr(&address.to_string()))
}

/// Orchestrator ready to run.
///
/// # Errors
///
/// Returns an error if the operator address cannot be resolved or a service
/// cannot be built.
pub async fn build_wizard(config: &Config) -> Result<Wizard> {
    let cidr = operator_cidr(config).await?;
    let services = build_services(config)?;
    Ok(Wizard::new(services, config.orchestrator_settings(cidr)))
}

/// Orchestrator for commands that never write the operator range into
/// ingress rules (destroy, whitelist), so the operator address is not
/// looked up.
///
/// # Errors
///
/// Returns an error if a service cannot be built.
pub fn build_without_lookup(config: &Config) -> Result<Wizard> {
    let cidr = config
        .network
        .operator_cidr
        .as_deref()
        .map(normalize_cidr)
        .unwrap_or_default();
    let services = build_services(config)?;
    Ok(Wizard::new(services, config.orchestrator_settings(cidr)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::host::CloudKind;

    #[test]
    fn lookup_body_becomes_host_range() {
        assert_eq!(parse_lookup("203.0.113.7\n").unwrap(), "203.0.113.7/32");
        assert!(parse_lookup("<html>rate limited</html>").is_err());
    }

    #[tokio::test]
    async fn configured_cidr_skips_lookup() {
        let mut config = Config::default();
        config.network.operator_cidr = Some("198.51.100.4".into());
        config.network.address_lookup_url = "http://127.0.0.1:9".into();
        assert_eq!(operator_cidr(&config).await.unwrap(), "198.51.100.4/32");
    }

    #[test]
    fn gcp_backend_needs_a_project() {
        let mut config = Config::default();
        assert!(build_clouds(&config).get(CloudKind::Gcp).is_err());
        assert!(build_clouds(&config).get(CloudKind::Aws).is_ok());

        config.gcp.project = Some("validators".into());
        assert!(build_clouds(&config).get(CloudKind::Gcp).is_ok());
    }
}
