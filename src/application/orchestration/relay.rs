//! Interchain relayer deployment.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::settings::RelayerSettings;
use crate::application::cluster::security::reconcile_security_group;
use crate::application::cluster::service::CloudSet;
use crate::application::provision::pipeline::run_all;
use crate::application::provision::scripts::{self, RelayedChain};
use crate::domain::cluster::ClusterState;
use crate::domain::host::{Host, HostRole};
use crate::domain::id::{BlockchainId, HostId};
use crate::domain::security::IngressRule;
use crate::error::{ConfigError, Error, Result};
use crate::port::outbound::chain::{ChainClient, ChainEndpoint};
use crate::port::outbound::remote::RemoteExecutor;
use crate::port::outbound::store::ClusterStore;

/// Collaborators the relayer stage uses.
pub struct RelayDeployer<'a> {
    pub clouds: &'a CloudSet,
    pub remote: Arc<dyn RemoteExecutor>,
    pub chain: &'a dyn ChainClient,
    pub store: &'a dyn ClusterStore,
    pub settings: &'a RelayerSettings,
    pub security_group: &'a str,
    pub api_port: u16,
    pub command_timeout: Duration,
}

/// Pick the relay host: the one already recorded, else the monitoring host,
/// else the first API host, else the first validator.
#[must_use]
pub fn choose_relay_host<'h>(state: &ClusterState, hosts: &'h [Host]) -> Option<(&'h Host, bool)> {
    let by_id = |id: &HostId| hosts.iter().find(|h| &h.id == id);
    if let Some(existing) = state.relay_host.as_ref().and_then(by_id) {
        return Some((existing, true));
    }
    state
        .monitoring_host
        .as_ref()
        .and_then(by_id)
        .or_else(|| hosts.iter().find(|h| h.role == HostRole::Api))
        .or_else(|| hosts.iter().find(|h| h.role == HostRole::Validator))
        .map(|h| (h, false))
}

impl RelayDeployer<'_> {
    /// Deploy (or redeploy) the relayer for `blockchain` and return the
    /// relay host.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingField`] without a relayer account, or any
    /// cloud, chain or remote failure.
    pub async fn deploy(
        &self,
        state: &mut ClusterState,
        hosts: &[Host],
        endpoint: &ChainEndpoint,
        blockchain: &BlockchainId,
        relayed: &[RelayedChain],
    ) -> Result<HostId> {
        let account = self
            .settings
            .address
            .clone()
            .ok_or(ConfigError::MissingField {
                field: "relayer.address",
            })?;
        let (relay, reused) = choose_relay_host(state, hosts)
            .ok_or_else(|| Error::State(format!("cluster {} has no host for the relayer", state.name)))?;
        let relay_address = relay.require_address()?.to_string();

        if reused {
            self.remote
                .run_command(relay, &scripts::compose_stop(scripts::RELAYER_COMPOSE), self.command_timeout)
                .await?;
            info!(host = %relay.id, "Stopped existing relayer");
        }

        state.relay_host = Some(relay.id.clone());
        self.store.save_cluster(state)?;

        let rule = IngressRule::tcp(self.api_port, relay_address);
        let cloud = self.clouds.get(relay.cloud)?;
        for region in &state.regions {
            reconcile_security_group(cloud.as_ref(), region, self.security_group, std::slice::from_ref(&rule))
                .await?;
        }

        let amount = self.settings.fund_amount;
        let tx = self
            .chain
            .fund_account(endpoint, Some(blockchain), &account, amount)
            .await?;
        info!(chain = %blockchain, tx = %tx, amount, "Relayer funded on subnet chain");
        let tx = self.chain.fund_account(endpoint, None, &account, amount).await?;
        info!(tx = %tx, amount, "Relayer funded on primary chain");

        let commands = [
            scripts::prepare_dirs(),
            scripts::write_file(
                scripts::RELAYER_CONFIG,
                &scripts::relayer_config(&endpoint.url, relayed, &account),
            ),
            scripts::write_file(
                scripts::RELAYER_COMPOSE,
                &scripts::relayer_compose(&self.settings.image),
            ),
            scripts::compose_up(scripts::RELAYER_COMPOSE),
        ];
        run_all(self.remote.as_ref(), relay, &commands, self.command_timeout).await?;
        info!(host = %relay.id, chains = relayed.len(), "Relayer running");
        Ok(relay.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::Utc;

    use super::*;
    use crate::domain::cluster::NetworkKind;
    use crate::domain::host::CloudKind;

    fn host(id: &str, role: HostRole) -> Host {
        Host {
            id: HostId::new(id),
            cloud: CloudKind::Gcp,
            region: "us-east1".into(),
            address: Some(format!("10.0.0.{}", id.len())),
            ssh_user: "ubuntu".into(),
            ssh_key: PathBuf::from("/tmp/key"),
            role,
            node_id: None,
        }
    }

    #[test]
    fn relay_host_preference_order() {
        let mut state = ClusterState::new("c", NetworkKind::Devnet, Utc::now());
        let hosts = vec![
            host("v1", HostRole::Validator),
            host("a1", HostRole::Api),
            host("m1", HostRole::Monitoring),
        ];
        state.add_host(HostId::new("m1"), HostRole::Monitoring);
        assert_eq!(choose_relay_host(&state, &hosts).unwrap().0.id.as_str(), "m1");

        state.monitoring_host = None;
        assert_eq!(choose_relay_host(&state, &hosts).unwrap().0.id.as_str(), "a1");

        assert_eq!(choose_relay_host(&state, &hosts[..1]).unwrap().0.id.as_str(), "v1");

        state.relay_host = Some(HostId::new("v1"));
        let (chosen, reused) = choose_relay_host(&state, &hosts).unwrap();
        assert_eq!(chosen.id.as_str(), "v1");
        assert!(reused);
    }
}
