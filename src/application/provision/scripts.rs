//! Shell commands and rendered files run on cluster hosts.
//!
//! Everything lives under [`REMOTE_ROOT`], relative to the remote user's home
//! directory. Services run as containers managed by a compose file per
//! component.

use serde_json::{json, Value};

use crate::domain::cluster::NetworkKind;
use crate::domain::id::{BlockchainId, SubnetId};

pub const REMOTE_ROOT: &str = ".nodewiz";
pub const NODE_COMPOSE: &str = ".nodewiz/node/compose.yml";
pub const NODE_CONFIG: &str = ".nodewiz/node/config.json";
pub const STAKING_DIR: &str = ".nodewiz/staking";
pub const AGENT_COMPOSE: &str = ".nodewiz/agent/compose.yml";
pub const AGENT_CONFIG: &str = ".nodewiz/agent/promtail.yml";
pub const MONITORING_COMPOSE: &str = ".nodewiz/monitoring/compose.yml";
pub const MONITORING_TARGETS: &str = ".nodewiz/monitoring/prometheus.yml";
pub const RELAYER_COMPOSE: &str = ".nodewiz/relayer/compose.yml";
pub const RELAYER_CONFIG: &str = ".nodewiz/relayer/config.json";

/// JSON-RPC methods served by the node client.
pub mod methods {
    pub const HEALTH: &str = "health.health";
    pub const IS_BOOTSTRAPPED: &str = "info.isBootstrapped";
    pub const NODE_VERSION: &str = "info.getNodeVersion";
    pub const NODE_ID: &str = "info.getNodeID";
    pub const BLOCKCHAIN_STATUS: &str = "platform.getBlockchainStatus";
}

/// Container images and ports used on hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSettings {
    pub image: String,
    pub version: String,
    pub api_port: u16,
    pub staking_port: u16,
}

/// Ports and images of the monitoring stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoringSettings {
    pub metrics_port: u16,
    pub dashboard_port: u16,
    pub logs_port: u16,
    pub exporter_port: u16,
}

/// Install the container runtime. Safe to re-run.
#[must_use]
pub fn install_runtime() -> String {
    [
        "command -v docker >/dev/null 2>&1 || {",
        "sudo apt-get update -y &&",
        "sudo apt-get install -y docker.io docker-compose-v2 curl &&",
        "sudo systemctl enable --now docker &&",
        "sudo usermod -aG docker \"$USER\"; }",
    ]
    .join(" ")
}

#[must_use]
pub fn prepare_dirs() -> String {
    format!(
        "mkdir -p {REMOTE_ROOT}/node {STAKING_DIR} {REMOTE_ROOT}/agent {REMOTE_ROOT}/monitoring {REMOTE_ROOT}/relayer && chmod 700 {STAKING_DIR}"
    )
}

#[must_use]
pub fn pull_image(image: &str, version: &str) -> String {
    format!("sudo docker pull {image}:{version}")
}

/// Write `contents` to `path` on the host, replacing it.
#[must_use]
pub fn write_file(path: &str, contents: &str) -> String {
    format!("cat > {path} <<'NODEWIZ_EOF'\n{contents}\nNODEWIZ_EOF")
}

#[must_use]
pub fn compose_up(compose: &str) -> String {
    format!("sudo docker compose -f {compose} up -d")
}

#[must_use]
pub fn compose_restart(compose: &str) -> String {
    format!("sudo docker compose -f {compose} up -d --force-recreate")
}

#[must_use]
pub fn compose_stop(compose: &str) -> String {
    format!("test ! -f {compose} || sudo docker compose -f {compose} stop")
}

fn network_id(network: NetworkKind) -> &'static str {
    match network {
        NetworkKind::Mainnet => "mainnet",
        NetworkKind::Testnet => "fuji",
        NetworkKind::Devnet => "local",
    }
}

/// Node client configuration file. The API listens on every interface; the
/// security group decides who may reach it.
#[must_use]
pub fn node_config(network: NetworkKind, tracked: &[SubnetId]) -> String {
    let tracked: Vec<&str> = tracked.iter().map(SubnetId::as_str).collect();
    let config = json!({
        "network-id": network_id(network),
        "http-host": "0.0.0.0",
        "http-allowed-hosts": "*",
        "track-subnets": tracked.join(","),
        "staking-tls-key-file": "/root/.avalanchego/staking/staker.key",
        "staking-signer-key-file": "/root/.avalanchego/staking/signer.key",
        "index-enabled": true,
    });
    serde_json::to_string_pretty(&config).unwrap_or_else(|_| config.to_string())
}

/// Compose file running the node client.
#[must_use]
pub fn node_compose(node: &NodeSettings) -> String {
    format!(
        "services:
  node:
    image: {image}:{version}
    restart: unless-stopped
    command: [\"--config-file=/root/.avalanchego/configs/config.json\"]
    ports:
      - \"{api}:{api}\"
      - \"{staking}:{staking}\"
    volumes:
      - ../node/config.json:/root/.avalanchego/configs/config.json:ro
      - ../staking:/root/.avalanchego/staking:ro
      - node-db:/root/.avalanchego/db
volumes:
  node-db: {{}}",
        image = node.image,
        version = node.version,
        api = node.api_port,
        staking = node.staking_port,
    )
}

/// Log shipping agent configuration pointed at the monitoring host.
#[must_use]
pub fn agent_config(monitoring_address: &str, logs_port: u16, host_label: &str) -> String {
    format!(
        "server:
  http_listen_port: 9080
clients:
  - url: http://{monitoring_address}:{logs_port}/loki/api/v1/push
scrape_configs:
  - job_name: node
    static_configs:
      - targets: [localhost]
        labels:
          host: {host_label}
          __path__: /var/lib/docker/containers/*/*.log"
    )
}

/// Compose file running the metrics exporter and log agent.
#[must_use]
pub fn agent_compose(monitoring: &MonitoringSettings) -> String {
    format!(
        "services:
  exporter:
    image: prom/node-exporter:latest
    restart: unless-stopped
    ports:
      - \"{port}:9100\"
  promtail:
    image: grafana/promtail:latest
    restart: unless-stopped
    command: [\"-config.file=/etc/promtail/promtail.yml\"]
    volumes:
      - ./promtail.yml:/etc/promtail/promtail.yml:ro
      - /var/lib/docker/containers:/var/lib/docker/containers:ro",
        port = monitoring.exporter_port,
    )
}

/// Scrape targets for every node host.
#[must_use]
pub fn monitoring_targets(addresses: &[String], node: &NodeSettings, monitoring: &MonitoringSettings) -> String {
    let node_targets: Vec<String> = addresses
        .iter()
        .map(|a| format!("'{a}:{}'", node.api_port))
        .collect();
    let exporter_targets: Vec<String> = addresses
        .iter()
        .map(|a| format!("'{a}:{}'", monitoring.exporter_port))
        .collect();
    format!(
        "global:
  scrape_interval: 15s
scrape_configs:
  - job_name: node
    metrics_path: /ext/metrics
    static_configs:
      - targets: [{}]
  - job_name: machine
    static_configs:
      - targets: [{}]",
        node_targets.join(", "),
        exporter_targets.join(", ")
    )
}

/// Compose file for the monitoring host.
#[must_use]
pub fn monitoring_compose(monitoring: &MonitoringSettings) -> String {
    format!(
        "services:
  prometheus:
    image: prom/prometheus:latest
    restart: unless-stopped
    ports:
      - \"{metrics}:9090\"
    volumes:
      - ./prometheus.yml:/etc/prometheus/prometheus.yml:ro
  loki:
    image: grafana/loki:latest
    restart: unless-stopped
    ports:
      - \"{logs}:3100\"
  grafana:
    image: grafana/grafana:latest
    restart: unless-stopped
    ports:
      - \"{dashboard}:3000\"",
        metrics = monitoring.metrics_port,
        logs = monitoring.logs_port,
        dashboard = monitoring.dashboard_port,
    )
}

/// One chain the relayer listens to and delivers on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayedChain {
    pub subnet_id: SubnetId,
    pub blockchain_id: BlockchainId,
    pub rpc_url: String,
}

/// Relayer configuration covering every relayed chain.
#[must_use]
pub fn relayer_config(api_url: &str, chains: &[RelayedChain], account: &str) -> String {
    let blockchains: Vec<Value> = chains
        .iter()
        .map(|c| {
            json!({
                "subnet-id": c.subnet_id.as_str(),
                "blockchain-id": c.blockchain_id.as_str(),
                "rpc-endpoint": { "base-url": c.rpc_url },
            })
        })
        .collect();
    let config = json!({
        "info-api": { "base-url": api_url },
        "p-chain-api": { "base-url": api_url },
        "source-blockchains": blockchains,
        "destination-blockchains": blockchains,
        "account-address": account,
    });
    serde_json::to_string_pretty(&config).unwrap_or_else(|_| config.to_string())
}

#[must_use]
pub fn relayer_compose(image: &str) -> String {
    format!(
        "services:
  relayer:
    image: {image}
    restart: unless-stopped
    command: [\"--config-file=/etc/relayer/config.json\"]
    volumes:
      - ./config.json:/etc/relayer/config.json:ro"
    )
}

/// `curl` invocation of a node JSON-RPC method against the local API.
#[must_use]
pub fn rpc_call(api_port: u16, path: &str, method: &str, params: &Value) -> String {
    let body = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });
    format!(
        "curl -s -X POST --data '{body}' -H 'content-type:application/json;' 127.0.0.1:{api_port}/ext/{path}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_call_embeds_method_and_port() {
        let cmd = rpc_call(9650, "health", methods::HEALTH, &json!({}));
        assert!(cmd.contains("\"method\":\"health.health\""));
        assert!(cmd.ends_with("127.0.0.1:9650/ext/health"));
    }

    #[test]
    fn node_config_lists_tracked_subnets() {
        let config = node_config(
            NetworkKind::Testnet,
            &[SubnetId::new("s1"), SubnetId::new("s2")],
        );
        let parsed: Value = serde_json::from_str(&config).unwrap();
        assert_eq!(parsed["track-subnets"], "s1,s2");
        assert_eq!(parsed["network-id"], "fuji");
    }

    #[test]
    fn write_file_uses_quoted_heredoc() {
        let cmd = write_file("a.txt", "$HOME");
        assert!(cmd.starts_with("cat > a.txt <<'NODEWIZ_EOF'"));
        assert!(cmd.contains("\n$HOME\n"));
    }

    #[test]
    fn relayer_config_covers_all_chains() {
        let chains = vec![
            RelayedChain {
                subnet_id: SubnetId::new("s1"),
                blockchain_id: BlockchainId::new("b1"),
                rpc_url: "http://127.0.0.1:9650/ext/bc/b1/rpc".into(),
            },
            RelayedChain {
                subnet_id: SubnetId::new("s2"),
                blockchain_id: BlockchainId::new("b2"),
                rpc_url: "http://127.0.0.1:9650/ext/bc/b2/rpc".into(),
            },
        ];
        let config: Value =
            serde_json::from_str(&relayer_config("http://127.0.0.1:9650", &chains, "0xabc")).unwrap();
        assert_eq!(config["source-blockchains"].as_array().unwrap().len(), 2);
        assert_eq!(config["account-address"], "0xabc");
    }
}
