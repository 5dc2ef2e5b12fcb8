//! Simulated hosts answering over the remote port.
//!
//! [`FakeFleet`] interprets the shell commands the provisioning code sends:
//! file writes land in a per-host file table, `docker compose up` on the node
//! compose file starts a simulated node, and `curl` JSON-RPC calls are
//! answered from the node's simulated state.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::chain::FakeChain;
use crate::application::provision::scripts::{self, methods};
use crate::domain::host::Host;
use crate::domain::id::{BlockchainId, HostId, NodeId, SubnetId};
use crate::error::{Error, Result};
use crate::port::outbound::remote::{CopyDirection, RemoteExecutor};

/// Default RPC protocol version every simulated node speaks.
pub const DEFAULT_RPC_VERSION: u32 = 35;

#[derive(Debug, Default)]
struct NodeSim {
    started: bool,
    restarts: u32,
    configured: Vec<SubnetId>,
    tracked: Vec<SubnetId>,
    files: BTreeMap<String, String>,
}

#[derive(Default)]
struct FleetState {
    nodes: BTreeMap<HostId, NodeSim>,
    commands: Vec<(HostId, String)>,
    uploads: Vec<(HostId, String)>,
    /// Health probes left before a slow host reports healthy.
    warming: BTreeMap<HostId, u32>,
}

/// Scripted [`RemoteExecutor`] standing in for a fleet of hosts.
pub struct FakeFleet {
    chain: Arc<FakeChain>,
    state: Mutex<FleetState>,
    unreachable: BTreeSet<HostId>,
    unhealthy: BTreeSet<HostId>,
    unbootstrapped: BTreeSet<HostId>,
    never_syncing: BTreeSet<HostId>,
    never_validating: BTreeSet<HostId>,
    rpc_versions: BTreeMap<HostId, u32>,
    failing: Vec<(Option<HostId>, String)>,
    connects: AtomicU32,
}

/// Node id a simulated host reports.
pub fn node_id_for(host: &HostId) -> NodeId {
    NodeId::new(format!("NodeID-{host}"))
}

impl FakeFleet {
    pub fn new(chain: Arc<FakeChain>) -> Self {
        Self {
            chain,
            state: Mutex::new(FleetState::default()),
            unreachable: BTreeSet::new(),
            unhealthy: BTreeSet::new(),
            unbootstrapped: BTreeSet::new(),
            never_syncing: BTreeSet::new(),
            never_validating: BTreeSet::new(),
            rpc_versions: BTreeMap::new(),
            failing: Vec::new(),
            connects: AtomicU32::new(0),
        }
    }

    /// SSH never comes up on `host`.
    pub fn with_unreachable(mut self, host: &str) -> Self {
        self.unreachable.insert(HostId::new(host));
        self
    }

    /// The node on `host` never reports healthy.
    pub fn with_unhealthy(mut self, host: &str) -> Self {
        self.unhealthy.insert(HostId::new(host));
        self
    }

    /// The node on `host` reports unhealthy for the first `probes` checks.
    pub fn with_slow_health(self, host: &str, probes: u32) -> Self {
        self.state.lock().warming.insert(HostId::new(host), probes);
        self
    }

    pub fn with_unbootstrapped(mut self, host: &str) -> Self {
        self.unbootstrapped.insert(HostId::new(host));
        self
    }

    /// The node on `host` never starts syncing a tracked chain.
    pub fn with_never_syncing(mut self, host: &str) -> Self {
        self.never_syncing.insert(HostId::new(host));
        self
    }

    /// The node on `host` keeps syncing even once it is a chain validator.
    pub fn with_never_validating(mut self, host: &str) -> Self {
        self.never_validating.insert(HostId::new(host));
        self
    }

    pub fn with_rpc_version(mut self, host: &str, version: u32) -> Self {
        self.rpc_versions.insert(HostId::new(host), version);
        self
    }

    /// Commands containing `needle` fail, on `host` or on every host.
    pub fn with_failing_command(mut self, host: Option<&str>, needle: &str) -> Self {
        self.failing.push((host.map(HostId::new), needle.to_string()));
        self
    }

    /// Every command run on `host`, in order.
    pub fn commands_on(&self, host: &HostId) -> Vec<String> {
        self.state
            .lock()
            .commands
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn command_count(&self) -> usize {
        self.state.lock().commands.len()
    }

    /// Remote paths uploaded to `host`.
    pub fn uploads_to(&self, host: &HostId) -> Vec<String> {
        self.state
            .lock()
            .uploads
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Last contents written to `path` on `host`.
    pub fn file(&self, host: &HostId, path: &str) -> Option<String> {
        self.state
            .lock()
            .nodes
            .get(host)
            .and_then(|n| n.files.get(path).cloned())
    }

    pub fn is_running(&self, host: &HostId) -> bool {
        self.state.lock().nodes.get(host).is_some_and(|n| n.started)
    }

    /// Times the node on `host` was force-recreated.
    pub fn restarts(&self, host: &HostId) -> u32 {
        self.state.lock().nodes.get(host).map_or(0, |n| n.restarts)
    }

    pub fn tracked(&self, host: &HostId) -> Vec<SubnetId> {
        self.state
            .lock()
            .nodes
            .get(host)
            .map(|n| n.tracked.clone())
            .unwrap_or_default()
    }

    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    fn injected_failure(&self, host: &Host, command: &str) -> Option<Error> {
        self.failing
            .iter()
            .find(|(target, needle)| {
                target.as_ref().map_or(true, |t| t == &host.id) && command.contains(needle.as_str())
            })
            .map(|(_, needle)| Error::Remote {
                host: host.id.clone(),
                message: format!("`{needle}` exited with status 1"),
            })
    }

    fn write_file(&self, host: &Host, command: &str) {
        let Some((header, rest)) = command.split_once('\n') else {
            return;
        };
        let path = header
            .trim_start_matches("cat > ")
            .split(" <<")
            .next()
            .unwrap_or_default()
            .to_string();
        let contents = rest.strip_suffix("\nNODEWIZ_EOF").unwrap_or(rest).to_string();

        let mut state = self.state.lock();
        let node = state.nodes.entry(host.id.clone()).or_default();
        if path == scripts::NODE_CONFIG {
            node.configured = serde_json::from_str::<Value>(&contents)
                .ok()
                .and_then(|v| v["track-subnets"].as_str().map(str::to_string))
                .map(|list| {
                    list.split(',')
                        .filter(|s| !s.is_empty())
                        .map(SubnetId::new)
                        .collect()
                })
                .unwrap_or_default();
        }
        node.files.insert(path, contents);
    }

    fn start_node(&self, host: &Host, restart: bool) {
        let mut state = self.state.lock();
        let node = state.nodes.entry(host.id.clone()).or_default();
        node.started = true;
        node.tracked = node.configured.clone();
        if restart {
            node.restarts += 1;
        }
    }

    fn answer_rpc(&self, host: &Host, command: &str) -> Result<String> {
        let refused = || Error::Remote {
            host: host.id.clone(),
            message: "curl: (7) connection refused".into(),
        };
        if !self.is_running(&host.id) {
            return Err(refused());
        }

        let body: Value = command
            .split_once("--data '")
            .and_then(|(_, rest)| rest.split_once('\''))
            .and_then(|(data, _)| serde_json::from_str(data).ok())
            .ok_or_else(refused)?;
        let method = body["method"].as_str().unwrap_or_default();

        let result = match method {
            methods::HEALTH => json!({ "healthy": self.healthy(&host.id) }),
            methods::IS_BOOTSTRAPPED => {
                json!({ "isBootstrapped": !self.unbootstrapped.contains(&host.id) })
            }
            methods::NODE_VERSION => {
                let version = self
                    .rpc_versions
                    .get(&host.id)
                    .copied()
                    .unwrap_or(DEFAULT_RPC_VERSION);
                json!({ "version": "node/1.11.0", "rpcProtocolVersion": version })
            }
            methods::NODE_ID => json!({ "nodeID": node_id_for(&host.id).as_str() }),
            methods::BLOCKCHAIN_STATUS => {
                let chain = BlockchainId::new(body["params"]["blockchainID"].as_str().unwrap_or_default());
                json!({ "status": self.chain_status(&host.id, &chain) })
            }
            other => {
                return Ok(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": { "code": -32601, "message": format!("method {other} not found") }
                })
                .to_string())
            }
        };
        Ok(json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string())
    }

    fn healthy(&self, host: &HostId) -> bool {
        if self.unhealthy.contains(host) {
            return false;
        }
        let mut state = self.state.lock();
        match state.warming.get_mut(host) {
            Some(left) if *left > 0 => {
                *left -= 1;
                false
            }
            _ => true,
        }
    }

    fn chain_status(&self, host: &HostId, chain: &BlockchainId) -> &'static str {
        let Some(subnet) = self.chain.subnet_of(chain) else {
            return "Unknown";
        };
        if !self.tracked(host).contains(&subnet) || self.never_syncing.contains(host) {
            return "Created";
        }
        if self.chain.validates_chain(chain, &node_id_for(host)) && !self.never_validating.contains(host) {
            "Validating"
        } else {
            "Syncing"
        }
    }
}

#[async_trait]
impl RemoteExecutor for FakeFleet {
    async fn connect(&self, _host: &Host, _timeout: Duration) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn run_command(&self, host: &Host, command: &str, _timeout: Duration) -> Result<String> {
        self.state
            .lock()
            .commands
            .push((host.id.clone(), command.to_string()));
        if let Some(err) = self.injected_failure(host, command) {
            return Err(err);
        }

        if command.starts_with("cat > ") {
            self.write_file(host, command);
            return Ok(String::new());
        }
        if command.starts_with("curl ") {
            return self.answer_rpc(host, command);
        }
        if command == scripts::compose_up(scripts::NODE_COMPOSE) {
            self.start_node(host, false);
        } else if command == scripts::compose_restart(scripts::NODE_COMPOSE) {
            self.start_node(host, true);
        }
        Ok(String::new())
    }

    async fn copy_file(
        &self,
        host: &Host,
        _local: &Path,
        remote: &str,
        _direction: CopyDirection,
        _timeout: Duration,
    ) -> Result<()> {
        self.state
            .lock()
            .uploads
            .push((host.id.clone(), remote.to_string()));
        Ok(())
    }

    async fn wait_for_port(&self, host: &Host, port: u16, timeout: Duration) -> Result<()> {
        if self.unreachable.contains(&host.id) {
            return Err(Error::Unreachable {
                host: host.id.clone(),
                port,
                timeout,
            });
        }
        Ok(())
    }
}
