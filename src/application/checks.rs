//! Node status probes.
//!
//! Each probe runs a JSON-RPC call against the node's local API over the
//! remote executor and parses the reply. Parsing is split out into plain
//! functions so it can be tested without a host.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use super::provision::scripts::{methods, rpc_call};
use crate::domain::host::Host;
use crate::domain::id::{BlockchainId, NodeId};
use crate::error::{Error, Result};
use crate::port::outbound::remote::RemoteExecutor;

/// Sync state of one blockchain as reported by a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStatus {
    Validating,
    Syncing,
    Created,
    Preferred,
    Unknown(String),
}

impl ChainStatus {
    fn parse(raw: &str) -> Self {
        match raw {
            "Validating" => Self::Validating,
            "Syncing" => Self::Syncing,
            "Created" => Self::Created,
            "Preferred" => Self::Preferred,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The node tracks the chain, validating or not.
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        matches!(self, Self::Validating | Self::Syncing)
    }
}

impl std::fmt::Display for ChainStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validating => f.write_str("validating"),
            Self::Syncing => f.write_str("syncing"),
            Self::Created => f.write_str("created"),
            Self::Preferred => f.write_str("preferred"),
            Self::Unknown(s) => write!(f, "unknown ({s})"),
        }
    }
}

/// Queries a node client through [`RemoteExecutor`].
#[derive(Clone)]
pub struct NodeProbe {
    remote: Arc<dyn RemoteExecutor>,
    api_port: u16,
    timeout: Duration,
}

impl NodeProbe {
    pub fn new(remote: Arc<dyn RemoteExecutor>, api_port: u16, timeout: Duration) -> Self {
        Self {
            remote,
            api_port,
            timeout,
        }
    }

    async fn call(&self, host: &Host, path: &str, method: &str, params: Value) -> Result<Value> {
        let command = rpc_call(self.api_port, path, method, &params);
        let output = self.remote.run_command(host, &command, self.timeout).await?;
        parse_result(host, method, &output)
    }

    pub async fn health(&self, host: &Host) -> Result<bool> {
        let result = self.call(host, "health", methods::HEALTH, json!({})).await?;
        Ok(result["healthy"].as_bool().unwrap_or(false))
    }

    /// Whether the primary network's platform chain has bootstrapped.
    pub async fn bootstrapped(&self, host: &Host) -> Result<bool> {
        let result = self
            .call(host, "info", methods::IS_BOOTSTRAPPED, json!({ "chain": "P" }))
            .await?;
        Ok(result["isBootstrapped"].as_bool().unwrap_or(false))
    }

    pub async fn rpc_version(&self, host: &Host) -> Result<u32> {
        let result = self.call(host, "info", methods::NODE_VERSION, json!({})).await?;
        parse_rpc_version(&result).ok_or_else(|| Error::Remote {
            host: host.id.clone(),
            message: format!("no rpcProtocolVersion in {}", methods::NODE_VERSION),
        })
    }

    pub async fn node_id(&self, host: &Host) -> Result<NodeId> {
        let result = self.call(host, "info", methods::NODE_ID, json!({})).await?;
        result["nodeID"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(NodeId::new)
            .ok_or_else(|| Error::Remote {
                host: host.id.clone(),
                message: format!("no nodeID in {}", methods::NODE_ID),
            })
    }

    pub async fn blockchain_status(&self, host: &Host, chain: &BlockchainId) -> Result<ChainStatus> {
        let result = self
            .call(
                host,
                "P",
                methods::BLOCKCHAIN_STATUS,
                json!({ "blockchainID": chain.as_str() }),
            )
            .await?;
        Ok(ChainStatus::parse(result["status"].as_str().unwrap_or_default()))
    }
}

/// Extract `result` from a JSON-RPC reply, mapping an `error` object or a
/// malformed body to [`Error::Remote`].
pub fn parse_result(host: &Host, method: &str, output: &str) -> Result<Value> {
    let reply: Value = serde_json::from_str(output.trim()).map_err(|e| Error::Remote {
        host: host.id.clone(),
        message: format!("{method}: unreadable reply ({e})"),
    })?;
    if let Some(err) = reply.get("error") {
        let message = err["message"].as_str().unwrap_or("unknown error");
        return Err(Error::Remote {
            host: host.id.clone(),
            message: format!("{method}: {message}"),
        });
    }
    reply.get("result").cloned().ok_or_else(|| Error::Remote {
        host: host.id.clone(),
        message: format!("{method}: reply has no result"),
    })
}

/// Node clients report the version either as a number or a numeric string.
#[must_use]
pub fn parse_rpc_version(result: &Value) -> Option<u32> {
    match &result["rpcProtocolVersion"] {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::domain::host::{CloudKind, HostRole};
    use crate::domain::id::HostId;

    fn host() -> Host {
        Host {
            id: HostId::new("i-1"),
            cloud: CloudKind::Aws,
            region: "us-east-1".into(),
            address: Some("10.0.0.1".into()),
            ssh_user: "ubuntu".into(),
            ssh_key: PathBuf::from("/tmp/key"),
            role: HostRole::Validator,
            node_id: None,
        }
    }

    #[test]
    fn result_is_extracted() {
        let value = parse_result(&host(), "health.health", r#"{"result":{"healthy":true}}"#).unwrap();
        assert_eq!(value["healthy"], true);
    }

    #[test]
    fn rpc_error_becomes_remote_error() {
        let err = parse_result(
            &host(),
            "info.getNodeID",
            r#"{"error":{"code":-32000,"message":"not ready"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Remote { ref message, .. } if message.contains("not ready")));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_result(&host(), "health.health", "curl: (7) refused").is_err());
    }

    #[test]
    fn rpc_version_accepts_number_or_string() {
        assert_eq!(parse_rpc_version(&json!({"rpcProtocolVersion": 35})), Some(35));
        assert_eq!(parse_rpc_version(&json!({"rpcProtocolVersion": "36"})), Some(36));
        assert_eq!(parse_rpc_version(&json!({})), None);
    }

    #[test]
    fn chain_status_tracks_syncing_and_validating() {
        assert!(ChainStatus::parse("Syncing").is_tracking());
        assert!(ChainStatus::parse("Validating").is_tracking());
        assert!(!ChainStatus::parse("Created").is_tracking());
        assert_eq!(ChainStatus::parse(""), ChainStatus::Unknown(String::new()));
    }
}
