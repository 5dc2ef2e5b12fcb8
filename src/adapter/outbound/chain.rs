//! [`ChainClient`] over node JSON-RPC.
//!
//! Membership queries go straight to the platform chain of the endpoint's
//! node. Transactions need a funded key, which never lives on this machine:
//! they are handed to a signer service that builds, signs and issues them
//! against the same endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::domain::id::{BlockchainId, NodeId, SubnetId, TxId};
use crate::domain::subnet::SubnetDefinition;
use crate::error::{Error, Result};
use crate::port::outbound::chain::{ChainClient, ChainEndpoint, ValidatorEnrollment};

const PLATFORM_PATH: &str = "/ext/bc/P";
const SIGNER_PATH: &str = "/ext/signer";
/// Alias the signer resolves to the primary network's contract chain.
const PRIMARY_CONTRACT_CHAIN: &str = "C";

/// JSON-RPC client for platform queries and signer-issued transactions.
#[derive(Debug, Clone)]
pub struct RpcChainClient {
    client: Client,
    signer_url: Option<String>,
}

impl RpcChainClient {
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(signer_url: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, signer_url })
    }

    fn signer(&self) -> Result<String> {
        self.signer_url
            .as_deref()
            .map(|url| format!("{}{SIGNER_PATH}", url.trim_end_matches('/')))
            .ok_or_else(|| {
                Error::Chain("issuing transactions needs a signer; set chain.signer_url or NODEWIZ_SIGNER_URL".into())
            })
    }

    async fn call<T: DeserializeOwned>(&self, url: &str, method: &str, params: Value) -> Result<T> {
        debug!(url, method, "JSON-RPC call");
        let request = Request {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };
        let response: Response<T> = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        decode(method, response)
    }

    async fn issue(&self, endpoint: &ChainEndpoint, method: &str, mut params: Value) -> Result<TxId> {
        params["endpoint"] = Value::String(endpoint.url.clone());
        params["network"] = Value::String(endpoint.network.to_string());
        let issued: Issued = self.call(&self.signer()?, method, params).await?;
        info!(method, tx = %issued.tx_id, "Transaction issued");
        Ok(TxId::new(issued.tx_id))
    }

    async fn validates(&self, endpoint: &ChainEndpoint, subnet: Option<&SubnetId>, node: &NodeId) -> Result<bool> {
        let url = format!("{}{PLATFORM_PATH}", endpoint.url.trim_end_matches('/'));
        let current: CurrentValidators = self
            .call(&url, "platform.getCurrentValidators", validators_query(subnet, node))
            .await?;
        Ok(current.validators.iter().any(|v| v.node_id == node.as_str()))
    }
}

#[derive(Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct Response<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct Issued {
    #[serde(rename = "txID")]
    tx_id: String,
}

#[derive(Deserialize)]
struct CurrentValidators {
    #[serde(default)]
    validators: Vec<CurrentValidator>,
}

#[derive(Deserialize)]
struct CurrentValidator {
    #[serde(rename = "nodeID")]
    node_id: String,
}

fn decode<T>(method: &str, response: Response<T>) -> Result<T> {
    if let Some(error) = response.error {
        return Err(Error::Chain(format!("{method} failed ({}): {}", error.code, error.message)));
    }
    response
        .result
        .ok_or_else(|| Error::Chain(format!("{method} returned neither result nor error")))
}

fn validators_query(subnet: Option<&SubnetId>, node: &NodeId) -> Value {
    let mut params = json!({ "nodeIDs": [node.as_str()] });
    if let Some(subnet) = subnet {
        params["subnetID"] = Value::String(subnet.as_str().to_string());
    }
    params
}

fn enrollment_params(enrollment: &ValidatorEnrollment) -> Value {
    json!({
        "nodeID": enrollment.node_id.as_str(),
        "weight": enrollment.terms.weight,
        "startTime": enrollment.terms.start.timestamp(),
        "endTime": enrollment.terms.end.timestamp(),
    })
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn is_primary_validator(&self, endpoint: &ChainEndpoint, node: &NodeId) -> Result<bool> {
        self.validates(endpoint, None, node).await
    }

    async fn add_primary_validator(&self, endpoint: &ChainEndpoint, enrollment: &ValidatorEnrollment) -> Result<TxId> {
        self.issue(endpoint, "signer.addPrimaryValidator", enrollment_params(enrollment))
            .await
    }

    async fn create_subnet(&self, endpoint: &ChainEndpoint, definition: &SubnetDefinition) -> Result<SubnetId> {
        let tx = self
            .issue(endpoint, "signer.createSubnet", json!({ "name": definition.name }))
            .await?;
        Ok(SubnetId::new(tx.as_str()))
    }

    async fn create_blockchain(
        &self,
        endpoint: &ChainEndpoint,
        subnet: &SubnetId,
        definition: &SubnetDefinition,
    ) -> Result<BlockchainId> {
        let params = json!({
            "subnetID": subnet.as_str(),
            "name": definition.name,
            "vm": definition.vm.to_string(),
            "evmChainID": definition.evm_chain_id,
            "tokenSymbol": definition.token_symbol,
            "interchainMessaging": definition.relay_ready,
        });
        let tx = self.issue(endpoint, "signer.createBlockchain", params).await?;
        Ok(BlockchainId::new(tx.as_str()))
    }

    async fn is_subnet_validator(&self, endpoint: &ChainEndpoint, subnet: &SubnetId, node: &NodeId) -> Result<bool> {
        self.validates(endpoint, Some(subnet), node).await
    }

    async fn add_subnet_validator(
        &self,
        endpoint: &ChainEndpoint,
        subnet: &SubnetId,
        enrollment: &ValidatorEnrollment,
    ) -> Result<TxId> {
        let mut params = enrollment_params(enrollment);
        params["subnetID"] = Value::String(subnet.as_str().to_string());
        self.issue(endpoint, "signer.addSubnetValidator", params).await
    }

    async fn fund_account(
        &self,
        endpoint: &ChainEndpoint,
        chain: Option<&BlockchainId>,
        address: &str,
        amount: u64,
    ) -> Result<TxId> {
        let params = json!({
            "blockchainID": chain.map_or(PRIMARY_CONTRACT_CHAIN, BlockchainId::as_str),
            "to": address,
            "amount": amount.to_string(),
        });
        self.issue(endpoint, "signer.transfer", params).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::domain::cluster::NetworkKind;
    use crate::domain::validator::ValidatorTerms;

    fn endpoint() -> ChainEndpoint {
        ChainEndpoint {
            network: NetworkKind::Testnet,
            url: "http://127.0.0.1:9".into(),
        }
    }

    #[test]
    fn rpc_error_becomes_chain_error() {
        let response: Response<Issued> =
            serde_json::from_value(json!({ "jsonrpc": "2.0", "id": 1, "error": { "code": -32000, "message": "insufficient funds" } }))
                .unwrap();
        let err = decode("signer.transfer", response).err().unwrap();
        assert!(matches!(&err, Error::Chain(m) if m.contains("insufficient funds")));
    }

    #[test]
    fn result_is_unwrapped() {
        let response: Response<CurrentValidators> = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 1, "result": { "validators": [{ "nodeID": "NodeID-a" }] }
        }))
        .unwrap();
        let current = decode("platform.getCurrentValidators", response).unwrap();
        assert_eq!(current.validators[0].node_id, "NodeID-a");
    }

    #[test]
    fn validator_query_scopes_to_subnet_when_given() {
        let node = NodeId::new("NodeID-a");
        assert!(validators_query(None, &node).get("subnetID").is_none());
        let scoped = validators_query(Some(&SubnetId::new("sub")), &node);
        assert_eq!(scoped["subnetID"], "sub");
        assert_eq!(scoped["nodeIDs"][0], "NodeID-a");
    }

    #[test]
    fn enrollment_uses_unix_seconds() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let enrollment = ValidatorEnrollment {
            node_id: NodeId::new("NodeID-a"),
            terms: ValidatorTerms {
                weight: 20,
                start,
                end: start + chrono::Duration::hours(1),
            },
        };
        let params = enrollment_params(&enrollment);
        assert_eq!(params["startTime"], start.timestamp());
        assert_eq!(params["endTime"], start.timestamp() + 3600);
        assert_eq!(params["weight"], 20);
    }

    #[tokio::test]
    async fn transactions_without_signer_fail_before_any_request() {
        let client = RpcChainClient::new(None, Duration::from_secs(1)).unwrap();
        let err = client
            .fund_account(&endpoint(), None, "0xabc", 1)
            .await
            .unwrap_err();
        assert!(matches!(&err, Error::Chain(m) if m.contains("signer")));
    }
}
