//! Chain client port: membership queries and transaction issuance.

use async_trait::async_trait;

use crate::domain::cluster::NetworkKind;
use crate::domain::id::{BlockchainId, NodeId, SubnetId, TxId};
use crate::domain::subnet::SubnetDefinition;
use crate::domain::validator::ValidatorTerms;
use crate::error::Result;

/// Where chain requests for a cluster go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEndpoint {
    pub network: NetworkKind,
    /// Base URL of a node API, e.g. `http://10.0.0.1:9650`.
    pub url: String,
}

/// A validator to enroll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorEnrollment {
    pub node_id: NodeId,
    pub terms: ValidatorTerms,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn is_primary_validator(&self, endpoint: &ChainEndpoint, node: &NodeId) -> Result<bool>;

    async fn add_primary_validator(
        &self,
        endpoint: &ChainEndpoint,
        enrollment: &ValidatorEnrollment,
    ) -> Result<TxId>;

    async fn create_subnet(
        &self,
        endpoint: &ChainEndpoint,
        definition: &SubnetDefinition,
    ) -> Result<SubnetId>;

    async fn create_blockchain(
        &self,
        endpoint: &ChainEndpoint,
        subnet: &SubnetId,
        definition: &SubnetDefinition,
    ) -> Result<BlockchainId>;

    async fn is_subnet_validator(
        &self,
        endpoint: &ChainEndpoint,
        subnet: &SubnetId,
        node: &NodeId,
    ) -> Result<bool>;

    async fn add_subnet_validator(
        &self,
        endpoint: &ChainEndpoint,
        subnet: &SubnetId,
        enrollment: &ValidatorEnrollment,
    ) -> Result<TxId>;

    /// Transfer `amount` to `address`, on `chain` or on the primary network's
    /// contract chain when `chain` is `None`.
    async fn fund_account(
        &self,
        endpoint: &ChainEndpoint,
        chain: Option<&BlockchainId>,
        address: &str,
        amount: u64,
    ) -> Result<TxId>;
}
