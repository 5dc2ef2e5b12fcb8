//! In-memory chain.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::id::{BlockchainId, NodeId, SubnetId, TxId};
use crate::domain::subnet::SubnetDefinition;
use crate::domain::validator::ValidatorTerms;
use crate::error::{Error, Result};
use crate::port::outbound::chain::{ChainClient, ChainEndpoint, ValidatorEnrollment};

/// One accepted enrollment transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrollment {
    pub node: NodeId,
    /// `None` for the primary network.
    pub subnet: Option<SubnetId>,
    pub terms: ValidatorTerms,
}

/// One accepted transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Funding {
    pub chain: Option<BlockchainId>,
    pub address: String,
    pub amount: u64,
}

#[derive(Default)]
struct Ledger {
    next_tx: u32,
    primary: BTreeSet<NodeId>,
    subnets: BTreeMap<SubnetId, BTreeSet<NodeId>>,
    blockchains: BTreeMap<BlockchainId, SubnetId>,
    enrollments: Vec<Enrollment>,
    fundings: Vec<Funding>,
}

impl Ledger {
    fn tx(&mut self) -> TxId {
        self.next_tx += 1;
        TxId::new(format!("tx-{:04}", self.next_tx))
    }
}

/// Scripted [`ChainClient`] that keeps validator sets in memory.
///
/// Shared with [`super::fleet::FakeFleet`] so simulated nodes report
/// `Validating` only once the chain lists them.
#[derive(Default)]
pub struct FakeChain {
    ledger: Mutex<Ledger>,
    rejected: BTreeSet<NodeId>,
    subnet_calls: AtomicU32,
    blockchain_calls: AtomicU32,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enrollment transactions for `node` are rejected.
    pub fn with_rejected_node(mut self, node: &str) -> Self {
        self.rejected.insert(NodeId::new(node));
        self
    }

    /// Make `node` a primary network validator up front.
    pub fn with_primary_validator(self, node: &str) -> Self {
        self.ledger.lock().primary.insert(NodeId::new(node));
        self
    }

    pub fn enrollments(&self) -> Vec<Enrollment> {
        self.ledger.lock().enrollments.clone()
    }

    pub fn fundings(&self) -> Vec<Funding> {
        self.ledger.lock().fundings.clone()
    }

    pub fn subnet_calls(&self) -> u32 {
        self.subnet_calls.load(Ordering::SeqCst)
    }

    pub fn blockchain_calls(&self) -> u32 {
        self.blockchain_calls.load(Ordering::SeqCst)
    }

    pub fn is_primary(&self, node: &NodeId) -> bool {
        self.ledger.lock().primary.contains(node)
    }

    /// Whether `node` validates the subnet that owns `blockchain`.
    pub fn validates_chain(&self, blockchain: &BlockchainId, node: &NodeId) -> bool {
        let ledger = self.ledger.lock();
        ledger
            .blockchains
            .get(blockchain)
            .and_then(|subnet| ledger.subnets.get(subnet))
            .is_some_and(|members| members.contains(node))
    }

    /// Subnet a blockchain was deployed into.
    pub fn subnet_of(&self, blockchain: &BlockchainId) -> Option<SubnetId> {
        self.ledger.lock().blockchains.get(blockchain).cloned()
    }

    fn check_rejected(&self, node: &NodeId) -> Result<()> {
        if self.rejected.contains(node) {
            return Err(Error::Chain(format!("transaction for {node} rejected: insufficient funds")));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn is_primary_validator(&self, _endpoint: &ChainEndpoint, node: &NodeId) -> Result<bool> {
        Ok(self.is_primary(node))
    }

    async fn add_primary_validator(
        &self,
        _endpoint: &ChainEndpoint,
        enrollment: &ValidatorEnrollment,
    ) -> Result<TxId> {
        self.check_rejected(&enrollment.node_id)?;
        let mut ledger = self.ledger.lock();
        ledger.primary.insert(enrollment.node_id.clone());
        ledger.enrollments.push(Enrollment {
            node: enrollment.node_id.clone(),
            subnet: None,
            terms: enrollment.terms.clone(),
        });
        Ok(ledger.tx())
    }

    async fn create_subnet(
        &self,
        _endpoint: &ChainEndpoint,
        definition: &SubnetDefinition,
    ) -> Result<SubnetId> {
        let n = self.subnet_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let id = SubnetId::new(format!("subnet-{}-{n}", definition.name));
        self.ledger.lock().subnets.entry(id.clone()).or_default();
        Ok(id)
    }

    async fn create_blockchain(
        &self,
        _endpoint: &ChainEndpoint,
        subnet: &SubnetId,
        definition: &SubnetDefinition,
    ) -> Result<BlockchainId> {
        let n = self.blockchain_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let mut ledger = self.ledger.lock();
        if !ledger.subnets.contains_key(subnet) {
            return Err(Error::Chain(format!("subnet {subnet} does not exist")));
        }
        let id = BlockchainId::new(format!("chain-{}-{n}", definition.name));
        ledger.blockchains.insert(id.clone(), subnet.clone());
        Ok(id)
    }

    async fn is_subnet_validator(
        &self,
        _endpoint: &ChainEndpoint,
        subnet: &SubnetId,
        node: &NodeId,
    ) -> Result<bool> {
        Ok(self
            .ledger
            .lock()
            .subnets
            .get(subnet)
            .is_some_and(|members| members.contains(node)))
    }

    async fn add_subnet_validator(
        &self,
        _endpoint: &ChainEndpoint,
        subnet: &SubnetId,
        enrollment: &ValidatorEnrollment,
    ) -> Result<TxId> {
        self.check_rejected(&enrollment.node_id)?;
        let mut ledger = self.ledger.lock();
        if !ledger.primary.contains(&enrollment.node_id) {
            return Err(Error::Chain(format!(
                "{} must validate the primary network first",
                enrollment.node_id
            )));
        }
        let members = ledger
            .subnets
            .get_mut(subnet)
            .ok_or_else(|| Error::Chain(format!("subnet {subnet} does not exist")))?;
        members.insert(enrollment.node_id.clone());
        ledger.enrollments.push(Enrollment {
            node: enrollment.node_id.clone(),
            subnet: Some(subnet.clone()),
            terms: enrollment.terms.clone(),
        });
        Ok(ledger.tx())
    }

    async fn fund_account(
        &self,
        _endpoint: &ChainEndpoint,
        chain: Option<&BlockchainId>,
        address: &str,
        amount: u64,
    ) -> Result<TxId> {
        let mut ledger = self.ledger.lock();
        ledger.fundings.push(Funding {
            chain: chain.cloned(),
            address: address.to_string(),
            amount,
        });
        Ok(ledger.tx())
    }
}
