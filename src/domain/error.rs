//! Domain validation errors.
//!
//! Raised when an inventory lookup or a domain invariant fails. These never
//! carry I/O detail; outer layers wrap them in [`crate::error::Error`].

use thiserror::Error;

use super::id::HostId;

/// Errors that occur when domain invariants are violated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A host filter entry matched nothing in the inventory.
    #[error("node {0:?} not found")]
    HostNotFound(String),

    /// The host has no public address yet.
    #[error("host {0} has no resolved public address")]
    AddressUnresolved(HostId),

    /// Two hosts ended up with the same key material.
    #[error("hosts {first} and {second} share staking key material")]
    DuplicateKeyMaterial { first: HostId, second: HostId },

    #[error("unknown cloud provider {0:?}")]
    UnknownCloud(String),

    #[error("unknown network {0:?} (expected mainnet, testnet or devnet)")]
    UnknownNetwork(String),

    #[error("unknown virtual machine {0:?} (expected subnet-evm or custom)")]
    UnknownVm(String),

    /// Key material on disk has the wrong shape.
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
}
