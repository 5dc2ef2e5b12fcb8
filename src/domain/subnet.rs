//! Locally defined subnets.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Virtual machine a subnet's blockchain runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum VmKind {
    #[default]
    SubnetEvm,
    Custom,
}

impl fmt::Display for VmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SubnetEvm => f.write_str("subnet-evm"),
            Self::Custom => f.write_str("custom"),
        }
    }
}

impl FromStr for VmKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "subnet-evm" | "evm" => Ok(Self::SubnetEvm),
            "custom" => Ok(Self::Custom),
            other => Err(DomainError::UnknownVm(other.to_string())),
        }
    }
}

/// A subnet as defined on the operator's machine, before or after deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetDefinition {
    pub name: String,
    pub vm: VmKind,
    /// RPC protocol version every validator's node client must speak.
    pub rpc_version: u32,
    #[serde(default)]
    pub evm_chain_id: Option<u64>,
    #[serde(default)]
    pub token_symbol: Option<String>,
    /// Whether the chain is set up for interchain messaging.
    #[serde(default)]
    pub relay_ready: bool,
    pub created_at: DateTime<Utc>,
}

/// Operator's description of a subnet to define.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetSpec {
    pub name: String,
    pub vm: VmKind,
    pub rpc_version: u32,
    pub evm_chain_id: Option<u64>,
    pub token_symbol: Option<String>,
    pub relay_ready: bool,
}

impl SubnetSpec {
    /// Turn the request into a stored definition.
    #[must_use]
    pub fn define(&self, created_at: DateTime<Utc>) -> SubnetDefinition {
        SubnetDefinition {
            name: self.name.clone(),
            vm: self.vm,
            rpc_version: self.rpc_version,
            evm_chain_id: self.evm_chain_id,
            token_symbol: self.token_symbol.clone(),
            relay_ready: self.relay_ready,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vm_kind_round_trips_kebab_case() {
        let json = serde_json::to_string(&VmKind::SubnetEvm).unwrap();
        assert_eq!(json, "\"subnet-evm\"");
        assert_eq!("evm".parse::<VmKind>().unwrap(), VmKind::SubnetEvm);
    }

    #[test]
    fn define_copies_spec_fields() {
        let spec = SubnetSpec {
            name: "demo".into(),
            vm: VmKind::SubnetEvm,
            rpc_version: 35,
            evm_chain_id: Some(7777),
            token_symbol: Some("DEMO".into()),
            relay_ready: true,
        };
        let def = spec.define(Utc::now());
        assert_eq!(def.name, "demo");
        assert_eq!(def.rpc_version, 35);
        assert!(def.relay_ready);
    }
}
