//! Strongly-typed identifiers.
//!
//! Each identifier wraps a `String` so that host ids, node ids and chain
//! identifiers cannot be mixed up at call sites.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the raw identifier.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Cloud instance id. Doubles as the host identity everywhere in the crate.
    HostId
);

string_id!(
    /// Blockchain node id reported by the node client (`NodeID-...`).
    NodeId
);

string_id!(
    /// Identifier of a subnet on the primary network.
    SubnetId
);

string_id!(
    /// Identifier of a blockchain deployed into a subnet.
    BlockchainId
);

string_id!(
    /// Identifier of an issued transaction.
    TxId
);
