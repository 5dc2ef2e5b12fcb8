use std::collections::BTreeMap;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::cluster::{NetworkKind, RollbackReport};
use crate::domain::error::DomainError;
use crate::domain::gate::GateKind;
use crate::domain::host::CloudKind;
use crate::domain::id::HostId;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("cluster {0:?} not found")]
    #[diagnostic(help("run `nodewiz cluster list` to see known clusters"))]
    ClusterNotFound(String),

    #[error("cluster {cluster} is a {stored} cluster, not {requested}")]
    NetworkMismatch {
        cluster: String,
        stored: NetworkKind,
        requested: NetworkKind,
    },

    #[error("expecting to add subnet to existing cluster {0} but no subnet name was provided")]
    MissingSubnet(String),

    #[error("subnet {0:?} is not defined")]
    SubnetNotDefined(String),

    #[error("{provider} request failed: {message}")]
    Cloud { provider: CloudKind, message: String },

    #[error("{provider} credentials have expired: {detail}")]
    #[diagnostic(code(nodewiz::credentials_expired), help("{remediation}"))]
    CredentialExpired {
        provider: CloudKind,
        detail: String,
        remediation: String,
    },

    #[error("command failed on {host}: {message}")]
    Remote { host: HostId, message: String },

    #[error("{host} not reachable on port {port} after {}s", timeout.as_secs())]
    Unreachable {
        host: HostId,
        port: u16,
        timeout: Duration,
    },

    #[error("chain request failed: {0}")]
    Chain(String),

    #[error("cluster provisioning failed: {source}; {rollback}")]
    #[diagnostic(forward(source))]
    Provisioning {
        source: Box<Error>,
        rollback: RollbackReport,
    },

    #[error("{stage} failed on {} host(s): {}", failures.len(), render_hosts(failures))]
    HostFailures {
        stage: String,
        failures: BTreeMap<HostId, String>,
    },

    #[error(
        "cluster not {gate} after {} seconds; stuck hosts: {}",
        elapsed.as_secs(),
        render_hosts(failing)
    )]
    #[diagnostic(
        code(nodewiz::gate_timeout),
        help("inspect the listed hosts, then re-run the same command to resume from this stage")
    )]
    GateTimeout {
        gate: GateKind,
        elapsed: Duration,
        failing: BTreeMap<HostId, String>,
    },

    #[error(
        "subnet {subnet} needs RPC protocol version {required}; incompatible hosts: {}",
        render_hosts(hosts)
    )]
    #[diagnostic(
        code(nodewiz::rpc_incompatible),
        help(
            "upgrade the node client on the listed hosts to a release speaking RPC version {required}, or rebuild the VM against the node client's version"
        )
    )]
    VersionIncompatible {
        subnet: String,
        required: u32,
        hosts: BTreeMap<HostId, String>,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("task panicked: {0}")]
    TaskPanicked(String),

    #[error("state error: {0}")]
    State(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Errors that no amount of retrying will fix.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::CredentialExpired { .. } | Self::VersionIncompatible { .. } | Self::Cancelled => {
                true
            }
            Self::Provisioning { source, .. } => source.is_permanent(),
            _ => false,
        }
    }

    /// Whether this error, or its provisioning cause, is an expired credential.
    #[must_use]
    pub fn is_credential_expired(&self) -> bool {
        match self {
            Self::CredentialExpired { .. } => true,
            Self::Provisioning { source, .. } => source.is_credential_expired(),
            _ => false,
        }
    }
}

fn render_hosts(hosts: &BTreeMap<HostId, String>) -> String {
    hosts
        .iter()
        .map(|(id, reason)| format!("{id} ({reason})"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<dialoguer::Error> for Error {
    fn from(err: dialoguer::Error) -> Self {
        // dialoguer::Error wraps an IO error
        Error::Io(std::io::Error::other(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_timeout_lists_stuck_hosts() {
        let mut failing = BTreeMap::new();
        failing.insert(HostId::new("i-2"), "unhealthy".to_string());
        let err = Error::GateTimeout {
            gate: GateKind::Healthy,
            elapsed: Duration::from_secs(180),
            failing,
        };
        let message = err.to_string();
        assert!(message.contains("cluster not healthy after 180 seconds"));
        assert!(message.contains("i-2 (unhealthy)"));
    }

    #[test]
    fn credential_errors_carry_help() {
        let err = Error::CredentialExpired {
            provider: CloudKind::Aws,
            detail: "RequestExpired".into(),
            remediation: "refresh AWS credentials".into(),
        };
        let help = err.help().map(|h| h.to_string());
        assert_eq!(help.as_deref(), Some("refresh AWS credentials"));
        assert!(err.is_permanent());
    }

    #[test]
    fn provisioning_error_shows_the_cause_remediation() {
        let err = Error::Provisioning {
            source: Box::new(Error::CredentialExpired {
                provider: CloudKind::Aws,
                detail: "ExpiredToken".into(),
                remediation: "run `aws sso login`".into(),
            }),
            rollback: RollbackReport::default(),
        };
        let help = err.help().map(|h| h.to_string());
        assert_eq!(help.as_deref(), Some("run `aws sso login`"));
        let rendered = format!("{:?}", miette::Report::new(err));
        assert!(rendered.contains("run `aws sso login`"));
    }

    #[test]
    fn provisioning_error_inherits_permanence() {
        let err = Error::Provisioning {
            source: Box::new(Error::CredentialExpired {
                provider: CloudKind::Gcp,
                detail: "invalid_grant".into(),
                remediation: String::new(),
            }),
            rollback: RollbackReport::default(),
        };
        assert!(err.is_credential_expired());
        assert!(err.is_permanent());
    }
}
