//! Invoking a provider CLI and mapping its failures.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::credentials;
use crate::adapter::outbound::process;
use crate::domain::host::CloudKind;
use crate::error::{Error, Result};

/// A provider command-line tool, always asked for JSON output.
#[derive(Debug, Clone)]
pub struct CliRunner {
    kind: CloudKind,
    binary: String,
    /// Credential profile, surfaced in remediation hints.
    profile: Option<String>,
    timeout: Duration,
}

impl CliRunner {
    #[must_use]
    pub fn new(kind: CloudKind, binary: impl Into<String>, profile: Option<String>, timeout: Duration) -> Self {
        Self {
            kind,
            binary: binary.into(),
            profile,
            timeout,
        }
    }

    /// Run and return stdout.
    ///
    /// # Errors
    ///
    /// [`Error::CredentialExpired`] when the output names a credential
    /// problem, [`Error::Cloud`] for any other failure.
    pub async fn text(&self, args: &[String]) -> Result<String> {
        debug!(provider = %self.kind, command = args.first().map(String::as_str).unwrap_or_default(), "Cloud CLI call");
        let output = process::run(&self.binary, args, self.timeout)
            .await
            .map_err(|failure| self.failure(format!("{} {failure}", self.binary)))?;
        if output.success() {
            return Ok(output.stdout);
        }
        let diagnostic = output.diagnostic();
        if let Some(expired) = credentials::classify(self.kind, &diagnostic, self.profile.as_deref()) {
            return Err(expired);
        }
        Err(self.failure(diagnostic))
    }

    /// Run and parse stdout as JSON. Empty output parses as `null`.
    pub async fn json(&self, args: &[String]) -> Result<Value> {
        let stdout = self.text(args).await?;
        if stdout.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&stdout).map_err(|e| self.failure(format!("unreadable output: {e}")))
    }

    #[must_use]
    pub fn failure(&self, message: String) -> Error {
        Error::Cloud {
            provider: self.kind,
            message,
        }
    }
}

/// Whether a [`Error::Cloud`] message contains `code`.
#[must_use]
pub fn is_code(error: &Error, code: &str) -> bool {
    matches!(error, Error::Cloud { message, .. } if message.contains(code))
}
