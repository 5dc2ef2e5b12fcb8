//! Recognising expired or missing cloud credentials in CLI output.

use crate::domain::host::CloudKind;
use crate::error::Error;

const AWS_PATTERNS: &[&str] = &[
    "RequestExpired",
    "ExpiredToken",
    "ExpiredTokenException",
    "The security token included in the request is expired",
    "Token has expired and refresh failed",
    "Unable to locate credentials",
    "The SSO session associated with this profile has expired",
];

const GCP_PATTERNS: &[&str] = &[
    "invalid_grant",
    "Reauthentication required",
    "reauth related error",
    "There was a problem refreshing your current auth tokens",
    "You do not currently have an active account selected",
];

/// What the operator should run to fix expired credentials.
#[must_use]
pub fn remediation(provider: CloudKind, profile: Option<&str>) -> String {
    match provider {
        CloudKind::Aws => match profile {
            Some(profile) if profile != "default" => {
                format!("run `aws sso login --profile {profile}` (or refresh the profile's keys) and retry")
            }
            _ => "run `aws sso login` or `aws configure` to refresh your credentials and retry".to_string(),
        },
        CloudKind::Gcp => "run `gcloud auth login` and `gcloud auth application-default login`, then retry".to_string(),
    }
}

/// `Some(CredentialExpired)` when `output` matches a known credential
/// failure for `provider`.
#[must_use]
pub fn classify(provider: CloudKind, output: &str, profile: Option<&str>) -> Option<Error> {
    let patterns = match provider {
        CloudKind::Aws => AWS_PATTERNS,
        CloudKind::Gcp => GCP_PATTERNS,
    };
    let matched = patterns.iter().find(|p| output.contains(*p))?;
    let detail = output
        .lines()
        .find(|line| line.contains(matched))
        .unwrap_or(matched)
        .trim()
        .to_string();
    Some(Error::CredentialExpired {
        provider,
        detail,
        remediation: remediation(provider, profile),
    })
}
