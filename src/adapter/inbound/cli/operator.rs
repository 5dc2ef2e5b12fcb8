//! Inbound operator accessor for CLI handlers.

use std::io::ErrorKind;
use std::path::Path;
use std::sync::OnceLock;

use crate::adapter::inbound::cli::paths;
use crate::error::{ConfigError, Result};
use crate::port::inbound::operator::port::OperatorPort;

static OPERATOR: OnceLock<Box<dyn OperatorPort>> = OnceLock::new();

/// Installs the operator implementation used by CLI handlers.
pub fn install(operator: Box<dyn OperatorPort>) -> std::result::Result<(), Box<dyn OperatorPort>> {
    OPERATOR.set(operator)
}

/// Returns the configured operator capability surface for CLI handlers.
#[must_use]
pub fn operator() -> &'static dyn OperatorPort {
    OPERATOR
        .get()
        .expect("CLI operator not installed; call cli::operator::install from main")
        .as_ref()
}

/// Load config TOML for operator-facing use-cases.
///
/// Without `--config`, a missing default file means "all defaults". A file
/// named explicitly must exist.
pub fn read_config_toml(path: Option<&Path>) -> Result<String> {
    let (path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (paths::default_config(), false),
    };
    match std::fs::read_to_string(&path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == ErrorKind::NotFound && !explicit => Ok(String::new()),
        Err(e) => Err(ConfigError::ReadFile(e).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(read_config_toml(Some(&missing)).is_err());
    }

    #[test]
    fn explicit_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.toml");
        std::fs::write(&path, "[executor]\nmax_concurrency = 2\n").unwrap();
        assert!(read_config_toml(Some(&path)).unwrap().contains("max_concurrency"));
    }
}
