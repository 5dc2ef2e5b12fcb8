//! Remote execution port.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::host::Host;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDirection {
    Upload,
    Download,
}

/// Runs commands and moves files on a host.
///
/// Every call is bounded by a timeout. Errors name the host.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Open (or verify) an authenticated session.
    async fn connect(&self, host: &Host, timeout: Duration) -> Result<()>;

    /// Run a shell command and return its standard output.
    async fn run_command(&self, host: &Host, command: &str, timeout: Duration) -> Result<String>;

    async fn copy_file(
        &self,
        host: &Host,
        local: &Path,
        remote: &str,
        direction: CopyDirection,
        timeout: Duration,
    ) -> Result<()>;

    /// Wait until `port` accepts TCP connections.
    async fn wait_for_port(&self, host: &Host, port: u16, timeout: Duration) -> Result<()>;
}
