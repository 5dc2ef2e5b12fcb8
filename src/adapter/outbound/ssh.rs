//! [`RemoteExecutor`] over the system `ssh` and `scp` clients.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::process::{self, ProcessFailure, ProcessOutput};
use crate::domain::host::Host;
use crate::error::{Error, Result};
use crate::port::outbound::remote::{CopyDirection, RemoteExecutor};

const PORT_RETRY: Duration = Duration::from_secs(2);

/// Runs commands through OpenSSH in batch mode.
///
/// Fresh instances get new host keys on every launch, so host key checking
/// is off and nothing is written to `known_hosts`.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    port: u16,
    connect_timeout: Duration,
}

impl SshExecutor {
    #[must_use]
    pub fn new(port: u16, connect_timeout: Duration) -> Self {
        Self {
            port,
            connect_timeout,
        }
    }

    fn common_options(&self, host: &Host) -> Vec<String> {
        vec![
            "-i".into(),
            host.ssh_key.display().to_string(),
            "-o".into(),
            "BatchMode=yes".into(),
            "-o".into(),
            "StrictHostKeyChecking=no".into(),
            "-o".into(),
            "UserKnownHostsFile=/dev/null".into(),
            "-o".into(),
            "LogLevel=ERROR".into(),
            "-o".into(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
        ]
    }

    fn destination(host: &Host) -> Result<String> {
        Ok(format!("{}@{}", host.ssh_user, host.require_address()?))
    }

    fn ssh_args(&self, host: &Host, command: &str) -> Result<Vec<String>> {
        let mut args = self.common_options(host);
        args.push("-p".into());
        args.push(self.port.to_string());
        args.push(Self::destination(host)?);
        args.push("--".into());
        args.push(command.to_string());
        Ok(args)
    }

    fn scp_args(&self, host: &Host, local: &Path, remote: &str, direction: CopyDirection) -> Result<Vec<String>> {
        let mut args = self.common_options(host);
        args.push("-P".into());
        args.push(self.port.to_string());
        let remote = format!("{}:{remote}", Self::destination(host)?);
        let local = local.display().to_string();
        match direction {
            CopyDirection::Upload => args.extend([local, remote]),
            CopyDirection::Download => args.extend([remote, local]),
        }
        Ok(args)
    }

    async fn invoke(&self, host: &Host, program: &str, args: Vec<String>, timeout: Duration) -> Result<ProcessOutput> {
        let output = process::run(program, &args, timeout)
            .await
            .map_err(|failure| remote_failure(host, program, &failure))?;
        if output.success() {
            return Ok(output);
        }
        Err(Error::Remote {
            host: host.id.clone(),
            message: format!(
                "{program} exited with status {}: {}",
                output.status.map_or_else(|| "signal".to_string(), |s| s.to_string()),
                output.diagnostic()
            ),
        })
    }
}

fn remote_failure(host: &Host, program: &str, failure: &ProcessFailure) -> Error {
    Error::Remote {
        host: host.id.clone(),
        message: format!("{program} {failure}"),
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn connect(&self, host: &Host, timeout: Duration) -> Result<()> {
        let args = self.ssh_args(host, "true")?;
        self.invoke(host, "ssh", args, timeout).await?;
        debug!(host = %host.id, "SSH session verified");
        Ok(())
    }

    async fn run_command(&self, host: &Host, command: &str, timeout: Duration) -> Result<String> {
        trace!(host = %host.id, command, "Running remote command");
        let args = self.ssh_args(host, command)?;
        Ok(self.invoke(host, "ssh", args, timeout).await?.stdout)
    }

    async fn copy_file(
        &self,
        host: &Host,
        local: &Path,
        remote: &str,
        direction: CopyDirection,
        timeout: Duration,
    ) -> Result<()> {
        let args = self.scp_args(host, local, remote, direction)?;
        self.invoke(host, "scp", args, timeout).await?;
        debug!(host = %host.id, remote, ?direction, "File copied");
        Ok(())
    }

    async fn wait_for_port(&self, host: &Host, port: u16, timeout: Duration) -> Result<()> {
        let address = host.require_address()?;
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Unreachable {
                    host: host.id.clone(),
                    port,
                    timeout,
                });
            }
            let started = Instant::now();
            let attempt =
                tokio::time::timeout(remaining.min(PORT_RETRY), TcpStream::connect((address, port))).await;
            if let Ok(Ok(_stream)) = attempt {
                debug!(host = %host.id, port, "Port open");
                return Ok(());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(retry_pause(started.elapsed(), remaining)).await;
        }
    }
}

/// Wait between port checks. An attempt that already spent part of the
/// retry interval only waits out the rest of it.
fn retry_pause(spent: Duration, remaining: Duration) -> Duration {
    PORT_RETRY.saturating_sub(spent).min(remaining)
}
