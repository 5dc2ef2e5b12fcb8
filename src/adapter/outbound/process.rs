//! Running local programs with a deadline.

use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

/// Captured result of a finished program.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Trimmed stderr, or stdout when stderr is empty.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Why a program produced no output.
#[derive(Debug)]
pub enum ProcessFailure {
    Spawn(std::io::Error),
    TimedOut(Duration),
}

impl std::fmt::Display for ProcessFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn(e) => write!(f, "could not start: {e}"),
            Self::TimedOut(limit) => write!(f, "timed out after {}s", limit.as_secs()),
        }
    }
}

/// Run `program` with `args`, killing it if it outlives `timeout`.
///
/// Stdin is closed. A non-zero exit is not an error here; callers decide
/// what a failed status means.
pub async fn run<I, S>(program: &str, args: I, timeout: Duration) -> Result<ProcessOutput, ProcessFailure>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(ProcessFailure::Spawn)?;
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(ProcessFailure::Spawn)?,
        Err(_) => return Err(ProcessFailure::TimedOut(timeout)),
    };

    let output = ProcessOutput {
        status: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    debug!(program, status = ?output.status, "Process finished");
    Ok(output)
}
