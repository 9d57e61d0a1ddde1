//! ogr2ogr execution abstraction
//!
//! Decouples transfer logic from the real binary so it can be tested
//! without a GDAL installation.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use pgdata_core::{PgDataError, Result};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::command::OgrCommand;

/// Output from a finished ogr2ogr run
#[derive(Debug, Clone, Default)]
pub struct OgrOutput {
    /// Exit code; `None` when the process was terminated by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl OgrOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

impl From<std::process::Output> for OgrOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

/// Runs an [`OgrCommand`] to completion
#[async_trait]
pub trait OgrRunner: Send + Sync {
    /// Run the command; a non-zero exit is an `ExternalToolFailure`
    async fn run(&self, command: &OgrCommand) -> Result<OgrOutput>;
}

/// Spawns the command as a child process, without a shell
#[derive(Debug, Clone, Default)]
pub struct CliOgrRunner {
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl CliOgrRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill the child once `timeout` has elapsed
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Kill the child when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

#[async_trait]
impl OgrRunner for CliOgrRunner {
    #[tracing::instrument(skip(self, command), fields(program = %command.program()))]
    async fn run(&self, command: &OgrCommand) -> Result<OgrOutput> {
        let tool = command.program().to_string();
        tracing::info!(command = %command, "running external tool");

        let child = Command::new(command.program())
            .args(command.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => PgDataError::ExternalToolFailure {
                    tool: tool.clone(),
                    status: None,
                    stderr: format!("{} not found", tool),
                },
                _ => PgDataError::Io(e),
            })?;

        let timeout = async {
            match self.timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };

        // Dropping the wait future drops the child, which kills it
        let output = tokio::select! {
            output = child.wait_with_output() => OgrOutput::from(output?),
            _ = timeout => {
                tracing::warn!(%tool, "external tool timed out; killed");
                return Err(PgDataError::Timeout(format!(
                    "{} did not finish within {:?}",
                    tool,
                    self.timeout.unwrap_or_default()
                )));
            }
            _ = cancelled => {
                tracing::warn!(%tool, "external tool cancelled; killed");
                return Err(PgDataError::Cancelled);
            }
        };

        if !output.success() {
            return Err(PgDataError::ExternalToolFailure {
                tool,
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            });
        }

        tracing::debug!(stdout_bytes = output.stdout.len(), "external tool finished");
        Ok(output)
    }
}
