//! Process spawning and output capture

use std::future::Future;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, instrument};

use crate::sandbox::SandboxError;
use crate::sandbox::command::Invocation;
use crate::types::{ExitOutcome, OutputMode};

/// Output of a finished child process
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub status: ExitOutcome,
    /// Empty when stdout was inherited
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    /// stdout followed by stderr, as one diagnostic buffer
    pub fn combined(&self) -> String {
        let mut combined = String::from_utf8_lossy(&self.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&self.stderr));
        combined
    }
}

/// Spawns child processes and waits for them.
///
/// The runner drives every subprocess through this trait so that tests can
/// record or script spawns instead of launching real toolchains.
pub trait ProcessExecutor {
    /// Run `invocation` to completion.
    ///
    /// stderr is always captured. stdout is captured or inherited according
    /// to `stdout`.
    fn run(
        &self,
        invocation: &Invocation,
        stdout: OutputMode,
    ) -> impl Future<Output = Result<ProcessOutput, SandboxError>> + Send;
}

/// [`ProcessExecutor`] backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioExecutor;

impl ProcessExecutor for TokioExecutor {
    #[instrument(skip(self), fields(program = invocation.program()))]
    async fn run(
        &self,
        invocation: &Invocation,
        stdout: OutputMode,
    ) -> Result<ProcessOutput, SandboxError> {
        let stdout_cfg = match stdout {
            OutputMode::Inherit => Stdio::inherit(),
            OutputMode::Capture => Stdio::piped(),
        };

        let child = Command::new(invocation.program())
            .args(invocation.arguments())
            .stdin(Stdio::null())
            .stdout(stdout_cfg)
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SandboxError::Spawn {
                program: invocation.program().to_string(),
                source,
            })?;

        let output = child.wait_with_output().await?;
        let status = ExitOutcome::from(output.status);

        debug!(%status, stdout_bytes = output.stdout.len(), stderr_bytes = output.stderr.len(), "process exited");

        Ok(ProcessOutput {
            status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
