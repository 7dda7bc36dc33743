//! Execution step
//!
//! Runs a compiled binary through the privilege-restricting wrapper.

use tracing::{debug, instrument};

use crate::config::Config;
use crate::naming::Artifacts;
use crate::runner::ExecuteError;
use crate::sandbox::{ProcessExecutor, wrapper_command};
use crate::types::{ExecutionResult, OutputMode};

/// Execute the artifacts' binary as `<wrapper> <binary>`
#[instrument(skip(executor, config, artifacts), fields(name = %artifacts.name()))]
pub async fn execute<E: ProcessExecutor>(
    executor: &E,
    config: &Config,
    artifacts: &Artifacts,
    stdout: OutputMode,
) -> Result<ExecutionResult, ExecuteError> {
    if !tokio::fs::try_exists(artifacts.host_binary()).await? {
        return Err(ExecuteError::NotCompiled(
            artifacts.host_binary().to_path_buf(),
        ));
    }

    let invocation = wrapper_command(&config.paths.wrapper, artifacts.sandbox_binary())
        .sandboxed(&config.sandbox);

    debug!(args = ?invocation.to_argv(), "executing program");

    let output = executor.run(&invocation, stdout).await?;

    debug!(
        status = %output.status,
        stderr_bytes = output.stderr.len(),
        "execution complete"
    );

    if !output.status.success() {
        return Err(ExecuteError::Failed {
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(ExecutionResult {
        status: output.status,
        stdout: match stdout {
            OutputMode::Capture => Some(output.stdout),
            OutputMode::Inherit => None,
        },
        stderr: output.stderr,
    })
}
