//! Compilation step
//!
//! Compiles a rendered source against the prebuilt fiddle object and Skia
//! library.

use tracing::{debug, instrument};

use crate::config::Config;
use crate::naming::Artifacts;
use crate::runner::CompileError;
use crate::sandbox::{CompileCommand, ProcessExecutor};
use crate::types::{ExitOutcome, OutputMode};

/// Result of a successful compilation
#[derive(Debug, Clone)]
pub struct CompileResult {
    /// Exit status of the compiler
    pub status: ExitOutcome,

    /// Combined compiler stdout and stderr (warnings, if any)
    pub output: String,
}

/// Compile the artifacts' source into their binary.
///
/// A non-zero compiler exit is returned as [`CompileError::Failed`] carrying
/// the combined compiler output verbatim, and any partial binary is removed.
#[instrument(skip(executor, config, artifacts), fields(name = %artifacts.name()))]
pub async fn compile<E: ProcessExecutor>(
    executor: &E,
    config: &Config,
    artifacts: &Artifacts,
) -> Result<CompileResult, CompileError> {
    let invocation = CompileCommand::new(
        config,
        artifacts.sandbox_source(),
        artifacts.sandbox_binary(),
    )
    .build()
    .sandboxed(&config.sandbox);

    debug!(args = ?invocation.to_argv(), "running compiler");

    let output = executor.run(&invocation, OutputMode::Capture).await?;
    let combined = output.combined();

    debug!(status = %output.status, "compilation complete");

    if !output.status.success() {
        artifacts.remove_binary().await;
        return Err(CompileError::Failed {
            status: output.status,
            output: combined,
        });
    }

    Ok(CompileResult {
        status: output.status,
        output: combined,
    })
}
