//! Process-level sandboxing
//!
//! Builds the compiler, wrapper and schroot command lines, spawns them, and
//! installs the resource ceilings the whole process tree runs under. The
//! chroot and the privilege-dropping wrapper themselves are external
//! programs; this module only invokes them.

use thiserror::Error;

pub use crate::sandbox::command::{CompileCommand, Invocation, wrapper_command};
pub use crate::sandbox::limits::{LimitEnforcer, LimitError, ProcessLimits};
pub use crate::sandbox::process::{ProcessExecutor, ProcessOutput, TokioExecutor};

mod command;
mod limits;
mod process;

/// Errors that occur while running a sandboxed process
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
