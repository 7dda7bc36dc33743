use std::fmt;
use std::num::NonZeroU32;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::naming::SubmissionName;

/// Process-wide resource ceilings applied before compilation.
///
/// Both limits are installed as hard limits (soft == hard) on the runner
/// process and are inherited by the compiler and the wrapped binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU time limit in seconds (`RLIMIT_CPU`)
    #[serde(default = "default_cpu_time_limit")]
    pub cpu_time_limit: u64,

    /// Address space limit in bytes (`RLIMIT_AS`)
    #[serde(default = "default_memory_limit")]
    pub memory_limit: u64,
}

impl ResourceLimits {
    /// 1 kibibyte in bytes
    pub const KIB: u64 = 1024;
    /// 1 mebibyte in bytes
    pub const MIB: u64 = 1024 * 1024;

    /// Create limits with the default ceilings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the CPU time limit in seconds
    pub fn with_cpu_time_limit(mut self, seconds: u64) -> Self {
        self.cpu_time_limit = seconds;
        self
    }

    /// Set the address space limit in bytes
    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit = bytes;
        self
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_time_limit: default_cpu_time_limit(),
            memory_limit: default_memory_limit(),
        }
    }
}

fn default_cpu_time_limit() -> u64 {
    5
}

fn default_memory_limit() -> u64 {
    256 * ResourceLimits::MIB
}

/// A canvas dimension of zero pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("canvas dimensions must be positive, got {width}x{height}")]
pub struct ZeroDimension {
    pub width: u32,
    pub height: u32,
}

/// Draw configuration passed to the generated `DrawOptions` constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawOptions {
    /// Canvas width in pixels
    pub width: NonZeroU32,
    /// Canvas height in pixels
    pub height: NonZeroU32,
    /// Enable the raster backend
    pub raster: bool,
    /// Enable the GPU backend
    pub gpu: bool,
    /// Enable the PDF backend
    pub pdf: bool,
    /// Input image source selector, rendered verbatim
    pub source: String,
}

impl DrawOptions {
    /// Set the canvas size, rejecting a zero width or height
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Result<Self, ZeroDimension> {
        match (NonZeroU32::new(width), NonZeroU32::new(height)) {
            (Some(w), Some(h)) => {
                self.width = w;
                self.height = h;
                Ok(self)
            }
            _ => Err(ZeroDimension { width, height }),
        }
    }

    /// The `source` argument as it appears in generated code.
    ///
    /// An empty source means no input image and renders as `0`.
    pub fn source_arg(&self) -> &str {
        if self.source.is_empty() {
            "0"
        } else {
            &self.source
        }
    }
}

const DEFAULT_DIMENSION: NonZeroU32 = NonZeroU32::new(256).unwrap();

impl Default for DrawOptions {
    fn default() -> Self {
        Self {
            width: DEFAULT_DIMENSION,
            height: DEFAULT_DIMENSION,
            raster: true,
            gpu: false,
            pdf: false,
            source: String::new(),
        }
    }
}

/// A single fiddle submission
#[derive(Debug, Clone)]
pub struct Submission {
    /// Identifier namespacing every generated artifact
    pub name: SubmissionName,
    /// User-supplied code, appended verbatim to the generated preamble
    pub code: String,
    /// Draw configuration
    pub options: DrawOptions,
}

impl Submission {
    /// Create a submission with default draw options
    pub fn new(name: SubmissionName, code: impl Into<String>) -> Self {
        Self {
            name,
            code: code.into(),
            options: DrawOptions::default(),
        }
    }

    /// Replace the draw options
    pub fn with_options(mut self, options: DrawOptions) -> Self {
        self.options = options;
        self
    }
}

/// How a child process terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitOutcome {
    /// Exit code if the process exited normally
    pub code: Option<i32>,
    /// Signal number if the process was killed by a signal
    pub signal: Option<i32>,
}

impl ExitOutcome {
    /// Outcome of a process that exited with `code`
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// Outcome of a process killed by `signal`
    pub fn signaled(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            signal: status.signal(),
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "killed by signal {signal}"),
            (None, None) => f.write_str("unknown exit status"),
        }
    }
}

/// Where the executed program's standard output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Stream straight through to this process's stdout
    #[default]
    Inherit,
    /// Capture into [`ExecutionResult::stdout`]
    Capture,
}

/// Result of a successful execution
#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    /// Exit status of the wrapped execution
    pub status: ExitOutcome,

    /// Standard output, only when run with [`OutputMode::Capture`]
    pub stdout: Option<Vec<u8>>,

    /// Standard error of the wrapped execution
    pub stderr: Vec<u8>,
}

impl ExecutionResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.success()
    }
}
