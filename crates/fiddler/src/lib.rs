//! Sandboxed compile-and-run backend for Skia fiddles.
//!
//! Fiddler takes a short snippet of Skia drawing code, renders it into a
//! complete C++ source file, compiles it against a prebuilt Skia library, and
//! runs the result through a privilege-restricting wrapper under CPU-time and
//! address-space ceilings.
//!
//! # Features
//!
//! - **Source synthesis**: Template-based rendering of draw options and user code.
//! - **Resource limits**: `RLIMIT_CPU` and `RLIMIT_AS` applied before anything is compiled.
//! - **Two-layer sandboxing**: Direct or `schroot` invocation, plus an external wrapper.
//! - **TOML configuration**: Filesystem layout and compiler flags fixed per deployment.
//! - **Artifact retention**: Generated sources and binaries removed or kept by policy.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Retention, SandboxMode};
pub use naming::{ArtifactError, Artifacts, NameError, SubmissionName};
pub use runner::{CompileError, CompileResult, ExecuteError, PipelineError, Runner};
pub use sandbox::{LimitEnforcer, LimitError, ProcessExecutor, ProcessLimits, TokioExecutor};
pub use synth::{SynthesisError, Synthesizer, Template, TemplateError};
pub use types::{
    DrawOptions, ExecutionResult, ExitOutcome, OutputMode, ResourceLimits, Submission, ZeroDimension,
};

pub mod config;
pub mod naming;
pub mod runner;
pub mod sandbox;
pub mod synth;
pub mod types;
