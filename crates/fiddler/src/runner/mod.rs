//! Sandbox runner
//!
//! Applies resource limits, compiles a rendered source and runs the binary
//! through the wrapper, strictly in that order.

use thiserror::Error;
use tracing::{info, instrument};

pub use crate::runner::compile::{CompileResult, compile};
pub use crate::runner::execute::execute;

mod compile;
mod execute;

use crate::config::{Config, Retention};
use crate::naming::Artifacts;
use crate::sandbox::{
    LimitEnforcer, LimitError, ProcessExecutor, ProcessLimits, SandboxError, TokioExecutor,
};
use crate::synth::{SynthesisError, Synthesizer};
use crate::types::{ExecutionResult, ExitOutcome, OutputMode, Submission};

/// Errors that occur during compilation
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("compile failed ({status})")]
    Failed { status: ExitOutcome, output: String },

    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),
}

/// Errors that occur during execution
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("execution failed ({status})")]
    Failed { status: ExitOutcome, stderr: String },

    #[error("binary {0} not found - was compilation run?")]
    NotCompiled(std::path::PathBuf),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from any stage of a submission
///
/// Every variant is terminal for its submission.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("resource limits: {0}")]
    Limits(#[from] LimitError),

    #[error("synthesis: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Execute(#[from] ExecuteError),
}

impl PipelineError {
    /// The text shown to the submitter.
    ///
    /// For a failed compile this is the compiler's combined output, for a
    /// failed execution the wrapped program's stderr, preceded by a one-line
    /// summary. Other errors are described by their message.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Compile(CompileError::Failed { output, .. }) => {
                format!("{self}:\n\n{output}")
            }
            Self::Execute(ExecuteError::Failed { stderr, .. }) => {
                format!("{self}:\n\n{stderr}")
            }
            _ => self.to_string(),
        }
    }

    /// The captured buffer for compile and execution failures
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Compile(CompileError::Failed { output, .. }) => Some(output),
            Self::Execute(ExecuteError::Failed { stderr, .. }) => Some(stderr),
            _ => None,
        }
    }
}

/// High-level runner for submissions
///
/// Generic over how processes are spawned and how limits are installed; the
/// defaults are the real implementations.
#[derive(Debug, Clone)]
pub struct Runner<E = TokioExecutor, L = ProcessLimits> {
    config: Config,
    executor: E,
    limits: L,
}

impl Runner {
    /// Create a runner that spawns real processes and sets real limits
    pub fn new(config: Config) -> Self {
        Self::with_parts(config, TokioExecutor, ProcessLimits)
    }
}

impl<E: ProcessExecutor, L: LimitEnforcer> Runner<E, L> {
    pub fn with_parts(config: Config, executor: E, limits: L) -> Self {
        Self {
            config,
            executor,
            limits,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Install the configured resource ceilings on this process
    pub fn apply_limits(&self) -> Result<(), LimitError> {
        self.limits.apply(&self.config.limits)?;
        info!(
            cpu_time_limit = self.config.limits.cpu_time_limit,
            memory_limit = self.config.limits.memory_limit,
            "resource limits applied"
        );
        Ok(())
    }

    /// Compile the artifacts' source
    pub async fn compile(&self, artifacts: &Artifacts) -> Result<CompileResult, CompileError> {
        compile::compile(&self.executor, &self.config, artifacts).await
    }

    /// Run the compiled binary through the wrapper
    pub async fn execute(
        &self,
        artifacts: &Artifacts,
        stdout: OutputMode,
    ) -> Result<ExecutionResult, ExecuteError> {
        execute::execute(&self.executor, &self.config, artifacts, stdout).await
    }

    /// Apply limits, compile, then execute.
    ///
    /// Nothing is spawned if the limits cannot be installed, and nothing is
    /// executed if compilation fails. Artifacts are removed afterwards when
    /// the retention policy says so, whatever the outcome. A binary that
    /// failed to compile or to run is removed under either policy.
    #[instrument(skip(self, artifacts), fields(name = %artifacts.name()))]
    pub async fn compile_and_run(
        &self,
        artifacts: &Artifacts,
        stdout: OutputMode,
    ) -> Result<ExecutionResult, PipelineError> {
        let result = self.run_stages(artifacts, stdout).await;

        match (&result, self.config.retention) {
            (_, Retention::Remove) => artifacts.cleanup().await,
            (Err(PipelineError::Execute(_)), Retention::Keep) => artifacts.remove_binary().await,
            (_, Retention::Keep) => {}
        }

        result
    }

    async fn run_stages(
        &self,
        artifacts: &Artifacts,
        stdout: OutputMode,
    ) -> Result<ExecutionResult, PipelineError> {
        self.apply_limits()?;

        let compiled = self.compile(artifacts).await?;
        info!(name = %artifacts.name(), "successfully compiled");
        if !compiled.output.is_empty() {
            tracing::debug!(output = %compiled.output, "compiler output");
        }

        Ok(self.execute(artifacts, stdout).await?)
    }

    /// Render `submission` with `synthesizer`, then compile and run it.
    ///
    /// A synthesis failure aborts before limits are applied or anything is
    /// spawned.
    pub async fn run_submission(
        &self,
        synthesizer: &Synthesizer,
        submission: &Submission,
        stdout: OutputMode,
    ) -> Result<ExecutionResult, PipelineError> {
        synthesizer.write(submission).await?;
        let artifacts = Artifacts::synthesized(&submission.name, &self.config.paths);
        self.compile_and_run(&artifacts, stdout).await
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::config::SandboxMode;
    use crate::naming::SubmissionName;
    use crate::sandbox::{Invocation, ProcessOutput};
    use crate::synth::Template;
    use crate::types::ResourceLimits;

    /// Records every spawn and answers from a script, one output per spawn
    #[derive(Debug, Default, Clone)]
    struct StubExecutor {
        spawns: Arc<Mutex<Vec<Vec<String>>>>,
        outputs: Arc<Mutex<Vec<ProcessOutput>>>,
    }

    impl StubExecutor {
        fn scripted(outputs: Vec<ProcessOutput>) -> Self {
            Self {
                spawns: Arc::default(),
                outputs: Arc::new(Mutex::new(outputs)),
            }
        }

        fn spawns(&self) -> Vec<Vec<String>> {
            self.spawns.lock().unwrap().clone()
        }
    }

    impl ProcessExecutor for StubExecutor {
        async fn run(
            &self,
            invocation: &Invocation,
            _stdout: OutputMode,
        ) -> Result<ProcessOutput, SandboxError> {
            self.spawns.lock().unwrap().push(invocation.to_argv());
            let mut outputs = self.outputs.lock().unwrap();
            assert!(!outputs.is_empty(), "unexpected spawn: {invocation:?}");
            Ok(outputs.remove(0))
        }
    }

    #[derive(Debug, Default)]
    struct StubLimits {
        fail: bool,
        applied: AtomicUsize,
    }

    impl LimitEnforcer for StubLimits {
        fn apply(&self, _limits: &ResourceLimits) -> Result<(), LimitError> {
            self.applied.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LimitError::Set {
                    resource: "RLIMIT_AS",
                    value: 1 << 28,
                    source: std::io::Error::from_raw_os_error(1),
                });
            }
            Ok(())
        }
    }

    fn output(code: i32, stdout: &str, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            status: ExitOutcome::exited(code),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        config: Config,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::rooted(dir.path());
        std::fs::create_dir_all(&config.paths.source_dir).unwrap();
        std::fs::create_dir_all(&config.paths.binary_dir).unwrap();
        Fixture { _dir: dir, config }
    }

    fn runner(
        config: &Config,
        executor: &StubExecutor,
        fail_limits: bool,
    ) -> Runner<StubExecutor, StubLimits> {
        Runner::with_parts(
            config.clone(),
            executor.clone(),
            StubLimits {
                fail: fail_limits,
                ..Default::default()
            },
        )
    }

    fn artifacts(config: &Config, name: &str) -> Artifacts {
        let name = SubmissionName::new(name).unwrap();
        let artifacts = Artifacts::synthesized(&name, &config.paths);
        std::fs::write(artifacts.host_source(), "// source").unwrap();
        artifacts
    }

    /// Stand-in for the compiler having produced a binary
    fn place_binary(artifacts: &Artifacts) {
        std::fs::write(artifacts.host_binary(), "binary").unwrap();
    }

    #[tokio::test]
    async fn limit_failure_spawns_nothing() {
        let fx = fixture();
        let executor = StubExecutor::default();
        let runner = runner(&fx.config, &executor, true);
        let artifacts = artifacts(&fx.config, "limits");

        let result = runner
            .compile_and_run(&artifacts, OutputMode::Capture)
            .await;

        assert!(matches!(result, Err(PipelineError::Limits(_))));
        assert!(executor.spawns().is_empty());
        assert_eq!(runner.limits.applied.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn compile_failure_skips_execution() {
        let fx = fixture();
        let executor = StubExecutor::scripted(vec![output(
            1,
            "In file included from limits.cpp:1:\n",
            "error: 'class SkCanvas' has no member named 'nonexistentMethod'\n",
        )]);
        let runner = runner(&fx.config, &executor, false);
        let artifacts = artifacts(&fx.config, "broken");

        let err = runner
            .compile_and_run(&artifacts, OutputMode::Capture)
            .await
            .unwrap_err();

        assert_eq!(executor.spawns().len(), 1);
        assert_eq!(
            err.detail(),
            Some(
                "In file included from limits.cpp:1:\n\
                 error: 'class SkCanvas' has no member named 'nonexistentMethod'\n"
            )
        );
        assert!(matches!(
            err,
            PipelineError::Compile(CompileError::Failed { .. })
        ));
        assert!(err.diagnostic().starts_with("compile failed (exit code 1):\n\n"));
    }

    #[tokio::test]
    async fn compile_failure_removes_partial_binary() {
        let fx = fixture();
        let mut config = fx.config.clone();
        config.retention = Retention::Keep;
        let executor = StubExecutor::scripted(vec![output(1, "", "ld: error\n")]);
        let runner = runner(&config, &executor, false);
        let artifacts = artifacts(&config, "partial");
        place_binary(&artifacts);

        let result = runner
            .compile_and_run(&artifacts, OutputMode::Capture)
            .await;

        assert!(result.is_err());
        assert!(!artifacts.host_binary().exists());
        // Keep policy leaves the source alone
        assert!(artifacts.host_source().exists());
    }

    #[tokio::test]
    async fn execution_failure_reports_stderr_only() {
        let fx = fixture();
        let executor = StubExecutor::scripted(vec![
            output(0, "", ""),
            output(139, "partial payload", "Segmentation fault\n"),
        ]);
        let runner = runner(&fx.config, &executor, false);
        let artifacts = artifacts(&fx.config, "crash");
        place_binary(&artifacts);

        let err = runner
            .compile_and_run(&artifacts, OutputMode::Capture)
            .await
            .unwrap_err();

        assert_eq!(executor.spawns().len(), 2);
        assert!(matches!(
            err,
            PipelineError::Execute(ExecuteError::Failed { .. })
        ));
        assert_eq!(err.detail(), Some("Segmentation fault\n"));
    }

    #[tokio::test]
    async fn signal_death_is_execution_failure() {
        let fx = fixture();
        let executor = StubExecutor::scripted(vec![
            output(0, "", ""),
            ProcessOutput {
                status: ExitOutcome::signaled(24),
                ..Default::default()
            },
        ]);
        let runner = runner(&fx.config, &executor, false);
        let artifacts = artifacts(&fx.config, "spin");
        place_binary(&artifacts);

        let err = runner
            .compile_and_run(&artifacts, OutputMode::Capture)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "execution failed (killed by signal 24)");
    }

    #[tokio::test]
    async fn success_runs_compiler_then_wrapper() {
        let fx = fixture();
        let executor = StubExecutor::scripted(vec![
            output(0, "", ""),
            output(0, "iVBORw0KGgo=", ""),
        ]);
        let runner = runner(&fx.config, &executor, false);
        let artifacts = artifacts(&fx.config, "abc123");
        place_binary(&artifacts);

        let result = runner
            .compile_and_run(&artifacts, OutputMode::Capture)
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.stdout.as_deref(), Some(&b"iVBORw0KGgo="[..]));
        assert!(result.stderr.is_empty());

        let spawns = executor.spawns();
        assert_eq!(spawns.len(), 2);
        assert_eq!(spawns[0][0], "c++");
        assert!(spawns[0].contains(&artifacts.sandbox_source().display().to_string()));
        assert_eq!(
            spawns[1],
            vec![
                fx.config.paths.wrapper.display().to_string(),
                artifacts.sandbox_binary().display().to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn remove_retention_cleans_up() {
        let fx = fixture();
        let executor =
            StubExecutor::scripted(vec![output(0, "", ""), output(0, "payload", "")]);
        let runner = runner(&fx.config, &executor, false);
        let artifacts = artifacts(&fx.config, "tidy");
        place_binary(&artifacts);

        runner
            .compile_and_run(&artifacts, OutputMode::Capture)
            .await
            .unwrap();

        assert!(!artifacts.host_source().exists());
        assert!(!artifacts.host_binary().exists());
    }

    #[tokio::test]
    async fn keep_retention_leaves_artifacts() {
        let fx = fixture();
        let mut config = fx.config.clone();
        config.retention = Retention::Keep;
        let executor =
            StubExecutor::scripted(vec![output(0, "", ""), output(0, "payload", "")]);
        let runner = runner(&config, &executor, false);
        let artifacts = artifacts(&config, "kept");
        place_binary(&artifacts);

        runner
            .compile_and_run(&artifacts, OutputMode::Capture)
            .await
            .unwrap();

        assert!(artifacts.host_source().exists());
        assert!(artifacts.host_binary().exists());
    }

    #[tokio::test]
    async fn keep_retention_removes_binary_after_execution_failure() {
        let fx = fixture();
        let mut config = fx.config.clone();
        config.retention = Retention::Keep;
        let executor =
            StubExecutor::scripted(vec![output(0, "", ""), output(1, "", "abort\n")]);
        let runner = runner(&config, &executor, false);
        let artifacts = artifacts(&config, "failedrun");
        place_binary(&artifacts);

        let result = runner
            .compile_and_run(&artifacts, OutputMode::Capture)
            .await;

        assert!(matches!(
            result,
            Err(PipelineError::Execute(ExecuteError::Failed { .. }))
        ));
        assert!(!artifacts.host_binary().exists());
        assert!(artifacts.host_source().exists());
    }

    #[tokio::test]
    async fn missing_binary_is_not_executed() {
        let fx = fixture();
        let executor = StubExecutor::scripted(vec![output(0, "", "")]);
        let runner = runner(&fx.config, &executor, false);
        let artifacts = artifacts(&fx.config, "nobinary");

        let err = runner
            .compile_and_run(&artifacts, OutputMode::Capture)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Execute(ExecuteError::NotCompiled(_))
        ));
        assert_eq!(executor.spawns().len(), 1);
    }

    #[tokio::test]
    async fn schroot_mode_wraps_both_stages() {
        let fx = fixture();
        let mut config = fx.config.clone();
        config.sandbox.mode = SandboxMode::Schroot;
        config.sandbox.chroot = Some("webtry".to_string());
        let executor = StubExecutor::scripted(vec![output(0, "", ""), output(0, "", "")]);
        let runner = runner(&config, &executor, false);
        let artifacts = artifacts(&config, "chrooted");
        place_binary(&artifacts);

        runner
            .compile_and_run(&artifacts, OutputMode::Capture)
            .await
            .unwrap();

        for argv in executor.spawns() {
            assert_eq!(&argv[..6], ["schroot", "-c", "webtry", "-d", "/", "--"]);
        }
    }

    #[tokio::test]
    async fn existing_source_runs_through_chroot_view() {
        let fx = fixture();
        let mut config = fx.config.clone();
        config.sandbox.mode = SandboxMode::Schroot;
        config.sandbox.chroot = Some("webtry".to_string());
        config.paths.sandbox_source_dir = Some("/webtrysources".into());
        config.paths.sandbox_binary_dir = Some("/webtrybinaries".into());
        let source = config.paths.source_dir.join("abc123.cpp");
        std::fs::write(&source, "// source").unwrap();
        let artifacts = Artifacts::for_source(&source, &config).unwrap();
        place_binary(&artifacts);
        let executor = StubExecutor::scripted(vec![output(0, "", ""), output(0, "", "")]);
        let runner = runner(&config, &executor, false);

        runner
            .compile_and_run(&artifacts, OutputMode::Capture)
            .await
            .unwrap();

        let spawns = executor.spawns();
        let compile = &spawns[0];
        assert!(compile.iter().any(|arg| arg == "/webtrysources/abc123.cpp"));
        assert!(!compile.iter().any(|arg| *arg == source.display().to_string()));
        let output_flag = compile.iter().position(|arg| arg == "-o").unwrap();
        assert_eq!(compile[output_flag + 1], "/webtrybinaries/abc123");
        assert_eq!(spawns[1].last().unwrap(), "/webtrybinaries/abc123");
        // The caller's source survives cleanup
        assert!(source.exists());
    }

    #[tokio::test]
    async fn run_submission_synthesizes_first() {
        let fx = fixture();
        let executor =
            StubExecutor::scripted(vec![output(0, "", ""), output(0, "payload", "")]);
        let mut config = fx.config.clone();
        config.retention = Retention::Keep;
        let runner = runner(&config, &executor, false);
        let synth = Synthesizer::new(Template::default(), &config.paths.source_dir);
        let name = SubmissionName::new("fresh").unwrap();
        let submission = Submission::new(name.clone(), "canvas->clear(SK_ColorWHITE);");
        place_binary(&Artifacts::synthesized(&name, &config.paths));

        let result = runner
            .run_submission(&synth, &submission, OutputMode::Capture)
            .await
            .unwrap();

        assert!(result.is_success());
        let source = config.paths.source_dir.join("fresh.cpp");
        let content = std::fs::read_to_string(source).unwrap();
        assert!(content.ends_with("canvas->clear(SK_ColorWHITE);"));
    }

    #[tokio::test]
    async fn synthesis_failure_spawns_nothing() {
        let fx = fixture();
        let executor = StubExecutor::default();
        let runner = runner(&fx.config, &executor, false);
        let synth = Synthesizer::new(Template::default(), Path::new("/nonexistent/sources"));
        let submission = Submission::new(SubmissionName::new("lost").unwrap(), "x");

        let err = runner
            .run_submission(&synth, &submission, OutputMode::Capture)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Synthesis(_)));
        assert!(executor.spawns().is_empty());
        assert_eq!(runner.limits.applied.load(Ordering::SeqCst), 0);
    }
}
