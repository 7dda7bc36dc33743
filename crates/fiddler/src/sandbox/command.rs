//! Command builders for the compiler, the wrapper and schroot
//!
//! Every argument produced here comes from the configuration or from an
//! artifact path; user code never reaches an argument list.

use std::path::{Path, PathBuf};

use crate::config::{CompilerConfig, Config, SandboxConfig, SandboxMode};

/// A program and its arguments, ready to spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// The full command line, program first
    pub fn to_argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Wrap this invocation according to the sandbox mode.
    ///
    /// In schroot mode the result is
    /// `schroot -c <chroot> -d <directory> -- <program> <args...>`.
    pub fn sandboxed(self, sandbox: &SandboxConfig) -> Self {
        match sandbox.mode {
            SandboxMode::Direct => self,
            SandboxMode::Schroot => Invocation::new(path_arg(&sandbox.schroot_path))
                .arg("-c")
                .arg(sandbox.chroot.clone().unwrap_or_default())
                .arg("-d")
                .arg(path_arg(&sandbox.directory))
                .arg("--")
                .arg(self.program)
                .args(self.args),
        }
    }
}

/// Builder for the compiler command line
#[derive(Debug)]
pub struct CompileCommand<'a> {
    config: &'a Config,
    source: PathBuf,
    output: PathBuf,
}

impl<'a> CompileCommand<'a> {
    /// Create a builder for `source`, producing the binary at `output`.
    ///
    /// Both paths are in the sandbox view.
    pub fn new(config: &'a Config, source: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            config,
            source: source.into(),
            output: output.into(),
        }
    }

    fn compiler(&self) -> &CompilerConfig {
        &self.config.compiler
    }

    /// Build the compiler invocation (not yet sandboxed)
    pub fn build(self) -> Invocation {
        let compiler = self.compiler();
        let paths = &self.config.paths;

        let mut invocation = Invocation::new(&compiler.program)
            .arg(format!("--std={}", compiler.standard))
            .args(compiler.defines.iter().map(|define| format!("-D{define}")))
            .arg(format!("-I{}", paths.library_dir.display()))
            .args(
                paths
                    .skia_include_dirs()
                    .map(|dir| format!("-I{}", dir.display())),
            )
            .arg("-o")
            .arg(path_arg(&self.output))
            .arg(path_arg(&self.source))
            .arg(path_arg(&self.config.object_path()))
            .arg(path_arg(&self.config.library_path()))
            .args(compiler.link_flags.iter().cloned());

        if compiler.rpath {
            invocation = invocation
                .arg("-Wl,-rpath")
                .arg(format!("-Wl,{}", paths.library_dir.display()));
        }

        invocation
    }
}

/// Build the wrapper invocation for `binary` (sandbox view, not yet sandboxed)
pub fn wrapper_command(wrapper: &Path, binary: &Path) -> Invocation {
    Invocation::new(path_arg(wrapper)).arg(path_arg(binary))
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
