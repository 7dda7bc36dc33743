//! Submission names and the artifact paths derived from them
//!
//! Every generated file is namespaced by the submission name, so the name is
//! validated once here and every path below is built from a validated name.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{Config, PathsConfig, SandboxMode};

/// Maximum length of a submission name
pub const MAX_NAME_LEN: usize = 64;

/// Extension of rendered source files
pub const SOURCE_EXTENSION: &str = "cpp";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("submission name is empty")]
    Empty,

    #[error("submission name is {len} characters long (maximum {MAX_NAME_LEN})")]
    TooLong { len: usize },

    #[error("submission name {name:?} contains invalid character {ch:?}")]
    InvalidCharacter { name: String, ch: char },

    #[error("cannot derive a submission name from {0}")]
    NoFileName(PathBuf),
}

/// Errors locating an existing source file
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArtifactError {
    #[error(transparent)]
    Name(#[from] NameError),

    #[error("{path} is outside the source directory {source_dir} mapped into the chroot")]
    OutsideSourceDir { path: PathBuf, source_dir: PathBuf },
}

/// A validated submission identifier.
///
/// Only ASCII letters, digits, `_` and `-` are accepted, so a name can never
/// contain a path separator or a `..` component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubmissionName(String);

impl SubmissionName {
    pub fn new(name: impl Into<String>) -> Result<Self, NameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(NameError::Empty);
        }
        if name.len() > MAX_NAME_LEN {
            return Err(NameError::TooLong { len: name.len() });
        }
        if let Some(ch) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(NameError::InvalidCharacter { name, ch });
        }
        Ok(Self(name))
    }

    /// Derive a name from a source path: the file name without directory
    /// and extension (`/tmp/abc123.cpp` becomes `abc123`).
    pub fn from_source_path(path: impl AsRef<Path>) -> Result<Self, NameError> {
        let path = path.as_ref();
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| NameError::NoFileName(path.to_path_buf()))?;
        Self::new(stem)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the rendered source (`<name>.cpp`)
    pub fn source_file_name(&self) -> String {
        format!("{}.{SOURCE_EXTENSION}", self.0)
    }

    /// File name of the compiled binary (`<name>`)
    pub fn binary_file_name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubmissionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SubmissionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for SubmissionName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Paths of one submission's source and binary.
///
/// The host view is where this process reads and writes files. The sandbox
/// view is what the compiler and the wrapper see, which differs from the host
/// view when they run inside a change-rooted filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    name: SubmissionName,
    host_source: PathBuf,
    host_binary: PathBuf,
    sandbox_source: PathBuf,
    sandbox_binary: PathBuf,
    owns_source: bool,
}

impl Artifacts {
    /// Artifacts for a submission whose source is rendered by the synthesizer
    pub fn synthesized(name: &SubmissionName, paths: &PathsConfig) -> Self {
        let source = name.source_file_name();
        let binary = name.binary_file_name();
        Self {
            name: name.clone(),
            host_source: paths.source_dir.join(&source),
            host_binary: paths.binary_dir.join(binary),
            sandbox_source: paths.sandbox_source_dir().join(&source),
            sandbox_binary: paths.sandbox_binary_dir().join(binary),
            owns_source: true,
        }
    }

    /// Artifacts for an existing source file supplied by the caller.
    ///
    /// A source under the host source directory is handed to the compiler
    /// through the sandbox view of that directory. Under `schroot` any other
    /// location is unreachable from inside the chroot and is rejected; in
    /// direct mode it is used as given. The source is never removed by
    /// [`cleanup`](Self::cleanup).
    pub fn for_source(
        source: impl Into<PathBuf>,
        config: &Config,
    ) -> Result<Self, ArtifactError> {
        let source = source.into();
        let paths = &config.paths;
        let name = SubmissionName::from_source_path(&source)?;
        let sandbox_source = match source.strip_prefix(&paths.source_dir) {
            Ok(relative) => paths.sandbox_source_dir().join(relative),
            Err(_) if config.sandbox.mode == SandboxMode::Schroot => {
                return Err(ArtifactError::OutsideSourceDir {
                    path: source,
                    source_dir: paths.source_dir.clone(),
                });
            }
            Err(_) => source.clone(),
        };
        let binary = name.binary_file_name();
        Ok(Self {
            host_binary: paths.binary_dir.join(binary),
            sandbox_binary: paths.sandbox_binary_dir().join(binary),
            host_source: source,
            sandbox_source,
            name,
            owns_source: false,
        })
    }

    pub fn name(&self) -> &SubmissionName {
        &self.name
    }

    pub fn host_source(&self) -> &Path {
        &self.host_source
    }

    pub fn host_binary(&self) -> &Path {
        &self.host_binary
    }

    pub fn sandbox_source(&self) -> &Path {
        &self.sandbox_source
    }

    pub fn sandbox_binary(&self) -> &Path {
        &self.sandbox_binary
    }

    /// Remove the compiled binary, if any
    pub async fn remove_binary(&self) {
        remove_if_present(&self.host_binary).await;
    }

    /// Remove the binary and, when it was generated here, the source
    pub async fn cleanup(&self) {
        self.remove_binary().await;
        if self.owns_source {
            remove_if_present(&self.host_source).await;
        }
    }
}

async fn remove_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed artifact"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove artifact"),
    }
}
