//! Source synthesis
//!
//! Renders a submission into a complete compilable source file.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, warn};

pub use crate::synth::template::{DEFAULT_TEMPLATE, Template};

mod template;

use crate::config::Config;
use crate::naming::{NameError, SubmissionName};
use crate::types::Submission;

/// Errors in a source template
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unclosed placeholder starting at byte {offset}")]
    Unclosed { offset: usize },

    #[error("unmatched '}}' at byte {offset}")]
    UnmatchedClose { offset: usize },

    #[error("unknown placeholder '{{{name}}}' at byte {offset}")]
    UnknownPlaceholder { name: String, offset: usize },

    #[error("template has no {{code}} placeholder")]
    MissingCode,

    #[error("template has more than one {{code}} placeholder")]
    DuplicateCode,

    #[error("template has content after the {{code}} placeholder")]
    TextAfterCode,
}

/// Errors that occur while writing a source file
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("invalid submission name: {0}")]
    Name(#[from] NameError),

    #[error("failed to read template {path}: {source}")]
    ReadTemplate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid template: {0}")]
    Template(#[from] TemplateError),

    #[error("failed to create source file {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write source file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Writes rendered submissions into the source directory
#[derive(Debug, Clone)]
pub struct Synthesizer {
    template: Template,
    source_dir: PathBuf,
}

impl Synthesizer {
    pub fn new(template: Template, source_dir: impl Into<PathBuf>) -> Self {
        Self {
            template,
            source_dir: source_dir.into(),
        }
    }

    /// Build a synthesizer from the configured template and source directory
    pub async fn from_config(config: &Config) -> Result<Self, SynthesisError> {
        let template = match config.template_path {
            Some(ref path) => {
                let text = tokio::fs::read_to_string(path).await.map_err(|source| {
                    SynthesisError::ReadTemplate {
                        path: path.clone(),
                        source,
                    }
                })?;
                Template::parse(&text)?
            }
            None => Template::default(),
        };
        Ok(Self::new(template, &config.paths.source_dir))
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Host path of the source file for `name`
    pub fn source_path(&self, name: &SubmissionName) -> PathBuf {
        self.source_dir.join(name.source_file_name())
    }

    /// Render `submission` into its source file and return the file's path.
    ///
    /// The file must not already exist. On failure the partially written file
    /// is closed and removed before the error is returned.
    #[instrument(skip(self, submission), fields(name = %submission.name))]
    pub async fn write(&self, submission: &Submission) -> Result<PathBuf, SynthesisError> {
        let path = self.source_path(&submission.name);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|source| SynthesisError::Create {
                path: path.clone(),
                source,
            })?;

        if let Err(source) = self.render_into(file, submission).await {
            remove_partial(&path).await;
            return Err(SynthesisError::Write { path, source });
        }

        debug!(path = %path.display(), bytes = submission.code.len(), "wrote source file");
        Ok(path)
    }

    /// Takes ownership of `file` so it is closed on every return path
    async fn render_into(&self, file: File, submission: &Submission) -> std::io::Result<()> {
        let mut writer = BufWriter::new(file);
        self.template.render(submission, &mut writer).await?;
        writer.flush().await?;
        writer.into_inner().sync_all().await
    }
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "failed to remove partial source file");
    }
}
