//! Configuration file loading for Fiddler
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, File, FileFormat};

use crate::config::{Config, ConfigError, SandboxMode};

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.cpu_time_limit == 0 {
            return Err(ConfigError::Invalid(
                "limits.cpu_time_limit must be positive".to_string(),
            ));
        }
        if self.limits.memory_limit == 0 {
            return Err(ConfigError::Invalid(
                "limits.memory_limit must be positive".to_string(),
            ));
        }
        if self.compiler.program.is_empty() {
            return Err(ConfigError::Invalid(
                "compiler.program is empty".to_string(),
            ));
        }
        if self.compiler.standard.is_empty() {
            return Err(ConfigError::Invalid(
                "compiler.standard is empty".to_string(),
            ));
        }
        if self.paths.wrapper.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("paths.wrapper is empty".to_string()));
        }
        if self.sandbox.mode == SandboxMode::Schroot
            && self.sandbox.chroot.as_deref().is_none_or(str::is_empty)
        {
            return Err(ConfigError::Invalid(
                "sandbox.chroot is required when sandbox.mode = \"schroot\"".to_string(),
            ));
        }

        Ok(())
    }
}
