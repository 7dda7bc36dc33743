//! Process resource limits
//!
//! Limits are installed on the current process with soft == hard, so neither
//! the runner nor anything it spawns can raise them again.

use rlimit::{Resource, getrlimit, setrlimit};
use thiserror::Error;
use tracing::debug;

use crate::types::ResourceLimits;

/// Errors raised while installing resource limits
#[derive(Debug, Error)]
pub enum LimitError {
    #[error("failed to set {resource} to {value}: {source}")]
    Set {
        resource: &'static str,
        value: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read back {resource}: {source}")]
    Query {
        resource: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{resource} not enforced: expected {expected}, found soft={soft} hard={hard}")]
    NotEnforced {
        resource: &'static str,
        expected: u64,
        soft: u64,
        hard: u64,
    },
}

/// Installs resource ceilings before anything is compiled
pub trait LimitEnforcer {
    fn apply(&self, limits: &ResourceLimits) -> Result<(), LimitError>;
}

/// [`LimitEnforcer`] that calls `setrlimit(2)` on the current process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLimits;

impl LimitEnforcer for ProcessLimits {
    fn apply(&self, limits: &ResourceLimits) -> Result<(), LimitError> {
        set_hard_limit(Resource::CPU, "RLIMIT_CPU", limits.cpu_time_limit)?;
        set_hard_limit(Resource::AS, "RLIMIT_AS", limits.memory_limit)?;
        Ok(())
    }
}

fn set_hard_limit(resource: Resource, name: &'static str, value: u64) -> Result<(), LimitError> {
    setrlimit(resource, value, value).map_err(|source| LimitError::Set {
        resource: name,
        value,
        source,
    })?;

    let (soft, hard) = getrlimit(resource).map_err(|source| LimitError::Query {
        resource: name,
        source,
    })?;
    if soft != value || hard != value {
        return Err(LimitError::NotEnforced {
            resource: name,
            expected: value,
            soft,
            hard,
        });
    }

    debug!(resource = name, value, "resource limit applied");
    Ok(())
}
