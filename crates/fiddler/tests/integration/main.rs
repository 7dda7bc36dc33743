//! Integration tests for fiddler
//!
//! These tests compile against a real Skia fiddle install. Point
//! `FIDDLER_TEST_CONFIG` at a config describing it (direct mode) and run:
//!    cargo test -p fiddler --features integration-tests -- --include-ignored

#![cfg(feature = "integration-tests")]

use std::fs;

use fiddler::config::Config;
use fiddler::sandbox::LimitEnforcer;
use fiddler::{LimitError, ResourceLimits};

mod compile_and_run;
mod config_loading;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture code
pub(crate) fn fixture_code(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/code/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// Load the config describing the local Skia install
pub(crate) fn test_config() -> Config {
    let path = std::env::var("FIDDLER_TEST_CONFIG")
        .expect("FIDDLER_TEST_CONFIG must point at a fiddler config");
    Config::from_file(&path).expect("Failed to load test config")
}

/// Process-wide limits would also constrain the test harness, so these tests
/// leave them alone; the CLI tests cover enforcement in a child process.
pub(crate) struct SkipLimits;

impl LimitEnforcer for SkipLimits {
    fn apply(&self, _limits: &ResourceLimits) -> Result<(), LimitError> {
        Ok(())
    }
}
