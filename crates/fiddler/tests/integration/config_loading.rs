use fiddler::config::{Config, Retention, SandboxMode};

use super::FIXTURES_PATH;

#[test]
fn test_load_direct_config() {
    let path = format!("{FIXTURES_PATH}/configs/valid_direct.toml");
    let config = Config::from_file(&path).expect("Failed to load config");

    assert_eq!(config.sandbox.mode, SandboxMode::Direct);
    assert_eq!(config.retention, Retention::Keep);
    assert_eq!(config.limits.cpu_time_limit, 5);
    assert_eq!(
        config.paths.wrapper.to_str(),
        Some("/opt/skia/out/fiddle/secwrap")
    );
}

#[test]
fn test_load_minimal_config() {
    let path = format!("{FIXTURES_PATH}/configs/valid_minimal.toml");
    let config = Config::from_file(&path).expect("Failed to load config");

    assert_eq!(config.sandbox.mode, SandboxMode::Direct);
    assert_eq!(config.compiler.program, "c++");
}

#[test]
fn test_load_invalid_schroot_without_chroot() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_schroot_without_chroot.toml");
    let result = Config::from_file(&path);
    assert!(result.is_err());
}

#[test]
fn test_load_invalid_zero_cpu_limit() {
    let path = format!("{FIXTURES_PATH}/configs/invalid_zero_cpu_limit.toml");
    let result = Config::from_file(&path);
    assert!(result.is_err());
}
