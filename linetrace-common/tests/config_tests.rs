//! Configuration resolution tests
//!
//! Tests cover:
//! - Priority order: CLI argument > LINETRACE_CONFIG > platform file > defaults
//! - Loading a TOML file from disk
//! - Invalid files surface as configuration errors
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate LINETRACE_CONFIG are marked with #[serial].

use linetrace_common::config::{
    resolve_config_path, DuplicatePolicy, StationConfig, CONFIG_ENV_VAR,
};
use linetrace_common::Error;
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
#[serial]
fn test_env_var_names_config_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "station.toml", "port = 7001\n");
    env::set_var(CONFIG_ENV_VAR, &path);

    let config = StationConfig::resolve(None).unwrap();
    assert_eq!(config.port, 7001);

    // Cleanup
    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_cli_argument_beats_env_var() {
    let dir = TempDir::new().unwrap();
    let from_env = write_config(&dir, "env.toml", "port = 7001\n");
    let from_cli = write_config(&dir, "cli.toml", "port = 7002\n");
    env::set_var(CONFIG_ENV_VAR, &from_env);

    assert_eq!(
        resolve_config_path(Some(&from_cli), CONFIG_ENV_VAR),
        Some(from_cli.clone())
    );
    let config = StationConfig::resolve(Some(&from_cli)).unwrap();
    assert_eq!(config.port, 7002);

    // Cleanup
    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_blank_env_var_is_ignored() {
    env::set_var(CONFIG_ENV_VAR, "  ");

    let resolved = resolve_config_path(None, CONFIG_ENV_VAR);
    assert_ne!(resolved, Some(std::path::PathBuf::from("  ")));

    // Cleanup
    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
fn test_load_full_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "station.toml",
        r#"
        database_path = "/var/lib/linetrace/linetrace.db"
        evidence_root = "/var/lib/linetrace/evidence"
        public_base_url = "http://linha3.local:5830/evidence"
        default_operator = "Turno_A"

        [policies]
        on_duplicate = "retry_same_serial"

        [logging]
        level = "debug"
        "#,
    );

    let config = StationConfig::load_file(&path).unwrap();
    assert_eq!(config.default_operator, "Turno_A");
    assert_eq!(config.policies.on_duplicate, DuplicatePolicy::RetrySameSerial);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.port, 5830);
}

#[test]
fn test_missing_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let result = StationConfig::load_file(&dir.path().join("absent.toml"));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_malformed_toml_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "broken.toml", "port = \"not a number\"\n");
    assert!(matches!(StationConfig::load_file(&path), Err(Error::Config(_))));
}
