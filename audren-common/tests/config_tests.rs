//! Tests for config file resolution and loading
//!
//! Tests that manipulate AUDREN_CONFIG are marked with #[serial] so they
//! don't race each other.

use audren_common::config::{load_or_default, resolve_config_path, LoggingConfig, CONFIG_ENV_VAR};
use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize, PartialEq)]
struct Sample {
    #[serde(default)]
    logging: LoggingConfig,
    #[serde(default)]
    voices: u32,
}

#[test]
#[serial]
fn test_cli_argument_wins_over_env() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");
    let resolved = resolve_config_path(Some(Path::new("/tmp/from-cli.toml")), CONFIG_ENV_VAR);
    assert_eq!(resolved, Some(PathBuf::from("/tmp/from-cli.toml")));
    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_used_without_cli() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");
    let resolved = resolve_config_path(None, CONFIG_ENV_VAR);
    assert_eq!(resolved, Some(PathBuf::from("/tmp/from-env.toml")));
    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
fn test_missing_file_gives_defaults() {
    let loaded: Sample = load_or_default(Some(Path::new("/nonexistent/audren.toml"))).unwrap();
    assert_eq!(loaded, Sample::default());

    let loaded: Sample = load_or_default(None).unwrap();
    assert_eq!(loaded.logging.level, "info");
}

#[test]
fn test_file_is_parsed() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "voices = 12\n[logging]\nlevel = \"debug\"").unwrap();

    let loaded: Sample = load_or_default(Some(file.path())).unwrap();
    assert_eq!(loaded.voices, 12);
    assert_eq!(loaded.logging.level, "debug");
    assert!(loaded.logging.file.is_none());
}

#[test]
fn test_malformed_file_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "voices = \"twelve\"").unwrap();

    let result: audren_common::Result<Sample> = load_or_default(Some(file.path()));
    assert!(result.is_err());
}
