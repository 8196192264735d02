//! Tests for config file discovery and storage root resolution
//!
//! Uses serial_test to prevent ENV variable race conditions.
//! Tests that manipulate process environment are marked with #[serial]
//! so they run sequentially, not in parallel.

use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tonewiki_common::config::{
    default_storage_root, resolve_config_file, resolve_storage_root,
};

const ROOT_VAR: &str = "TONEWIKI_TEST_STORAGE_ROOT";
const CONFIG_VAR: &str = "TONEWIKI_TEST_CONFIG_PATH";

#[test]
#[serial]
fn test_storage_root_defaults_when_nothing_configured() {
    env::remove_var(ROOT_VAR);

    let root = resolve_storage_root(None, ROOT_VAR, None, "refdata");

    assert_eq!(root, default_storage_root("refdata"));
}

#[test]
#[serial]
fn test_storage_root_cli_beats_env_and_toml() {
    env::set_var(ROOT_VAR, "/tmp/tonewiki-env-root");

    let root = resolve_storage_root(
        Some(Path::new("/tmp/tonewiki-cli-root")),
        ROOT_VAR,
        Some(Path::new("/tmp/tonewiki-toml-root")),
        "refdata",
    );

    assert_eq!(root, PathBuf::from("/tmp/tonewiki-cli-root"));
    env::remove_var(ROOT_VAR);
}

#[test]
#[serial]
fn test_storage_root_env_beats_toml() {
    env::set_var(ROOT_VAR, "/tmp/tonewiki-env-root");

    let root = resolve_storage_root(
        None,
        ROOT_VAR,
        Some(Path::new("/tmp/tonewiki-toml-root")),
        "refdata",
    );

    assert_eq!(root, PathBuf::from("/tmp/tonewiki-env-root"));
    env::remove_var(ROOT_VAR);
}

#[test]
#[serial]
fn test_storage_root_blank_env_is_ignored() {
    env::set_var(ROOT_VAR, "   ");

    let root = resolve_storage_root(None, ROOT_VAR, Some(Path::new("/tmp/from-toml")), "refdata");

    assert_eq!(root, PathBuf::from("/tmp/from-toml"));
    env::remove_var(ROOT_VAR);
}

#[test]
#[serial]
fn test_config_file_from_env_var() {
    env::set_var(CONFIG_VAR, "/tmp/tonewiki-from-env.toml");

    let path = resolve_config_file(None, CONFIG_VAR, "tonewiki-test-nonexistent.toml");

    assert_eq!(path, Some(PathBuf::from("/tmp/tonewiki-from-env.toml")));
    env::remove_var(CONFIG_VAR);
}

#[test]
#[serial]
fn test_config_file_missing_everywhere_is_none() {
    env::remove_var(CONFIG_VAR);

    let path = resolve_config_file(None, CONFIG_VAR, "tonewiki-test-definitely-missing-4821.toml");

    assert!(path.is_none());
}
