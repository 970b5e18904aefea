//! Common test utilities and fixtures
//!
//! This module provides shared test infrastructure

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;

/// Get the path to the test fixtures directory
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Get a path to a specific fixture file
pub fn fixture_path(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}

/// Get the valid config fixture path
pub fn valid_config_fixture() -> PathBuf {
    fixture_path("valid_config.toml")
}

/// Get the invalid config fixture path
pub fn invalid_config_fixture() -> PathBuf {
    fixture_path("invalid_config.toml")
}

/// hostprobe command isolated from the user's config and environment.
///
/// HOME, XDG_CONFIG_HOME and the working directory all point at `home`,
/// so no config file is picked up unless the test writes one.
pub fn hostprobe_cmd(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("hostprobe").unwrap();
    cmd.current_dir(home)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("HOSTPROBE_NETWORK_TIMEOUT_MS", "200")
        .env_remove("HOSTPROBE_CONFIG")
        .env_remove("HOSTPROBE_HELPER")
        .env_remove("HOSTPROBE_MODE")
        .env_remove("HOSTPROBE_LANGUAGE")
        .env_remove("HOSTPROBE_LIB_DIR")
        .env_remove("HOSTPROBE_LOG_FILE")
        .env_remove("RUST_LOG");
    cmd
}

/// Write an executable shell script standing in for the helper
#[cfg(unix)]
pub fn write_fake_helper(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("goecs");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_dir_exists() {
        assert!(fixtures_dir().exists(), "Fixtures directory should exist");
    }

    #[test]
    fn test_valid_config_exists() {
        assert!(
            valid_config_fixture().exists(),
            "Valid config fixture should exist"
        );
    }

    #[test]
    fn test_invalid_config_exists() {
        assert!(
            invalid_config_fixture().exists(),
            "Invalid config fixture should exist"
        );
    }
}
