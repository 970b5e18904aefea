//! Integration test harness
//!
//! End-to-end runs against stand-in helpers: bundled payload extraction,
//! transcript bounds, log files and exit codes.

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use predicates::prelude::*;
use sha2::{Digest, Sha256};
use tempfile::TempDir;

use common::hostprobe_cmd;

// ─────────────────────────────────────────────────────────────────
// Test Fixtures
// ─────────────────────────────────────────────────────────────────

/// Complete test environment with all necessary directories and files
pub struct TestEnvironment {
    pub root: TempDir,
    pub config_path: PathBuf,
    pub bundle_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl TestEnvironment {
    /// Create a new test environment with an offline configuration
    pub fn new() -> Self {
        Self::with_extra("")
    }

    /// Same, with extra TOML appended to the configuration
    pub fn with_extra(extra: &str) -> Self {
        let root = TempDir::new().expect("Failed to create temp directory");
        let root_path = root.path();

        let bundle_dir = root_path.join("bundle");
        let temp_dir = root_path.join("tmp");
        let log_dir = root_path.join("logs");
        let config_path = root_path.join("config.toml");

        fs::create_dir_all(&bundle_dir).expect("Failed to create bundle dir");
        fs::create_dir_all(&temp_dir).expect("Failed to create temp dir");
        fs::create_dir_all(&log_dir).expect("Failed to create log dir");

        let config = format!(
            r#"
[helper]
bundle_dir = "{bundle}"

[network]
timeout_ms = 200
ipv4_targets = []
ipv6_targets = []

[logging]
level = "debug"
file = "{log}"
{extra}
"#,
            bundle = bundle_dir.display(),
            log = log_dir.join("hostprobe.log").display(),
            extra = extra,
        );
        fs::write(&config_path, config).expect("Failed to write config");

        Self {
            root,
            config_path,
            bundle_dir,
            temp_dir,
            log_dir,
        }
    }

    pub fn config(&self) -> &str {
        self.config_path.to_str().unwrap()
    }

    pub fn home(&self) -> &Path {
        self.root.path()
    }

    /// Command with TMPDIR pointed at the environment's temp dir
    pub fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = hostprobe_cmd(self.home());
        cmd.env("TMPDIR", &self.temp_dir);
        cmd
    }

    /// Directories the locator extracted into and left behind
    pub fn leftover_extractions(&self) -> Vec<PathBuf> {
        fs::read_dir(&self.temp_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().starts_with("hostprobe-"))
                    .unwrap_or(false)
            })
            .collect()
    }
}

/// Bundled payload name for the machine running the tests
#[cfg(target_os = "linux")]
fn payload_name() -> String {
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "arm" => "arm",
        _ => "unknown",
    };
    format!("goecs-linux-{}", arch)
}

#[cfg(target_os = "linux")]
fn write_payload(env: &TestEnvironment, script: &str, checksum: Option<&str>) -> PathBuf {
    let body = format!("#!/bin/sh\n{}\n", script);
    let path = env.bundle_dir.join(payload_name());
    fs::write(&path, &body).unwrap();

    let digest = checksum
        .map(str::to_string)
        .unwrap_or_else(|| hex::encode(Sha256::digest(body.as_bytes())));
    fs::write(
        format!("{}.sha256", path.display()),
        format!("{}  {}\n", digest, payload_name()),
    )
    .unwrap();
    path
}

// ─────────────────────────────────────────────────────────────────
// Bundled payload
// ─────────────────────────────────────────────────────────────────

#[cfg(target_os = "linux")]
#[test]
fn test_bundled_payload_extracted_and_removed() {
    let env = TestEnvironment::with_extra("");
    fs::write(
        &env.config_path,
        fs::read_to_string(&env.config_path)
            .unwrap()
            .replace("[helper]", "[helper]\nverify_checksum = true"),
    )
    .unwrap();
    write_payload(&env, r#"echo "bundled helper running from $0""#, None);

    env.cmd()
        .args(["run", "--tests", "basic", "--config", env.config()])
        .assert()
        .success()
        .stdout(predicate::str::contains("bundled helper running from"))
        .stdout(predicate::str::contains("hostprobe-"));

    assert!(
        env.leftover_extractions().is_empty(),
        "extraction directory should be removed after the run"
    );
}

#[cfg(target_os = "linux")]
#[test]
fn test_bundled_payload_checksum_mismatch() {
    let env = TestEnvironment::new();
    fs::write(
        &env.config_path,
        fs::read_to_string(&env.config_path)
            .unwrap()
            .replace("[helper]", "[helper]\nverify_checksum = true"),
    )
    .unwrap();
    write_payload(&env, "echo never", Some("00ff"));

    env.cmd()
        .args(["run", "--tests", "basic", "--config", env.config()])
        .assert()
        .code(30)
        .stdout(predicate::str::contains("checksum"))
        .stdout(predicate::str::contains("never").not());

    assert!(env.leftover_extractions().is_empty());
}

#[cfg(target_os = "linux")]
#[test]
fn test_locate_reports_bundled_payload() {
    let env = TestEnvironment::new();
    write_payload(&env, "true", None);

    env.cmd()
        .args(["locate", "--config", env.config()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Found by : bundled payload"));

    // locate does not keep the extracted copy around
    assert!(env.leftover_extractions().is_empty());
}

// ─────────────────────────────────────────────────────────────────
// Transcript
// ─────────────────────────────────────────────────────────────────

#[cfg(unix)]
#[test]
fn test_transcript_is_bounded() {
    let env = TestEnvironment::with_extra("\n[output]\nlimit_bytes = 4096\n");
    let helper = common::write_fake_helper(
        env.home(),
        r#"i=0; while [ $i -lt 2000 ]; do echo "helper line $i"; i=$((i+1)); done"#,
    );
    let transcript = env.home().join("report.txt");

    env.cmd()
        .env("HOSTPROBE_HELPER", &helper)
        .args(["run", "--tests", "cpu", "--config", env.config(), "--output"])
        .arg(&transcript)
        .assert()
        .success()
        .stdout(predicate::str::contains("helper line 0\n"));

    let text = fs::read_to_string(&transcript).unwrap();
    assert!(text.len() <= 4096, "transcript holds {} bytes", text.len());
    assert!(!text.contains("helper line 0\n"));
    assert!(text.contains("helper line 1999\n"));
    assert!(text.contains("Cost    Time"));
}

#[cfg(unix)]
#[test]
fn test_stderr_lines_are_captured() {
    let env = TestEnvironment::new();
    let helper = common::write_fake_helper(env.home(), "echo to-stdout; echo to-stderr >&2");

    env.cmd()
        .env("HOSTPROBE_HELPER", &helper)
        .args(["run", "--tests", "disk", "--config", env.config()])
        .assert()
        .success()
        .stdout(predicate::str::contains("to-stdout"))
        .stdout(predicate::str::contains("to-stderr"));
}

// ─────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_log_file_creation() {
    let env = TestEnvironment::new();
    let helper = env.home().join("goecs");
    fs::write(&helper, b"#!/bin/sh\n").unwrap();

    env.cmd()
        .env("HOSTPROBE_HELPER", &helper)
        .args(["locate", "--config", env.config()])
        .assert()
        .success();

    let logs: Vec<_> = fs::read_dir(&env.log_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("hostprobe.log"))
        .collect();
    assert!(!logs.is_empty(), "a rolling log file should be created");
}

// ─────────────────────────────────────────────────────────────────
// Error Scenario Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_error_exit_codes() {
    let home = TempDir::new().unwrap();

    // Config not found
    hostprobe_cmd(home.path())
        .args(["run", "--config", "/nonexistent/hostprobe.toml"])
        .assert()
        .code(10)
        .stderr(predicate::str::contains("E100"));

    // Unknown subcommand is a clap usage error
    hostprobe_cmd(home.path())
        .arg("benchmark")
        .assert()
        .code(2);
}

#[test]
fn test_config_env_var_is_used_by_run() {
    let env = TestEnvironment::with_extra("\n[selection]\ntests = []\n");

    env.cmd()
        .env("HOSTPROBE_CONFIG", env.config())
        .args(["run", "--mode", "in-process"])
        .assert()
        .code(10)
        .stderr(predicate::str::contains("select at least one test"));
}

// ─────────────────────────────────────────────────────────────────
// Performance Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_startup_time() {
    let home = TempDir::new().unwrap();
    let start = Instant::now();

    hostprobe_cmd(home.path()).arg("presets").assert().success();

    assert!(
        start.elapsed() < Duration::from_secs(5),
        "presets took {:?}",
        start.elapsed()
    );
}
