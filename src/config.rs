//! Configuration for hostprobe
//!
//! Precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (HOSTPROBE_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::orchestrator::{Language, RunConfig, TestSelection};
use crate::strategy::ExecutionMode;

/// Android package that ships the helper libraries
pub const DEFAULT_PACKAGE_ID: &str = "com.oneclickvirt.goecs";

/// Smallest transcript buffer accepted
pub const MIN_OUTPUT_LIMIT: usize = 4 * 1024;

/// Full configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostprobeConfig {
    /// Helper discovery
    pub helper: HelperSettings,

    /// Per-test options
    pub run: RunConfig,

    /// Default selection when the CLI gives none
    pub selection: SelectionSettings,

    /// Network precheck
    pub network: NetworkSettings,

    /// Transcript handling
    pub output: OutputSettings,

    pub logging: LoggingSettings,
}

/// Helper discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HelperSettings {
    /// Explicit helper path; skips every search strategy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Directory holding the bundled payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_dir: Option<String>,

    /// Check the payload against its .sha256 sidecar
    pub verify_checksum: bool,

    /// Installed package to search for on Android
    pub package_id: String,

    pub mode: ExecutionMode,
}

/// Selection defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionSettings {
    /// Numbered preset (1-10)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<u8>,

    /// Explicit list; wins over `preset`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tests: Option<TestSelection>,
}

/// Network precheck settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Precheck timeout in milliseconds
    pub timeout_ms: u64,

    /// IPv4 `host:port` endpoints to try
    pub ipv4_targets: Vec<String>,

    /// IPv6 `[host]:port` endpoints to try
    pub ipv6_targets: Vec<String>,
}

/// Transcript settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Transcript bytes kept in memory
    pub limit_bytes: usize,

    /// Write the transcript here after each run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

impl Default for HelperSettings {
    fn default() -> Self {
        Self {
            path: None,
            bundle_dir: None,
            verify_checksum: false,
            package_id: DEFAULT_PACKAGE_ID.to_string(),
            mode: ExecutionMode::Process,
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 3000,
            ipv4_targets: crate::network::DEFAULT_IPV4_TARGETS.iter().map(|s| s.to_string()).collect(),
            ipv6_targets: crate::network::DEFAULT_IPV6_TARGETS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            limit_bytes: 10 * 1024 * 1024,
            transcript: None,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

impl NetworkSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn env_flag(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

impl HostprobeConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Config file, if any
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            config = Self::parse_file(&path)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Environment
        config.apply_env_overrides()?;

        // 3. Paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    fn parse_file(path: &std::path::Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| Error::IoRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse {
            message: format!("{}: {}", path.display(), e.message()),
            source: Some(e),
        })
    }

    /// Resolve the file to load; an explicit path must exist
    pub fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        for path in search_paths() {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply HOSTPROBE_* overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("HOSTPROBE_HELPER") {
            self.helper.path = Some(val);
        }
        if let Ok(val) = std::env::var("HOSTPROBE_MODE") {
            self.helper.mode = match val.to_ascii_lowercase().as_str() {
                "process" => ExecutionMode::Process,
                "in-process" | "inprocess" => ExecutionMode::InProcess,
                other => {
                    return Err(Error::config_field_invalid(
                        "HOSTPROBE_MODE",
                        format!("unknown mode '{}'; expected process or in-process", other),
                    ))
                }
            };
        }
        if let Ok(val) = std::env::var("HOSTPROBE_LANGUAGE") {
            self.run.language = match val.to_ascii_lowercase().as_str() {
                "en" => Language::En,
                "zh" => Language::Zh,
                other => {
                    return Err(Error::config_field_invalid(
                        "HOSTPROBE_LANGUAGE",
                        format!("unknown language '{}'; expected en or zh", other),
                    ))
                }
            };
        }

        if let Ok(val) = std::env::var("HOSTPROBE_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("HOSTPROBE_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("HOSTPROBE_LOG_JSON") {
            self.logging.json_format = env_flag(&val);
        }

        if let Ok(val) = std::env::var("HOSTPROBE_NETWORK_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.network.timeout_ms = n;
            }
        }
        if let Ok(val) = std::env::var("HOSTPROBE_OUTPUT_LIMIT_BYTES") {
            if let Ok(n) = val.parse() {
                self.output.limit_bytes = n;
            }
        }
        Ok(())
    }

    /// Expand ~ and environment variables in paths
    fn expand_paths(&mut self) {
        for path in [
            &mut self.helper.path,
            &mut self.helper.bundle_dir,
            &mut self.output.transcript,
            &mut self.logging.file,
            &mut self.run.disk_path,
        ]
        .into_iter()
        .flatten()
        {
            *path = expand_path(path);
        }
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        if self.network.timeout_ms == 0 {
            return Err(Error::config_field_invalid(
                "network.timeout_ms",
                "network timeout must be greater than 0",
            ));
        }

        if self.output.limit_bytes < MIN_OUTPUT_LIMIT {
            return Err(Error::config_field_invalid(
                "output.limit_bytes",
                format!("output limit must be at least {} bytes", MIN_OUTPUT_LIMIT),
            ));
        }

        if self.run.speed_nodes == 0 {
            return Err(Error::config_field_invalid(
                "run.speed_nodes",
                "speed test needs at least one node",
            ));
        }

        if self.helper.package_id.trim().is_empty() {
            return Err(Error::config_field_invalid(
                "helper.package_id",
                "package id cannot be empty",
            ));
        }

        if let Some(n) = self.selection.preset {
            crate::presets::find(n)?;
        }

        Ok(())
    }
}

/// Default lookup order
fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("hostprobe.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("hostprobe").join("config.toml"));
    }
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".hostprobe").join("config.toml"));
    }
    paths.push(PathBuf::from("/etc/hostprobe/config.toml"));
    paths
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Write a commented default configuration file, returning its path
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::config_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join("hostprobe")
                .join("config.toml")
        });

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|source| Error::IoWrite {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|source| Error::IoWrite {
        path: config_path.clone(),
        source,
    })?;

    Ok(config_path)
}

/// Default configuration content with comments
fn generate_default_config() -> String {
    format!(
        r#"# hostprobe configuration

[helper]
# Explicit helper binary; skips every search (also HOSTPROBE_HELPER)
# path = "/opt/goecs/goecs"

# Directory holding goecs-<os>-<arch> (default: <exe dir>/helpers, then <exe dir>)
# bundle_dir = "~/.local/share/hostprobe"

# Check the bundled helper against <payload>.sha256
verify_checksum = false

# Android package that installs libgoecs.so
package_id = "{package}"

# "process" runs the helper, "in-process" uses the built-in probes
mode = "process"

[run]
language = "en"
cpu_method = "sysbench"      # sysbench | geekbench | winsat
thread_mode = "multi"        # single | multi
memory_method = "auto"       # auto | stream | sysbench | dd | winsat
disk_method = "auto"         # auto | fio | dd | winsat
# disk_path = "/mnt/data"
disk_multi_check = false
nt3_location = "GZ"          # GZ | SH | BJ | CD | ALL
nt3_type = "ipv4"            # ipv4 | ipv6 | both
speed_nodes = 2
helper_log = false

[selection]
# Numbered preset, see 'hostprobe presets'
# preset = 8
# Explicit list, wins over preset
# tests = ["basic", "cpu", "memory", "disk"]

[network]
# Precheck timeout
timeout_ms = 3000

[output]
# Transcript bytes kept in memory; oldest lines are dropped first
limit_bytes = 10485760
# transcript = "~/hostprobe-report.txt"

[logging]
# trace | debug | info | warn | error
level = "info"
# file = "~/.local/state/hostprobe/hostprobe.log"
max_file_size_mb = 100
max_files = 5
json_format = false
"#,
        package = DEFAULT_PACKAGE_ID
    )
}
