//! Error types for hostprobe
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - Exit codes for CLI
//!
//! Component errors ([`LocatorError`], [`SandboxError`]) are defined next to
//! the code that raises them and folded in here with `#[from]`.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::locator::LocatorError;
use crate::sandbox::SandboxError;

/// Result type alias for hostprobe operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,
    EmptySelection = 103,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,

    // Helper discovery errors (3xx)
    HelperNotFound = 300,
    HelperExtractFailed = 301,
    HelperChecksum = 302,

    // Sandbox errors (4xx)
    ShimUnavailable = 400,

    // Execution errors (5xx)
    ProcessStart = 500,
    ExecutionFailed = 501,

    // Capture errors (6xx)
    RedirectFailed = 600,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO errors
            300..=399 => 30, // Helper discovery errors
            400..=499 => 40, // Sandbox errors
            500..=599 => 50, // Execution errors
            600..=699 => 60, // Capture errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for hostprobe
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A run was requested with nothing selected
    #[error("No tests selected: select at least one test")]
    EmptySelection,

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File read error
    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Helper Discovery / Sandbox Errors
    // ─────────────────────────────────────────────────────────────

    /// Helper binary could not be found or materialized
    #[error(transparent)]
    Locator(#[from] LocatorError),

    /// Sandbox shim problem
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    // ─────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────

    /// The helper process could not be spawned
    #[error("Failed to start {program}: {source}")]
    ProcessStart {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A section could not run; rendered into the transcript, run continues
    #[error("Execution error: {0}")]
    Execution(String),

    // ─────────────────────────────────────────────────────────────
    // Capture Errors
    // ─────────────────────────────────────────────────────────────

    /// Standard stream redirection could not be installed
    #[error("Failed to redirect standard streams: {0}")]
    Redirect(String),

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,
            Error::Config(_) => ErrorCode::ConfigValidation,
            Error::EmptySelection => ErrorCode::EmptySelection,

            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::Json(_) => ErrorCode::IoWrite,

            Error::Locator(e) => match e {
                LocatorError::NotFound { .. } => ErrorCode::HelperNotFound,
                LocatorError::ExtractFailed { .. } => ErrorCode::HelperExtractFailed,
                LocatorError::ChecksumMismatch { .. } => ErrorCode::HelperChecksum,
            },
            Error::Sandbox(_) => ErrorCode::ShimUnavailable,

            Error::ProcessStart { .. } => ErrorCode::ProcessStart,
            Error::Execution(_) => ErrorCode::ExecutionFailed,

            Error::Redirect(_) => ErrorCode::RedirectFailed,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the error is fatal (the run aborts instead of continuing)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotFound { .. }
                | Error::ConfigParse { .. }
                | Error::ConfigValidation { .. }
                | Error::Config(_)
                | Error::EmptySelection
                | Error::Locator(_)
                | Error::ProcessStart { .. }
                | Error::Redirect(_)
                | Error::Internal(_)
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'hostprobe config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'hostprobe config validate' to see details."
            ),
            Error::ConfigValidation { .. } => Some(
                "Review the configuration file and fix the invalid values."
            ),
            Error::EmptySelection => Some(
                "Pass --tests or --preset, or list tests under [selection] in the config file. Run 'hostprobe presets' for the numbered presets."
            ),

            Error::Locator(LocatorError::NotFound { .. }) => Some(
                "Set HOSTPROBE_HELPER to the helper binary, or run 'hostprobe locate' to see every path that was checked."
            ),
            Error::Locator(LocatorError::ExtractFailed { .. }) => Some(
                "The temporary directory is not writable. Set TMPDIR to a writable location."
            ),
            Error::Locator(LocatorError::ChecksumMismatch { .. }) => Some(
                "The bundled helper does not match its .sha256 file. Reinstall hostprobe or disable helper.verify_checksum."
            ),

            Error::ProcessStart { .. } => Some(
                "The helper exists but could not be executed. Check its permissions and that it matches this CPU architecture."
            ),
            Error::Redirect(_) => Some(
                "In-process mode needs POSIX file descriptors. Use '--mode process' instead."
            ),

            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();
        let suggestion = self.suggestion();

        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            code.as_str(),
            self
        );

        if let Some(hint) = suggestion {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging and transcripts (no colors)
    pub fn format_for_log(&self) -> String {
        let code = self.code();
        format!("[{}] {}", code.as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors (for ergonomic error creation)
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a process start error
    pub fn process_start(program: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::ProcessStart {
            program: program.into(),
            source,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
