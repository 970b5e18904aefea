//! Locator error type and the per-strategy attempt record it aggregates.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::platform::Arch;

/// One discovery strategy, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// `helper.path` / `HOSTPROBE_HELPER`
    ExplicitPath,
    /// `HOSTPROBE_LIB_DIR`
    LibDirOverride,
    ExecutableAncestors,
    KnownPaths,
    AppRootScan,
    LoadedModules,
    BundledPayload,
}

impl Strategy {
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::ExplicitPath => "explicit helper path",
            Strategy::LibDirOverride => "library dir override",
            Strategy::ExecutableAncestors => "executable ancestors",
            Strategy::KnownPaths => "known install paths",
            Strategy::AppRootScan => "app-install root scan",
            Strategy::LoadedModules => "loaded module table",
            Strategy::BundledPayload => "bundled payload",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What one strategy looked at before giving up
#[derive(Debug, Clone, Serialize)]
pub struct StrategyAttempt {
    pub strategy: Strategy,
    pub checked: Vec<PathBuf>,
    pub note: Option<String>,
}

impl StrategyAttempt {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            checked: Vec::new(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Helper discovery failure
#[derive(Error, Debug)]
pub enum LocatorError {
    /// No strategy produced an existing file
    #[error("helper binary not found for {arch}\n{}", render_attempts(.attempts, .hint))]
    NotFound {
        arch: Arch,
        attempts: Vec<StrategyAttempt>,
        hint: String,
    },

    /// The bundled payload could not be written out
    #[error("failed to extract helper to {path}: {source}")]
    ExtractFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bundled payload does not match its checksum sidecar
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

impl LocatorError {
    /// Every path checked across all strategies, in order
    #[cfg(test)]
    pub fn checked_paths(&self) -> Vec<&PathBuf> {
        match self {
            LocatorError::NotFound { attempts, .. } => {
                attempts.iter().flat_map(|a| a.checked.iter()).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn render_attempts(attempts: &[StrategyAttempt], hint: &str) -> String {
    let mut out = String::new();
    for (i, attempt) in attempts.iter().enumerate() {
        out.push_str(&format!("  [{}] {}", i + 1, attempt.strategy));
        match &attempt.note {
            Some(note) => out.push_str(&format!(" ({})\n", note)),
            None => out.push('\n'),
        }
        for path in &attempt.checked {
            out.push_str(&format!("      - {}\n", path.display()));
        }
    }
    out.push_str(hint);
    out
}
