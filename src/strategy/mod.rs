//! Execution strategies
//!
//! The orchestrator runs every section through an [`ExecutionStrategy`] and
//! does not know which one it has:
//! - [`ProcessStrategy`]: spawns the helper program (through the sandbox
//!   bridge where needed) and captures its pipes
//! - [`InProcessStrategy`]: calls a linked [`ProbeLibrary`] and captures
//!   this process's stdout while it runs

mod in_process;
mod process;
mod request;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capture::LineCallback;
use crate::error::Result;
use crate::orchestrator::{RunConfig, TestSelection};

pub use in_process::{InProcessStrategy, ProbeLibrary};
pub use process::ProcessStrategy;
pub use request::ExecutionRequest;

/// Which strategy a run uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    /// Spawn the helper program
    #[default]
    Process,
    /// Call the built-in probe library
    InProcess,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Process => "process",
            ExecutionMode::InProcess => "in-process",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a section did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    NetworkUnreachable,
    UnsupportedPlatform,
    /// Only the helper program implements it
    RequiresHelper,
}

/// Result of one section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "lowercase")]
pub enum SectionOutcome {
    Completed,
    /// Reported as text; the run goes on
    Failed(String),
    Skipped(SkipReason),
}

impl SectionOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, SectionOutcome::Failed(_))
    }
}

/// Prepares a session for one run
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Resolve whatever the run needs (helper binary, sandbox shim).
    ///
    /// Called once per run, before any section. Degraded-mode
    /// announcements go to `notices`. Errors from here abort the run.
    async fn open(&self, notices: &LineCallback) -> Result<Arc<dyn ExecutionSession>>;
}

/// Runs sections for one run
#[async_trait]
pub trait ExecutionSession: Send + Sync {
    /// Run `selection` and stream its text into `output`.
    ///
    /// `Ok(Failed)` is a section failure. `Err` is reserved for failures to
    /// execute at all; fatal ones end the run.
    async fn run(
        &self,
        selection: &TestSelection,
        config: &RunConfig,
        output: LineCallback,
    ) -> Result<SectionOutcome>;

    /// Release per-run resources. Safe to call more than once.
    fn close(&self) {}
}
