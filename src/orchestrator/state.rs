//! Run lifecycle state
//!
//! `Idle → Running → {Completed, Cancelled, Failed} → Idle`. Only one run
//! may be `Running` at a time; the phase cell is shared between the
//! orchestrator and its control task.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use super::sink::OutputSink;

// ─────────────────────────────────────────────────────────────────
// Phase / Status
// ─────────────────────────────────────────────────────────────────

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Cancelled,
    Failed(String),
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
            RunStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Lifecycle phase of the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    Finished(RunStatus),
}

impl Default for RunPhase {
    fn default() -> Self {
        RunPhase::Idle
    }
}

/// Shared phase cell
#[derive(Debug, Clone, Default)]
pub struct PhaseCell(Arc<Mutex<RunPhase>>);

impl PhaseCell {
    pub fn get(&self) -> RunPhase {
        self.0.lock().clone()
    }

    /// Move to `Running` unless a run is already in progress.
    ///
    /// Returns `false` (and changes nothing) when one is.
    pub fn try_begin(&self) -> bool {
        let mut phase = self.0.lock();
        if *phase == RunPhase::Running {
            return false;
        }
        *phase = RunPhase::Running;
        true
    }

    fn set(&self, phase: RunPhase) {
        *self.0.lock() = phase;
    }
}

/// Returns the phase to `Idle` when dropped, even if the control task
/// panicked. `finish` records the terminal status first.
pub struct PhaseGuard {
    cell: PhaseCell,
}

impl PhaseGuard {
    pub fn new(cell: PhaseCell) -> Self {
        Self { cell }
    }

    pub fn finish(&self, status: &RunStatus) {
        self.cell.set(RunPhase::Finished(status.clone()));
    }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        self.cell.set(RunPhase::Idle);
    }
}

// ─────────────────────────────────────────────────────────────────
// Cancellation
// ─────────────────────────────────────────────────────────────────

/// Cooperative cancellation flag, checked at discrete points
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ─────────────────────────────────────────────────────────────────
// Progress
// ─────────────────────────────────────────────────────────────────

/// Progress counters for one run. `total` is fixed at start.
#[derive(Debug)]
pub struct Progress {
    current: AtomicUsize,
    total: usize,
    started: Instant,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            current: AtomicUsize::new(0),
            total,
            started: Instant::now(),
        }
    }

    /// Advance and return the new index (1-based)
    pub fn advance(&self) -> usize {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

// ─────────────────────────────────────────────────────────────────
// RunState
// ─────────────────────────────────────────────────────────────────

/// Everything one run owns. Consumers only see it through the observer
/// and the [`RunHandle`](super::RunHandle).
pub struct RunState {
    pub cancel: CancelSignal,
    pub progress: Progress,
    pub sink: Arc<OutputSink>,
}

impl RunState {
    pub fn new(total: usize, cancel: CancelSignal, sink: Arc<OutputSink>) -> Self {
        Self {
            cancel,
            progress: Progress::new(total),
            sink,
        }
    }
}
