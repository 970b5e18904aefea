//! Helper subprocess strategy

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{ExecutionRequest, ExecutionSession, ExecutionStrategy, SectionOutcome};
use crate::capture::{capture_child, LineCallback};
use crate::error::{Error, Result};
use crate::locator::{BinaryHandle, BinaryLocator};
use crate::orchestrator::{RunConfig, TestSelection};
use crate::platform::Platform;
use crate::sandbox::SandboxBridge;

/// Spawns the helper program once per section
pub struct ProcessStrategy {
    locator: BinaryLocator,
    platform: Platform,
}

impl ProcessStrategy {
    pub fn new(locator: BinaryLocator, platform: Platform) -> Self {
        Self { locator, platform }
    }
}

#[async_trait]
impl ExecutionStrategy for ProcessStrategy {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn open(&self, notices: &LineCallback) -> Result<Arc<dyn ExecutionSession>> {
        let handle = self.locator.locate(&self.platform)?;
        info!(
            helper = %handle.path().display(),
            owned = handle.owns_lifecycle(),
            "Helper ready"
        );

        let bridge = if self.platform.sandboxed {
            let (bridge, notice) = SandboxBridge::prepare(self.locator.search_context(), self.platform.arch);
            debug!(degraded = bridge.is_degraded(), "Sandbox bridge prepared");
            notices(&notice);
            Some(bridge)
        } else {
            None
        };

        Ok(Arc::new(ProcessSession {
            handle,
            bridge,
            running: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }))
    }
}

/// One run's helper. The handle is released by `close`, or by the last
/// section still running when `close` was called.
struct ProcessSession {
    handle: BinaryHandle,
    bridge: Option<SandboxBridge>,
    running: AtomicUsize,
    closed: AtomicBool,
}

/// Marks a section in flight for the lifetime of the guard
struct InFlight<'a>(&'a ProcessSession);

impl<'a> InFlight<'a> {
    fn enter(session: &'a ProcessSession) -> Self {
        session.running.fetch_add(1, Ordering::SeqCst);
        Self(session)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let last = self.0.running.fetch_sub(1, Ordering::SeqCst) == 1;
        if last && self.0.closed.load(Ordering::SeqCst) {
            debug!("Last section after close finished, releasing helper");
            self.0.handle.cleanup();
        }
    }
}

impl ProcessSession {
    fn request(&self, selection: &TestSelection, config: &RunConfig) -> ExecutionRequest {
        match &self.bridge {
            Some(bridge) => ExecutionRequest::sandboxed(bridge, self.handle.path(), selection, config),
            None => ExecutionRequest::build(self.handle.path(), selection, config),
        }
    }
}

#[async_trait]
impl ExecutionSession for ProcessSession {
    async fn run(
        &self,
        selection: &TestSelection,
        config: &RunConfig,
        output: LineCallback,
    ) -> Result<SectionOutcome> {
        let _in_flight = InFlight::enter(self);
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Execution("run already closed".to_string()));
        }

        let request = self.request(selection, config);
        debug!(command = %request.preview(), "Spawning helper");

        let mut child = Command::new(request.program())
            .args(request.args())
            .envs(request.env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::process_start(request.program(), e))?;

        let status = capture_child(&mut child, &output)
            .await
            .map_err(|e| Error::Execution(format!("waiting for helper: {}", e)))?;

        if status.success() {
            Ok(SectionOutcome::Completed)
        } else {
            warn!(selection = %selection, status = %status, "Helper exited with failure");
            Ok(SectionOutcome::Failed(format!("helper exited with {}", status)))
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let in_flight = self.running.load(Ordering::SeqCst);
        if in_flight == 0 {
            self.handle.cleanup();
        } else {
            info!(in_flight, "Deferring helper cleanup until abandoned sections finish");
        }
    }
}
