//! Test orchestrator
//!
//! Runs a selection to completion or cancellation in the fixed display
//! order of [`TestKind::ALL`]:
//!
//! ```text
//! header → precheck → open strategy
//!   → basic, cpu, memory, disk
//!   → [launch unlock / email / ping in the background]
//!   → comm, unlock*, security, email*, backtrace, nt3, ping*, speed
//!   → summary | interrupted trailer
//! ```
//!
//! `*` sections are joined at their slot, so display order never depends
//! on which background task finishes first.

mod background;
mod render;
mod selection;
mod sink;
mod state;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::capture::LineCallback;
use crate::error::{Error, ErrorCode, Result};
use crate::network::{NetworkProbe, NetworkStatus};
use crate::platform::Platform;
use crate::strategy::{ExecutionSession, ExecutionStrategy, SectionOutcome, SkipReason};

use background::BackgroundProbe;
pub use selection::{
    CpuMethod, DiskMethod, Language, MemoryMethod, Nt3Location, Nt3Type, RunConfig, TestKind,
    TestSelection, ThreadMode,
};
#[cfg(test)]
pub use sink::NullObserver;
pub use sink::{ConsoleObserver, OutputSink, RunObserver};
pub use state::{CancelSignal, RunPhase, RunStatus};

use state::{PhaseCell, PhaseGuard, RunState};

/// Orchestrator knobs that are not per-run options
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Hard limit on the network precheck
    pub network_timeout: Duration,
    /// Transcript bytes retained by the sink
    pub output_limit: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            network_timeout: Duration::from_secs(3),
            output_limit: 10 * 1024 * 1024,
        }
    }
}

/// Outcome of one section in a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionRecord {
    pub kind: TestKind,
    #[serde(flatten)]
    pub outcome: SectionOutcome,
}

/// Final result of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub sections: Vec<SectionRecord>,
    /// Code of the error that failed the run
    #[serde(skip)]
    pub error_code: Option<ErrorCode>,
}

impl RunReport {
    /// Process exit code: 0 completed, 130 cancelled, the error's code otherwise
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Completed => 0,
            RunStatus::Cancelled => 130,
            RunStatus::Failed(_) => self
                .error_code
                .unwrap_or(ErrorCode::ExecutionFailed)
                .exit_code(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────

/// Owns the run lifecycle. Cheap to clone; clones share the phase.
#[derive(Clone)]
pub struct Orchestrator {
    strategy: Arc<dyn ExecutionStrategy>,
    network: Arc<dyn NetworkProbe>,
    platform: Platform,
    settings: OrchestratorSettings,
    phase: PhaseCell,
}

impl Orchestrator {
    pub fn new(
        strategy: Arc<dyn ExecutionStrategy>,
        network: Arc<dyn NetworkProbe>,
        platform: Platform,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            strategy,
            network,
            platform,
            settings,
            phase: PhaseCell::default(),
        }
    }

    #[cfg(test)]
    pub fn phase(&self) -> RunPhase {
        self.phase.get()
    }

    /// Start a run on the current tokio runtime.
    ///
    /// Returns `Ok(None)` without doing anything when a run is already in
    /// progress, and `Error::EmptySelection` when nothing is selected.
    pub fn start(
        &self,
        selection: TestSelection,
        config: RunConfig,
        observer: Arc<dyn RunObserver>,
    ) -> Result<Option<RunHandle>> {
        self.start_with(selection, config, observer, CancelSignal::new())
    }

    /// [`start`](Self::start) with a caller-provided cancellation signal
    pub fn start_with(
        &self,
        selection: TestSelection,
        config: RunConfig,
        observer: Arc<dyn RunObserver>,
        cancel: CancelSignal,
    ) -> Result<Option<RunHandle>> {
        if self.phase.get() == RunPhase::Running {
            debug!("Start ignored, a run is in progress");
            return Ok(None);
        }
        if selection.is_empty() {
            return Err(Error::EmptySelection);
        }
        if !self.phase.try_begin() {
            return Ok(None);
        }

        info!(
            selection = %selection,
            strategy = self.strategy.name(),
            platform = %self.platform,
            "Run starting"
        );

        let sink = Arc::new(OutputSink::new(self.settings.output_limit, observer.clone()));
        let state = RunState::new(selection.count(), cancel.clone(), sink.clone());
        let run = ControlTask {
            strategy: self.strategy.clone(),
            network: self.network.clone(),
            platform: self.platform,
            network_timeout: self.settings.network_timeout,
            selection,
            config,
            observer,
            state,
        };

        let guard = PhaseGuard::new(self.phase.clone());
        let task = tokio::spawn(async move {
            let report = run.execute().await;
            guard.finish(&report.status);
            report
        });

        Ok(Some(RunHandle { cancel, sink, task }))
    }
}

/// Caller's handle on a started run
pub struct RunHandle {
    cancel: CancelSignal,
    sink: Arc<OutputSink>,
    task: JoinHandle<RunReport>,
}

impl RunHandle {
    /// Request cooperative cancellation
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Transcript sink; stays readable after the run ends
    pub fn output(&self) -> Arc<OutputSink> {
        self.sink.clone()
    }

    pub async fn wait(self) -> RunReport {
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Run control task died");
                RunReport {
                    status: RunStatus::Failed(format!("run control task failed: {}", e)),
                    sections: Vec::new(),
                    error_code: Some(ErrorCode::InternalError),
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Control task
// ─────────────────────────────────────────────────────────────────

struct ControlTask {
    strategy: Arc<dyn ExecutionStrategy>,
    network: Arc<dyn NetworkProbe>,
    platform: Platform,
    network_timeout: Duration,
    selection: TestSelection,
    config: RunConfig,
    observer: Arc<dyn RunObserver>,
    state: RunState,
}

impl ControlTask {
    async fn execute(self) -> RunReport {
        let mut sections = Vec::new();
        let mut error_code = None;
        let status = self.drive(&mut sections, &mut error_code).await;
        info!(
            status = %status,
            sections = sections.len(),
            shown = self.state.progress.current(),
            total = self.state.progress.total(),
            "Run finished"
        );
        self.observer.on_done(&status);
        RunReport {
            status,
            sections,
            error_code,
        }
    }

    fn output_callback(&self) -> LineCallback {
        let sink = self.state.sink.clone();
        Arc::new(move |text: &str| sink.append(text))
    }

    async fn drive(
        &self,
        sections: &mut Vec<SectionRecord>,
        error_code: &mut Option<ErrorCode>,
    ) -> RunStatus {
        let sink = &self.state.sink;
        sink.append(&render::header(crate::version::VERSION));

        let network = self.network.check(self.network_timeout).await;
        info!(reachable = network.reachable, stack = ?network.stack, "Network precheck");
        let config = self.config.constrained_to(network.stack);

        let session = match self.strategy.open(&self.output_callback()).await {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e.format_for_log(), "Could not prepare execution");
                sink.append(&render::fatal(&e));
                *error_code = Some(e.code());
                return RunStatus::Failed(e.to_string());
            }
        };

        let status = self
            .run_sections(&session, &config, network, sections, error_code)
            .await;
        session.close();
        status
    }

    async fn run_sections(
        &self,
        session: &Arc<dyn ExecutionSession>,
        config: &RunConfig,
        network: NetworkStatus,
        sections: &mut Vec<SectionRecord>,
        error_code: &mut Option<ErrorCode>,
    ) -> RunStatus {
        let sink = &self.state.sink;
        let cancel = &self.state.cancel;
        let progress = &self.state.progress;
        let language = config.language;

        let mut pending: BTreeMap<TestKind, BackgroundProbe> = BTreeMap::new();
        let mut launched = false;
        let mut ended: Option<RunStatus> = None;

        for kind in self.selection.iter() {
            if kind.needs_network() {
                if !network.reachable {
                    debug!(test = %kind, "Skipping, network unreachable");
                    sections.push(SectionRecord {
                        kind,
                        outcome: SectionOutcome::Skipped(SkipReason::NetworkUnreachable),
                    });
                    continue;
                }
                if !launched {
                    launched = true;
                    if !cancel.is_cancelled() {
                        for group in self.selection.iter().filter(TestKind::is_concurrent) {
                            let probe = BackgroundProbe::launch(group, session.clone(), config.clone());
                            pending.insert(group, probe);
                        }
                    }
                }
            }

            if self.platform.is_windows() && !kind.runs_on_windows() {
                debug!(test = %kind, "Skipping, not available on Windows");
                sections.push(SectionRecord {
                    kind,
                    outcome: SectionOutcome::Skipped(SkipReason::UnsupportedPlatform),
                });
                continue;
            }

            if cancel.is_cancelled() {
                ended = Some(RunStatus::Cancelled);
                break;
            }

            let current = progress.advance();
            self.observer.on_progress(current, progress.total(), kind.label());
            sink.append(&render::section_title(&kind.title(language, config.method_for(kind))));

            let result = if kind.is_concurrent() {
                let Some(probe) = pending.remove(&kind) else {
                    warn!(test = %kind, "Concurrent section was never launched");
                    continue;
                };
                let joined = probe.join().await;
                if cancel.is_cancelled() {
                    debug!(test = %kind, "Discarding background result after cancel");
                    ended = Some(RunStatus::Cancelled);
                    break;
                }
                sink.append(&joined.text);
                joined.outcome
            } else {
                let only = TestSelection::only(kind);
                session.run(&only, config, self.output_callback()).await
            };

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) if e.is_fatal() => {
                    error!(test = %kind, error = %e.format_for_log(), "Section aborted the run");
                    sink.append(&render::fatal(&e));
                    sections.push(SectionRecord {
                        kind,
                        outcome: SectionOutcome::Failed(e.to_string()),
                    });
                    *error_code = Some(e.code());
                    ended = Some(RunStatus::Failed(e.to_string()));
                    break;
                }
                Err(e) => SectionOutcome::Failed(e.to_string()),
            };

            if let SectionOutcome::Failed(reason) = &outcome {
                warn!(test = %kind, reason = %reason, "Section failed");
                sink.append(&render::section_failed(kind.label(), reason));
            }
            sections.push(SectionRecord { kind, outcome });
        }

        if !pending.is_empty() {
            debug!(abandoned = pending.len(), "Leaving background sections to finish");
        }

        match ended {
            Some(status) => {
                if status == RunStatus::Cancelled {
                    sink.append(&render::interrupted(language));
                }
                status
            }
            None if cancel.is_cancelled() => {
                sink.append(&render::interrupted(language));
                RunStatus::Cancelled
            }
            None => {
                sink.append(&render::summary(language, progress.elapsed(), Local::now()));
                RunStatus::Completed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::LocatorError;
    use crate::network::{FixedProbe, StackType};
    use crate::platform::Arch;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use tokio::sync::Notify;

    // ─── fakes ───────────────────────────────────────────────────

    #[derive(Default)]
    struct FakeSession {
        delays: HashMap<TestKind, Duration>,
        errors: HashMap<TestKind, fn() -> Error>,
        cancel_after: Option<(TestKind, CancelSignal)>,
        gate: Option<Arc<Notify>>,
        started: Mutex<Vec<TestKind>>,
        finished: Mutex<Vec<TestKind>>,
        closed: Mutex<usize>,
    }

    #[async_trait]
    impl ExecutionSession for FakeSession {
        async fn run(
            &self,
            selection: &TestSelection,
            _config: &RunConfig,
            output: LineCallback,
        ) -> Result<SectionOutcome> {
            for kind in selection.iter() {
                self.started.lock().push(kind);
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
                if let Some(delay) = self.delays.get(&kind) {
                    tokio::time::sleep(*delay).await;
                }
                if let Some(make) = self.errors.get(&kind) {
                    return Err(make());
                }
                output(&format!("{} output\n", kind));
                self.finished.lock().push(kind);
                if let Some((after, signal)) = &self.cancel_after {
                    if *after == kind {
                        signal.cancel();
                    }
                }
            }
            Ok(SectionOutcome::Completed)
        }

        fn close(&self) {
            *self.closed.lock() += 1;
        }
    }

    struct FakeStrategy {
        session: Arc<FakeSession>,
        fail_open: bool,
    }

    #[async_trait]
    impl ExecutionStrategy for FakeStrategy {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn open(&self, notices: &LineCallback) -> Result<Arc<dyn ExecutionSession>> {
            if self.fail_open {
                return Err(LocatorError::NotFound {
                    arch: Arch::Arm64,
                    attempts: Vec::new(),
                    hint: "install the helper".to_string(),
                }
                .into());
            }
            notices("fake session ready\n");
            Ok(self.session.clone())
        }
    }

    #[derive(Default)]
    struct Recorder {
        output: Mutex<String>,
        progress: Mutex<Vec<(usize, usize, String)>>,
        done: Mutex<Vec<RunStatus>>,
    }

    impl RunObserver for Recorder {
        fn on_output(&self, text: &str) {
            self.output.lock().push_str(text);
        }

        fn on_progress(&self, current: usize, total: usize, label: &str) {
            self.progress.lock().push((current, total, label.to_string()));
        }

        fn on_done(&self, status: &RunStatus) {
            self.done.lock().push(status.clone());
        }
    }

    fn reachable() -> Arc<FixedProbe> {
        Arc::new(FixedProbe(NetworkStatus::from_stack(StackType::DualStack)))
    }

    fn unreachable() -> Arc<FixedProbe> {
        Arc::new(FixedProbe(NetworkStatus::unreachable()))
    }

    fn orchestrator(session: Arc<FakeSession>, network: Arc<FixedProbe>) -> Orchestrator {
        orchestrator_on(session, network, Platform::from_parts("linux", "x86_64", false))
    }

    fn orchestrator_on(session: Arc<FakeSession>, network: Arc<FixedProbe>, platform: Platform) -> Orchestrator {
        Orchestrator::new(
            Arc::new(FakeStrategy {
                session,
                fail_open: false,
            }),
            network,
            platform,
            OrchestratorSettings::default(),
        )
    }

    fn selection(kinds: &[TestKind]) -> TestSelection {
        kinds.iter().copied().collect()
    }

    async fn run(orch: &Orchestrator, kinds: &[TestKind]) -> (RunReport, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let handle = orch
            .start(selection(kinds), RunConfig::default(), recorder.clone())
            .unwrap()
            .unwrap();
        let report = handle.wait().await;
        (report, recorder)
    }

    fn position(haystack: &str, needle: &str) -> usize {
        haystack
            .find(needle)
            .unwrap_or_else(|| panic!("{:?} not in transcript:\n{}", needle, haystack))
    }

    // ─── lifecycle ───────────────────────────────────────────────

    #[tokio::test]
    async fn test_start_while_running_is_noop() {
        let gate = Arc::new(Notify::new());
        let session = Arc::new(FakeSession {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let orch = orchestrator(session.clone(), unreachable());
        let recorder = Arc::new(Recorder::default());

        let handle = orch
            .start(selection(&[TestKind::Cpu]), RunConfig::default(), recorder.clone())
            .unwrap()
            .expect("first start runs");
        assert_eq!(orch.phase(), RunPhase::Running);

        let other = Arc::new(Recorder::default());
        let second = orch
            .start(selection(&[TestKind::Memory]), RunConfig::default(), other.clone())
            .unwrap();
        assert!(second.is_none());
        assert!(other.output.lock().is_empty());

        gate.notify_one();
        let report = handle.wait().await;
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(*session.started.lock(), vec![TestKind::Cpu]);
        assert_eq!(orch.phase(), RunPhase::Idle);

        gate.notify_one();
        assert!(orch
            .start(selection(&[TestKind::Cpu]), RunConfig::default(), recorder)
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_empty_selection_rejected() {
        let orch = orchestrator(Arc::new(FakeSession::default()), unreachable());
        let result = orch.start(TestSelection::empty(), RunConfig::default(), Arc::new(NullObserver));
        assert!(matches!(result, Err(Error::EmptySelection)));
        assert_eq!(orch.phase(), RunPhase::Idle);
    }

    #[tokio::test]
    async fn test_completed_run_has_header_and_summary() {
        let session = Arc::new(FakeSession::default());
        let orch = orchestrator(session.clone(), unreachable());
        let (report, recorder) = run(&orch, &[TestKind::Basic, TestKind::Cpu]).await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(*recorder.done.lock(), vec![RunStatus::Completed]);
        assert_eq!(*session.closed.lock(), 1);

        let text = recorder.output.lock().clone();
        assert!(text.starts_with('-'));
        assert!(text.contains("hostprobe v"));
        assert!(text.contains("fake session ready\n"));
        assert!(position(&text, "basic output") < position(&text, "cpu output"));
        assert!(text.contains("Cost    Time"));
    }

    // ─── ordering ────────────────────────────────────────────────

    #[tokio::test]
    async fn test_display_order_independent_of_completion() {
        let session = Arc::new(FakeSession {
            delays: HashMap::from([(TestKind::Unlock, Duration::from_millis(200))]),
            ..Default::default()
        });
        let orch = orchestrator(session.clone(), reachable());
        let (report, recorder) = run(&orch, &[TestKind::Unlock, TestKind::Email]).await;

        assert_eq!(report.status, RunStatus::Completed);
        // Email really did finish first
        assert_eq!(*session.finished.lock(), vec![TestKind::Email, TestKind::Unlock]);

        let text = recorder.output.lock().clone();
        let unlock_title = position(&text, "Cross-Border-Streaming-Media-Unlock");
        let unlock = position(&text, "unlock output");
        let email_title = position(&text, "Email-Port-Check");
        let email = position(&text, "email output");
        assert!(unlock_title < unlock);
        assert!(unlock < email_title);
        assert!(email_title < email);
    }

    #[tokio::test]
    async fn test_sequential_sections_between_background_joins() {
        let session = Arc::new(FakeSession::default());
        let orch = orchestrator(session, reachable());
        let (_, recorder) = run(
            &orch,
            &[TestKind::Ping, TestKind::Cpu, TestKind::Security, TestKind::Unlock],
        )
        .await;

        let text = recorder.output.lock().clone();
        let order = [
            position(&text, "cpu output"),
            position(&text, "unlock output"),
            position(&text, "security output"),
            position(&text, "ping output"),
        ];
        assert!(order.windows(2).all(|w| w[0] < w[1]), "{}", text);
    }

    // ─── progress / network ──────────────────────────────────────

    #[tokio::test]
    async fn test_single_cpu_offline_progress() {
        let orch = orchestrator(Arc::new(FakeSession::default()), unreachable());
        let (report, recorder) = run(&orch, &[TestKind::Cpu]).await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(*recorder.progress.lock(), vec![(1, 1, "CPU".to_string())]);
    }

    #[tokio::test]
    async fn test_unreachable_network_skips_silently() {
        let session = Arc::new(FakeSession::default());
        let orch = orchestrator(session.clone(), unreachable());
        let (report, recorder) = run(&orch, &[TestKind::Cpu, TestKind::Speed, TestKind::Email]).await;

        assert_eq!(report.status, RunStatus::Completed);
        // Total is fixed at start
        assert_eq!(*recorder.progress.lock(), vec![(1, 3, "CPU".to_string())]);
        assert_eq!(*session.started.lock(), vec![TestKind::Cpu]);

        let text = recorder.output.lock().clone();
        assert!(!text.contains("Speed-Test"));
        assert!(!text.contains("Email-Port-Check"));
        assert!(!text.contains("failed"));
        assert!(report
            .sections
            .iter()
            .any(|s| s.kind == TestKind::Speed
                && s.outcome == SectionOutcome::Skipped(SkipReason::NetworkUnreachable)));
    }

    #[tokio::test]
    async fn test_route_skipped_on_windows() {
        let session = Arc::new(FakeSession::default());
        let orch = orchestrator_on(
            session.clone(),
            reachable(),
            Platform::from_parts("windows", "x86_64", false),
        );
        let (report, _) = run(&orch, &[TestKind::Cpu, TestKind::Backtrace, TestKind::Nt3]).await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(*session.started.lock(), vec![TestKind::Cpu]);
        let skipped = report
            .sections
            .iter()
            .filter(|s| s.outcome == SectionOutcome::Skipped(SkipReason::UnsupportedPlatform))
            .count();
        assert_eq!(skipped, 2);
    }

    // ─── cancellation ────────────────────────────────────────────

    #[tokio::test]
    async fn test_cancel_after_cpu() {
        let cancel = CancelSignal::new();
        let session = Arc::new(FakeSession {
            cancel_after: Some((TestKind::Cpu, cancel.clone())),
            ..Default::default()
        });
        let orch = orchestrator(session.clone(), unreachable());
        let recorder = Arc::new(Recorder::default());

        let handle = orch
            .start_with(
                selection(&[TestKind::Cpu, TestKind::Memory, TestKind::Disk]),
                RunConfig::default(),
                recorder.clone(),
                cancel,
            )
            .unwrap()
            .unwrap();
        let report = handle.wait().await;

        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(*session.started.lock(), vec![TestKind::Cpu]);

        let text = recorder.output.lock().clone();
        assert!(text.contains("cpu output"));
        assert!(!text.contains("Memory-Test"));
        assert!(!text.contains("Disk-Test"));
        assert!(text.ends_with("== test interrupted by user ==\n\n"));
        assert_eq!(text.matches("interrupted").count(), 1);
        assert!(!text.contains("Cost    Time"));
    }

    #[tokio::test]
    async fn test_cancel_discards_background_result() {
        let cancel = CancelSignal::new();
        let session = Arc::new(FakeSession {
            cancel_after: Some((TestKind::Comm, cancel.clone())),
            delays: HashMap::from([(TestKind::Unlock, Duration::from_millis(50))]),
            ..Default::default()
        });
        let orch = orchestrator(session, reachable());
        let recorder = Arc::new(Recorder::default());

        let handle = orch
            .start_with(
                selection(&[TestKind::Comm, TestKind::Unlock]),
                RunConfig::default(),
                recorder.clone(),
                cancel,
            )
            .unwrap()
            .unwrap();
        let sink = handle.output();
        let report = handle.wait().await;

        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(report.exit_code(), 130);
        let text = recorder.output.lock().clone();
        assert_eq!(sink.contents(), text);
        assert!(text.contains("comm output"));
        assert!(!text.contains("unlock output"));
    }

    // ─── failures ────────────────────────────────────────────────

    #[tokio::test]
    async fn test_open_failure_fails_run() {
        let orch = Orchestrator::new(
            Arc::new(FakeStrategy {
                session: Arc::new(FakeSession::default()),
                fail_open: true,
            }),
            unreachable(),
            Platform::from_parts("android", "aarch64", true),
            OrchestratorSettings::default(),
        );
        let (report, recorder) = run(&orch, &[TestKind::Cpu]).await;

        assert!(matches!(report.status, RunStatus::Failed(_)));
        assert_eq!(report.exit_code(), 30);
        assert!(report.sections.is_empty());
        assert!(recorder.progress.lock().is_empty());
        assert!(recorder.output.lock().contains("install the helper"));
        assert_eq!(recorder.done.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_section_error_does_not_stop_run() {
        let session = Arc::new(FakeSession {
            errors: HashMap::from([(
                TestKind::Memory,
                (|| Error::Execution("benchmark crashed".to_string())) as fn() -> Error,
            )]),
            ..Default::default()
        });
        let orch = orchestrator(session.clone(), unreachable());
        let (report, recorder) = run(&orch, &[TestKind::Memory, TestKind::Disk]).await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(*session.finished.lock(), vec![TestKind::Disk]);
        let text = recorder.output.lock().clone();
        assert!(position(&text, "✗ Memory failed") < position(&text, "disk output"));
    }

    #[tokio::test]
    async fn test_start_error_aborts_run() {
        let session = Arc::new(FakeSession {
            errors: HashMap::from([(
                TestKind::Basic,
                (|| {
                    Error::process_start(
                        "/opt/goecs",
                        std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                    )
                }) as fn() -> Error,
            )]),
            ..Default::default()
        });
        let orch = orchestrator(session.clone(), unreachable());
        let (report, recorder) = run(&orch, &[TestKind::Basic, TestKind::Cpu]).await;

        assert!(matches!(report.status, RunStatus::Failed(_)));
        assert_eq!(report.exit_code(), 50);
        assert_eq!(*session.started.lock(), vec![TestKind::Basic]);
        assert_eq!(*session.closed.lock(), 1);
        assert!(!recorder.output.lock().contains("Cost    Time"));
    }

    #[tokio::test]
    async fn test_background_start_error_aborts_run() {
        let session = Arc::new(FakeSession {
            errors: HashMap::from([(
                TestKind::Unlock,
                (|| {
                    Error::process_start(
                        "/opt/goecs",
                        std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                    )
                }) as fn() -> Error,
            )]),
            ..Default::default()
        });
        let orch = orchestrator(session.clone(), reachable());
        let (report, recorder) = run(&orch, &[TestKind::Unlock, TestKind::Security]).await;

        assert!(matches!(report.status, RunStatus::Failed(_)));
        assert_eq!(report.exit_code(), 50);
        assert_eq!(report.sections.len(), 1);
        assert_eq!(report.sections[0].kind, TestKind::Unlock);
        assert!(report.sections[0].outcome.is_failed());
        assert!(!session.started.lock().contains(&TestKind::Security));

        let text = recorder.output.lock().clone();
        assert!(text.contains("/opt/goecs"));
        assert!(!text.contains("security output"));
        assert!(!text.contains("Cost    Time"));
    }
}
