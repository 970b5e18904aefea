//! In-process strategy: linked probe functions with stdout captured

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{ExecutionSession, ExecutionStrategy, SectionOutcome};
use crate::capture::{capture_stdout, LineCallback};
use crate::error::{Error, Result};
use crate::orchestrator::{RunConfig, TestKind, TestSelection};

/// Probe functions linked into this binary.
///
/// Implementations print their report to stdout and return a status.
/// They run on a blocking thread.
pub trait ProbeLibrary: Send + Sync + 'static {
    fn run_probe(&self, kind: TestKind, config: &RunConfig) -> SectionOutcome;
}

/// Runs sections by calling a [`ProbeLibrary`]
pub struct InProcessStrategy<L> {
    library: Arc<L>,
}

impl<L: ProbeLibrary> InProcessStrategy<L> {
    pub fn new(library: L) -> Self {
        Self {
            library: Arc::new(library),
        }
    }
}

#[async_trait]
impl<L: ProbeLibrary> ExecutionStrategy for InProcessStrategy<L> {
    fn name(&self) -> &'static str {
        "in-process"
    }

    async fn open(&self, _notices: &LineCallback) -> Result<Arc<dyn ExecutionSession>> {
        Ok(Arc::new(InProcessSession {
            library: self.library.clone(),
        }))
    }
}

struct InProcessSession<L> {
    library: Arc<L>,
}

#[async_trait]
impl<L: ProbeLibrary> ExecutionSession for InProcessSession<L> {
    async fn run(
        &self,
        selection: &TestSelection,
        config: &RunConfig,
        output: LineCallback,
    ) -> Result<SectionOutcome> {
        let library = self.library.clone();
        let kinds: Vec<TestKind> = selection.iter().collect();
        let config = config.clone();

        let (captured, lines) = tokio::task::spawn_blocking(move || {
            let lines = Arc::new(Mutex::new(Vec::<String>::new()));
            let collect = lines.clone();
            let on_line: LineCallback = Arc::new(move |s: &str| collect.lock().push(s.to_string()));

            let captured = capture_stdout(on_line, || {
                let mut overall = SectionOutcome::Completed;
                for &kind in &kinds {
                    let outcome = library.run_probe(kind, &config);
                    if outcome.is_failed() && !overall.is_failed() {
                        overall = outcome;
                    }
                }
                overall
            });
            let lines = std::mem::take(&mut *lines.lock());
            (captured, lines)
        })
        .await
        .map_err(|e| Error::Internal(format!("probe thread failed: {}", e)))?;

        // fd 1 pointed into the capture pipe while the probes ran; forward
        // only after it is restored so a stdout consumer cannot feed itself.
        debug!(lines = lines.len(), "Forwarding in-process output");
        for line in &lines {
            output(line);
        }

        match captured? {
            Ok(outcome) => Ok(outcome),
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                warn!(reason = %reason, "Probe panicked");
                Ok(SectionOutcome::Failed(format!("probe panicked: {}", reason)))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write;

    struct Scripted;

    impl ProbeLibrary for Scripted {
        fn run_probe(&self, kind: TestKind, _config: &RunConfig) -> SectionOutcome {
            let mut out = std::io::stdout();
            match kind {
                TestKind::Cpu => {
                    out.write_all(b"cpu score: 1234\n").unwrap();
                    out.flush().unwrap();
                    SectionOutcome::Completed
                }
                TestKind::Disk => {
                    out.write_all(b"no disk\n").unwrap();
                    out.flush().unwrap();
                    SectionOutcome::Failed("no writable path".into())
                }
                _ => panic!("{} is not linked", kind),
            }
        }
    }

    fn collector() -> (LineCallback, Arc<Mutex<String>>) {
        let seen = Arc::new(Mutex::new(String::new()));
        let sink = seen.clone();
        let cb: LineCallback = Arc::new(move |s: &str| sink.lock().push_str(s));
        (cb, seen)
    }

    async fn run(kind: TestKind) -> (SectionOutcome, String) {
        let (notices, _) = collector();
        let session = InProcessStrategy::new(Scripted).open(&notices).await.unwrap();
        let (out, seen) = collector();
        let outcome = session
            .run(&TestSelection::only(kind), &RunConfig::default(), out)
            .await
            .unwrap();
        let text = seen.lock().clone();
        (outcome, text)
    }

    #[tokio::test]
    async fn test_stdout_is_captured() {
        let (outcome, text) = run(TestKind::Cpu).await;
        assert_eq!(outcome, SectionOutcome::Completed);
        assert_eq!(text, "cpu score: 1234\n");
    }

    #[tokio::test]
    async fn test_probe_failure_passes_through() {
        let (outcome, text) = run(TestKind::Disk).await;
        assert_eq!(outcome, SectionOutcome::Failed("no writable path".into()));
        assert_eq!(text, "no disk\n");
    }

    #[tokio::test]
    async fn test_panic_becomes_failure() {
        let (outcome, _) = run(TestKind::Speed).await;
        match outcome {
            SectionOutcome::Failed(reason) => assert!(reason.contains("speed is not linked")),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
