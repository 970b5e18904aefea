//! Background execution of concurrent-group sections

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::capture::LineCallback;
use crate::error::{Error, Result};
use crate::orchestrator::{RunConfig, TestKind, TestSelection};
use crate::strategy::{ExecutionSession, SectionOutcome};

/// What a background section produced. Errors stay errors; the join point
/// decides whether one ends the run.
#[derive(Debug)]
pub struct ProbeResult {
    pub text: String,
    pub outcome: Result<SectionOutcome>,
}

/// One in-flight concurrent-group section.
///
/// The task writes its result exactly once through a oneshot channel; the
/// control task reads it at the section's display slot. Dropping the probe
/// abandons the result but lets the task finish.
pub struct BackgroundProbe {
    kind: TestKind,
    result: oneshot::Receiver<ProbeResult>,
}

impl BackgroundProbe {
    pub fn launch(kind: TestKind, session: Arc<dyn ExecutionSession>, config: RunConfig) -> Self {
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let buffer = Arc::new(Mutex::new(String::new()));
            let writer = buffer.clone();
            let output: LineCallback = Arc::new(move |s: &str| writer.lock().push_str(s));

            let outcome = session.run(&TestSelection::only(kind), &config, output).await;
            let text = std::mem::take(&mut *buffer.lock());
            debug!(test = %kind, bytes = text.len(), "Background section finished");

            // The receiver is gone when the run was cancelled
            let _ = tx.send(ProbeResult { text, outcome });
        });

        debug!(test = %kind, "Background section launched");
        Self { kind, result: rx }
    }

    /// Wait for the section to finish
    pub async fn join(self) -> ProbeResult {
        match self.result.await {
            Ok(result) => result,
            Err(_) => ProbeResult {
                text: String::new(),
                outcome: Err(Error::Execution(format!(
                    "{} task ended without a result",
                    self.kind.label()
                ))),
            },
        }
    }
}
