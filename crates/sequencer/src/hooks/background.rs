use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use station_core::ExecutionContext;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{HookDispatcher, HookEvent};

/// Outcome of draining the background hook tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub completed: usize,
    /// Tasks still running at the deadline; these were aborted
    pub abandoned: usize,
}

/// Fire-and-forget hook dispatches owned by one run.
///
/// Tasks are spawned onto the current tokio runtime and tracked so the
/// engine can wait for them before reporting completion.
#[derive(Default)]
pub struct BackgroundHooks {
    tasks: Mutex<JoinSet<()>>,
}

impl BackgroundHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&self, dispatcher: &HookDispatcher, context: Arc<ExecutionContext>, event: HookEvent) {
        if dispatcher.is_empty() {
            return;
        }
        let dispatcher = dispatcher.clone();
        self.lock().spawn(async move {
            dispatcher.dispatch(&context, &event).await;
        });
    }

    /// Number of tracked tasks, finished or not, not yet drained.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Waits up to `timeout` for every tracked task, then aborts the rest.
    pub async fn drain(&self, timeout: Duration) -> DrainReport {
        let mut tasks = std::mem::take(&mut *self.lock());
        let mut report = DrainReport::default();
        if tasks.is_empty() {
            return report;
        }

        let deadline = Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(()))) => report.completed += 1,
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "Background hook task failed");
                    report.completed += 1;
                }
                Ok(None) => break,
                Err(_) => {
                    report.abandoned = tasks.len();
                    warn!(
                        abandoned = report.abandoned,
                        timeout_ms = timeout.as_millis() as u64,
                        "Background hooks did not finish in time, aborting"
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        debug!(
            completed = report.completed,
            abandoned = report.abandoned,
            "Background hooks drained"
        );
        report
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for BackgroundHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundHooks")
            .field("pending", &self.pending())
            .finish()
    }
}
