//! Lifecycle observers.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `dispatcher` | Invokes every registered hook for an event, containing failures |
//! | `background` | Tracked fire-and-forget dispatch for step and measurement events |
//!
//! Phase transitions are dispatched inline and awaited by the engine. Step and
//! measurement events are dispatched on background tasks so a slow observer
//! never holds up a step; the engine drains those tasks with a bounded wait
//! before the final `sequence_complete` event.

mod background;
mod dispatcher;

pub use background::{BackgroundHooks, DrainReport};
pub use dispatcher::HookDispatcher;

use async_trait::async_trait;
use station_core::{ExecutionContext, Measurement, Phase, RunResult, SequenceOutput, StepResult};

use crate::error::SequenceError;

/// Hook outcome. An error is logged and never affects the run.
pub type HookResult = anyhow::Result<()>;

/// Observer of a sequence run.
///
/// Every method defaults to a no-op, so implementors override only the
/// events they care about.
#[async_trait]
pub trait LifecycleHook: Send + Sync {
    /// Identity used when reporting a failure of this hook.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn on_setup_start(&self, _context: &ExecutionContext) -> HookResult {
        Ok(())
    }

    async fn on_setup_complete(
        &self,
        _context: &ExecutionContext,
        _error: Option<&SequenceError>,
    ) -> HookResult {
        Ok(())
    }

    async fn on_run_start(&self, _context: &ExecutionContext) -> HookResult {
        Ok(())
    }

    /// `output` is absent when the run operation failed.
    async fn on_run_complete(
        &self,
        _context: &ExecutionContext,
        _output: Option<&SequenceOutput>,
        _error: Option<&SequenceError>,
    ) -> HookResult {
        Ok(())
    }

    async fn on_step_start(
        &self,
        _context: &ExecutionContext,
        _name: &str,
        _index: u32,
        _total: u32,
    ) -> HookResult {
        Ok(())
    }

    async fn on_step_complete(&self, _context: &ExecutionContext, _step: &StepResult) -> HookResult {
        Ok(())
    }

    async fn on_measurement(
        &self,
        _context: &ExecutionContext,
        _measurement: &Measurement,
    ) -> HookResult {
        Ok(())
    }

    async fn on_teardown_start(&self, _context: &ExecutionContext) -> HookResult {
        Ok(())
    }

    async fn on_teardown_complete(
        &self,
        _context: &ExecutionContext,
        _error: Option<&SequenceError>,
    ) -> HookResult {
        Ok(())
    }

    async fn on_error(
        &self,
        _context: &ExecutionContext,
        _error: &SequenceError,
        _phase: Phase,
    ) -> HookResult {
        Ok(())
    }

    async fn on_sequence_complete(
        &self,
        _context: &ExecutionContext,
        _result: &RunResult,
    ) -> HookResult {
        Ok(())
    }
}

/// A dispatch point together with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum HookEvent {
    SetupStart,
    SetupComplete {
        error: Option<SequenceError>,
    },
    RunStart,
    RunComplete {
        output: Option<SequenceOutput>,
        error: Option<SequenceError>,
    },
    StepStart {
        name: String,
        index: u32,
        total: u32,
    },
    StepComplete(StepResult),
    Measurement(Measurement),
    TeardownStart,
    TeardownComplete {
        error: Option<SequenceError>,
    },
    Error {
        error: SequenceError,
        phase: Phase,
    },
    SequenceComplete(Box<RunResult>),
}

impl HookEvent {
    /// Name of the hook method this event invokes.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetupStart => "on_setup_start",
            Self::SetupComplete { .. } => "on_setup_complete",
            Self::RunStart => "on_run_start",
            Self::RunComplete { .. } => "on_run_complete",
            Self::StepStart { .. } => "on_step_start",
            Self::StepComplete(_) => "on_step_complete",
            Self::Measurement(_) => "on_measurement",
            Self::TeardownStart => "on_teardown_start",
            Self::TeardownComplete { .. } => "on_teardown_complete",
            Self::Error { .. } => "on_error",
            Self::SequenceComplete(_) => "on_sequence_complete",
        }
    }

    /// Calls the matching method of `hook`.
    pub(crate) async fn invoke(
        &self,
        hook: &dyn LifecycleHook,
        context: &ExecutionContext,
    ) -> HookResult {
        match self {
            Self::SetupStart => hook.on_setup_start(context).await,
            Self::SetupComplete { error } => hook.on_setup_complete(context, error.as_ref()).await,
            Self::RunStart => hook.on_run_start(context).await,
            Self::RunComplete { output, error } => {
                hook.on_run_complete(context, output.as_ref(), error.as_ref())
                    .await
            }
            Self::StepStart { name, index, total } => {
                hook.on_step_start(context, name, *index, *total).await
            }
            Self::StepComplete(step) => hook.on_step_complete(context, step).await,
            Self::Measurement(measurement) => hook.on_measurement(context, measurement).await,
            Self::TeardownStart => hook.on_teardown_start(context).await,
            Self::TeardownComplete { error } => {
                hook.on_teardown_complete(context, error.as_ref()).await
            }
            Self::Error { error, phase } => hook.on_error(context, error, *phase).await,
            Self::SequenceComplete(result) => hook.on_sequence_complete(context, result).await,
        }
    }
}
