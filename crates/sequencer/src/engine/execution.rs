//! Execution engine driving one sequence run.
//!
//! The engine owns the sequence, its context and every per-run collaborator.
//! [`ExecutionEngine::execute`] walks setup, run and teardown in order and
//! always returns a [`RunResult`], whatever the sequence does.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use events::{EventBus, EventEnvelope, EventSink, LogLevel};
use futures::FutureExt;
use serde_json::{Map, Value};
use station_core::{EnginePhase, ExecutionContext, Phase, RunResult};
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::events::OutputEmitter;
use super::handle::{RunHandle, RunRecorder, RunState};
use crate::abort::AbortHandle;
use crate::config::EngineConfig;
use crate::error::{panic_message, Result, SequenceError};
use crate::hooks::{BackgroundHooks, HookDispatcher, HookEvent, LifecycleHook};
use crate::input::InputBroker;
use crate::sequence::Sequence;
use crate::state_machine::PhaseStateMachine;

/// Assembles an [`ExecutionEngine`].
pub struct EngineBuilder {
    sequence: Box<dyn Sequence>,
    context: ExecutionContext,
    bus: EventBus,
    sinks: Vec<Arc<dyn EventSink>>,
    hooks: Vec<Arc<dyn LifecycleHook>>,
    config: EngineConfig,
    abort: AbortHandle,
    inputs: InputBroker,
}

impl EngineBuilder {
    pub fn new(sequence: Box<dyn Sequence>, context: ExecutionContext) -> Self {
        Self {
            sequence,
            context,
            bus: EventBus::new(),
            sinks: Vec::new(),
            hooks: Vec::new(),
            config: EngineConfig::default(),
            abort: AbortHandle::new(),
            inputs: InputBroker::new(),
        }
    }

    pub fn bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    /// Adds an output channel, e.g. a [`JsonLinesSink`](events::JsonLinesSink) on stdout.
    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Registers a hook; hooks run in registration order.
    pub fn hook(mut self, hook: Arc<dyn LifecycleHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn hooks(mut self, hooks: impl IntoIterator<Item = Arc<dyn LifecycleHook>>) -> Self {
        self.hooks.extend(hooks);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares an abort flag created by the caller.
    pub fn abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn input_broker(mut self, inputs: InputBroker) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn build(self) -> ExecutionEngine {
        // The sequence's own identity wins over whatever the config carried
        let mut context = self.context;
        context.sequence_name = self.sequence.name().to_string();
        context.sequence_version = self.sequence.version().to_string();

        let emitter = self
            .sinks
            .into_iter()
            .fold(OutputEmitter::new(context.execution_id.clone(), self.bus), |emitter, sink| {
                emitter.with_sink(sink)
            });
        let hooks = HookDispatcher::new(self.hooks, emitter.clone());

        ExecutionEngine {
            sequence: self.sequence,
            context: Arc::new(context),
            state: RunState {
                recorder: RunRecorder::new(),
                emitter,
                hooks,
                background: BackgroundHooks::new(),
                abort: self.abort,
                inputs: self.inputs,
                config: self.config,
            },
            phase: EnginePhase::Created,
        }
    }
}

/// Single-use driver of one sequence run.
pub struct ExecutionEngine {
    sequence: Box<dyn Sequence>,
    context: Arc<ExecutionContext>,
    state: RunState,
    phase: EnginePhase,
}

impl ExecutionEngine {
    pub fn builder(sequence: Box<dyn Sequence>, context: ExecutionContext) -> EngineBuilder {
        EngineBuilder::new(sequence, context)
    }

    pub fn new(sequence: Box<dyn Sequence>, context: ExecutionContext) -> Self {
        EngineBuilder::new(sequence, context).build()
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.state.abort.clone()
    }

    pub fn input_broker(&self) -> InputBroker {
        self.state.inputs.clone()
    }

    pub fn emitter(&self) -> &OutputEmitter {
        &self.state.emitter
    }

    /// Receives every event of the run from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.state.emitter.bus().subscribe()
    }

    /// Runs setup, run and teardown, then reports the result.
    ///
    /// Sequence failures, panics included, are captured into the result;
    /// this never fails.
    pub async fn execute(self) -> RunResult {
        let span = info_span!(
            "execute",
            execution_id = %self.context.execution_id,
            sequence = %self.context.sequence_name,
        );
        self.run_lifecycle().instrument(span).await
    }

    async fn run_lifecycle(mut self) -> RunResult {
        Arc::make_mut(&mut self.context).start();
        info!(
            version = %self.context.sequence_version,
            dry_run = self.context.dry_run,
            "Sequence started"
        );

        let mut result = RunResult::default();
        let mut failure: Option<SequenceError> = None;

        // Setup
        self.transition(EnginePhase::Setup);
        self.state
            .emitter
            .status(EnginePhase::Setup, 0.0, None, Some("Initializing..."));
        self.dispatch(HookEvent::SetupStart).await;

        let handle = RunHandle::new(&self.context, &self.state);
        match guarded(Phase::Setup, self.sequence.setup(&handle)).await {
            Ok(()) => {
                self.dispatch(HookEvent::SetupComplete { error: None }).await;
            }
            Err(e) => {
                self.phase_failed(Phase::Setup, &e).await;
                failure = Some(e);
            }
        }

        // Run
        if failure.is_none() {
            if let Err(e) = self.state.abort.check() {
                info!("Abort raised during setup, skipping run");
                failure = Some(e);
            }
        }

        if failure.is_none() {
            self.transition(EnginePhase::Running);
            self.state
                .emitter
                .status(EnginePhase::Running, 0.0, None, Some("Executing sequence..."));
            self.dispatch(HookEvent::RunStart).await;

            let handle = RunHandle::new(&self.context, &self.state);
            match guarded(Phase::Run, self.sequence.run(&handle)).await {
                Ok(output) => {
                    result.passed = output.passed;
                    let mut measurements = self.state.recorder.measurements();
                    measurements.extend(output.measurements.clone());
                    result.measurements = measurements;
                    result.data = output.data.clone();

                    self.dispatch(HookEvent::RunComplete {
                        output: Some(output),
                        error: None,
                    })
                    .await;
                }
                Err(e) => {
                    self.phase_failed(Phase::Run, &e).await;
                    failure = Some(e);
                }
            }
        }

        if let Some(e) = &failure {
            result.error = Some(e.summary());
            self.state.emitter.error(e.code(), e.to_string(), e.step_name(), false);
        }

        // Teardown
        self.transition(EnginePhase::Teardown);
        self.state
            .emitter
            .status(EnginePhase::Teardown, 95.0, None, Some("Cleaning up..."));
        self.dispatch(HookEvent::TeardownStart).await;

        let handle = RunHandle::new(&self.context, &self.state);
        match guarded(Phase::Teardown, self.sequence.teardown(&handle)).await {
            Ok(()) => {
                self.dispatch(HookEvent::TeardownComplete { error: None }).await;
            }
            Err(e) => {
                self.phase_failed(Phase::Teardown, &e).await;
                self.state
                    .emitter
                    .error("TEARDOWN_ERROR", e.to_string(), None, false);
                if result.error.is_none() {
                    result.error = Some(format!("Teardown failed: {}", e));
                }
            }
        }

        // Complete
        Arc::make_mut(&mut self.context).complete();
        result.steps = self.state.recorder.steps();
        result.duration = self.context.duration_seconds().unwrap_or_default();

        let drain_timeout = self.state.config.hook_drain_timeout();
        let report = self.state.background.drain(drain_timeout).await;
        if report.abandoned > 0 {
            let mut extra = Map::new();
            extra.insert("abandoned".to_string(), Value::from(report.abandoned));
            self.state.emitter.log(
                LogLevel::Warning,
                format!(
                    "{} background hook(s) still running after {}ms were abandoned",
                    report.abandoned,
                    drain_timeout.as_millis()
                ),
                extra,
            );
        }

        self.dispatch(HookEvent::SequenceComplete(Box::new(result.clone())))
            .await;
        self.transition(EnginePhase::Completed);
        self.state.emitter.sequence_complete(&result);

        info!(
            passed = result.passed,
            duration = result.duration,
            steps = result.steps.len(),
            error = result.error.as_deref().unwrap_or(""),
            "Sequence completed"
        );
        result
    }

    /// Hooks for a failed phase: `*_complete` with the error, then `on_error`.
    async fn phase_failed(&self, phase: Phase, error: &SequenceError) {
        if self.context.debug_enabled() {
            error!(phase = phase.as_str(), error = ?error, "Phase failed");
        } else {
            error!(phase = phase.as_str(), error = %error, "Phase failed");
        }

        let complete = match phase {
            Phase::Setup => HookEvent::SetupComplete {
                error: Some(error.clone()),
            },
            Phase::Run => HookEvent::RunComplete {
                output: None,
                error: Some(error.clone()),
            },
            Phase::Teardown => HookEvent::TeardownComplete {
                error: Some(error.clone()),
            },
        };
        self.dispatch(complete).await;
        self.dispatch(HookEvent::Error {
            error: error.clone(),
            phase,
        })
        .await;
    }

    async fn dispatch(&self, event: HookEvent) {
        self.state.hooks.dispatch(&self.context, &event).await;
    }

    fn transition(&mut self, to: EnginePhase) {
        if let Err(e) = PhaseStateMachine::validate_transition(&self.phase, &to) {
            warn!(error = %e, "Unexpected phase transition");
        }
        debug!(from = self.phase.as_str(), to = to.as_str(), "Phase transition");
        self.phase = to;
    }
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("sequence", &self.sequence.name())
            .field("execution_id", &self.context.execution_id)
            .field("phase", &self.phase)
            .finish()
    }
}

/// Awaits a phase body, turning a panic into [`SequenceError::Unexpected`].
async fn guarded<T, F>(phase: Phase, body: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(body).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(phase = phase.as_str(), panic = %message, "Sequence panicked");
            Err(SequenceError::unexpected(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use events::Event;
    use station_core::SequenceOutput;

    struct Noop;

    #[async_trait]
    impl Sequence for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn version(&self) -> &str {
            "2.1.0"
        }

        async fn setup(&mut self, _run: &RunHandle<'_>) -> Result<()> {
            Ok(())
        }

        async fn run(&mut self, _run: &RunHandle<'_>) -> Result<SequenceOutput> {
            Ok(SequenceOutput::passed())
        }

        async fn teardown(&mut self, _run: &RunHandle<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_builder_stamps_sequence_identity() {
        let engine = ExecutionEngine::new(Box::new(Noop), ExecutionContext::default());
        assert_eq!(engine.context().sequence_name, "noop");
        assert_eq!(engine.context().sequence_version, "2.1.0");

        let configured = ExecutionEngine::new(Box::new(Noop), ExecutionContext::new("custom", "9"));
        assert_eq!(configured.context().sequence_name, "noop");
        assert_eq!(configured.context().sequence_version, "2.1.0");
    }

    #[test]
    fn test_execute_future_is_send() {
        let engine = ExecutionEngine::new(Box::new(Noop), ExecutionContext::default());
        let run = engine.execute();
        assert_send(&run);
    }

    #[tokio::test]
    async fn test_execute_on_spawned_task() {
        let engine = ExecutionEngine::new(Box::new(Noop), ExecutionContext::default());
        let result = tokio::spawn(engine.execute()).await.unwrap();
        assert!(result.passed);
    }

    #[tokio::test]
    async fn test_event_order_of_clean_run() {
        let engine = ExecutionEngine::new(Box::new(Noop), ExecutionContext::default());
        let execution_id = engine.context().execution_id.clone();
        let mut rx = engine.subscribe();

        let result = engine.execute().await;
        assert!(result.passed);
        assert!(result.error.is_none());
        assert!(result.duration >= 0.0);

        let mut kinds = Vec::new();
        let mut sequence_numbers = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            assert_eq!(envelope.execution_id, execution_id);
            sequence_numbers.push(envelope.sequence);
            kinds.push(match &envelope.event {
                Event::Status { phase, .. } => format!("status:{}", phase),
                other => other.kind().to_string(),
            });
        }

        assert_eq!(
            kinds,
            vec![
                "status:setup",
                "status:running",
                "status:teardown",
                "sequence_complete"
            ]
        );
        assert_eq!(sequence_numbers, vec![0, 1, 2, 3]);
    }

    struct Panics;

    #[async_trait]
    impl Sequence for Panics {
        fn name(&self) -> &str {
            "panics"
        }

        async fn setup(&mut self, _run: &RunHandle<'_>) -> Result<()> {
            Ok(())
        }

        async fn run(&mut self, _run: &RunHandle<'_>) -> Result<SequenceOutput> {
            let readings: Vec<f64> = Vec::new();
            if readings.is_empty() {
                panic!("no readings captured");
            }
            Ok(SequenceOutput::passed())
        }

        async fn teardown(&mut self, _run: &RunHandle<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_panic_in_run_is_unexpected_error() {
        let engine = ExecutionEngine::new(Box::new(Panics), ExecutionContext::default());
        let result = engine.execute().await;

        assert!(!result.passed);
        assert_eq!(
            result.error.as_deref(),
            Some("Unexpected error: no readings captured")
        );
    }

    #[tokio::test]
    async fn test_abort_before_run_skips_run() {
        let engine = ExecutionEngine::new(Box::new(Noop), ExecutionContext::default());
        engine.abort_handle().abort("operator stop");

        let result = engine.execute().await;
        assert!(!result.passed);
        assert_eq!(result.error.as_deref(), Some("Aborted: operator stop"));
    }
}
