//! The handle a sequence uses to talk to the engine during a phase.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use events::{InputType, LogLevel};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use station_core::{
    EnginePhase, ExecutionContext, Measurement, MeasurementBuilder, StepResult, ValueMap,
};
use tracing::{debug, warn};

use super::events::OutputEmitter;
use crate::abort::{AbortHandle, DEFAULT_ABORT_REASON};
use crate::config::EngineConfig;
use crate::error::{Result, SequenceError};
use crate::hooks::{BackgroundHooks, HookDispatcher, HookEvent};
use crate::input::{is_affirmative, InputBroker, InputRequest};
use crate::runner::StepTimer;

#[derive(Debug, Clone)]
enum Recorded {
    Measurement(Measurement),
    /// Value merged from a completed step's measurement map
    Raw(Value),
}

/// Measurement table and step log of one run.
#[derive(Debug, Default)]
pub struct RunRecorder {
    measurements: Mutex<BTreeMap<String, Recorded>>,
    steps: Mutex<Vec<StepResult>>,
    current_step: Mutex<Option<String>>,
}

impl RunRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-recording a name replaces the table entry.
    pub fn record_measurement(&self, measurement: Measurement) {
        lock(&self.measurements).insert(
            measurement.name().to_string(),
            Recorded::Measurement(measurement),
        );
    }

    pub fn merge_raw(&self, measurements: &ValueMap) {
        let mut table = lock(&self.measurements);
        for (name, value) in measurements {
            table.insert(name.clone(), Recorded::Raw(value.clone()));
        }
    }

    pub fn push_step(&self, step: StepResult) {
        lock(&self.steps).push(step);
    }

    pub fn set_current_step(&self, name: Option<&str>) {
        *lock(&self.current_step) = name.map(str::to_string);
    }

    pub fn current_step(&self) -> Option<String> {
        lock(&self.current_step).clone()
    }

    pub fn measurement(&self, name: &str) -> Option<Measurement> {
        match lock(&self.measurements).get(name) {
            Some(Recorded::Measurement(m)) => Some(m.clone()),
            _ => None,
        }
    }

    /// The table in storage form; raw values are passed through as-is.
    pub fn measurements(&self) -> ValueMap {
        lock(&self.measurements)
            .iter()
            .map(|(name, recorded)| {
                let value = match recorded {
                    Recorded::Measurement(m) => m.to_storage().to_value(),
                    Recorded::Raw(v) => v.clone(),
                };
                (name.clone(), value)
            })
            .collect()
    }

    pub fn steps(&self) -> Vec<StepResult> {
        lock(&self.steps).clone()
    }

    pub fn step_count(&self) -> usize {
        lock(&self.steps).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Collaborators shared by the engine and every handle it hands out.
#[derive(Debug)]
pub struct RunState {
    pub recorder: RunRecorder,
    pub emitter: OutputEmitter,
    pub hooks: HookDispatcher,
    pub background: BackgroundHooks,
    pub abort: AbortHandle,
    pub inputs: InputBroker,
    pub config: EngineConfig,
}

/// Passed to each phase of a [`Sequence`](crate::Sequence).
///
/// Everything a sequence emits goes through this handle, so the engine can
/// keep the measurement table, the step log and the event stream consistent.
#[derive(Clone, Copy)]
pub struct RunHandle<'a> {
    context: &'a Arc<ExecutionContext>,
    state: &'a RunState,
}

impl<'a> RunHandle<'a> {
    pub(crate) fn new(context: &'a Arc<ExecutionContext>, state: &'a RunState) -> Self {
        Self { context, state }
    }

    pub fn context(&self) -> &ExecutionContext {
        self.context
    }

    pub fn execution_id(&self) -> &str {
        &self.context.execution_id
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.context.parameter(name)
    }

    /// Typed parameter; `None` when absent or of the wrong shape.
    pub fn parameter_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let value = self.context.parameter(name)?;
        match serde_json::from_value(value.clone()) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(parameter = name, error = %e, "Parameter has unexpected type");
                None
            }
        }
    }

    /// Settings of one device; empty when it is not configured.
    pub fn hardware_config(&self, device: &str) -> std::collections::HashMap<String, Value> {
        self.context.hardware(device)
    }

    pub fn is_dry_run(&self) -> bool {
        self.context.dry_run
    }

    pub fn emit_log(&self, level: LogLevel, message: impl Into<String>) {
        self.state.emitter.log(level, message, Map::new());
    }

    pub fn emit_log_with(&self, level: LogLevel, message: impl Into<String>, extra: Map<String, Value>) {
        self.state.emitter.log(level, message, extra);
    }

    /// Marks `name` as the current step and reports progress `(index-1)/total`.
    pub fn emit_step_start(&self, name: &str, index: u32, total: u32, description: &str) {
        self.state.recorder.set_current_step(Some(name));

        let progress = if total > 0 {
            f64::from(index.saturating_sub(1)) / f64::from(total) * 100.0
        } else {
            0.0
        };
        let message = format!("Step {}/{}", index, total);
        self.state
            .emitter
            .status(EnginePhase::Running, progress, Some(name), Some(&message));
        self.state.emitter.step_start(name, index, total, description);

        self.spawn_hook(HookEvent::StepStart {
            name: name.to_string(),
            index,
            total,
        });
    }

    /// Appends `step` to the step log and merges its measurements into the table.
    pub fn emit_step_complete(&self, step: StepResult) {
        self.state.recorder.merge_raw(&step.measurements);
        self.state.emitter.step_complete(&step);
        self.state.recorder.push_step(step.clone());
        self.spawn_hook(HookEvent::StepComplete(step));
    }

    /// Builds, records and emits a measurement.
    ///
    /// The measurement is attributed to the current step unless the builder
    /// names one. Returns it so the caller can act on the verdict.
    pub fn emit_measurement(&self, builder: MeasurementBuilder) -> Measurement {
        let current = self.state.recorder.current_step();
        let measurement = builder.default_step(current.as_deref()).build();

        self.state.recorder.record_measurement(measurement.clone());
        self.state.emitter.measurement(&measurement);
        self.spawn_hook(HookEvent::Measurement(measurement.clone()));
        measurement
    }

    pub fn emit_error(&self, code: &str, message: impl Into<String>, recoverable: bool) {
        let current = self.state.recorder.current_step();
        self.state
            .emitter
            .error(code, message, current.as_deref(), recoverable);
    }

    /// Runs `body` as a step: start event, timed body, complete event.
    ///
    /// A failing body is recorded as a failed step and its error returned.
    /// On success the step's verdict is the body's boolean.
    pub async fn run_step<F>(&self, name: &str, index: u32, total: u32, body: F) -> Result<bool>
    where
        F: Future<Output = Result<bool>>,
    {
        self.emit_step_start(name, index, total, "");
        let mut timer = StepTimer::start();
        let outcome = body.await;
        let duration = timer.stop().as_secs_f64();

        match outcome {
            Ok(passed) => {
                self.emit_step_complete(StepResult::new(name, index, passed, duration));
                Ok(passed)
            }
            Err(e) => {
                self.emit_step_complete(StepResult::failed(name, index, duration, e.to_string()));
                Err(e)
            }
        }
    }

    /// Raises the run's abort flag and returns the error to propagate.
    pub fn abort(&self, reason: &str) -> SequenceError {
        let reason = if reason.is_empty() {
            DEFAULT_ABORT_REASON
        } else {
            reason
        };
        self.state.abort.abort(reason);
        SequenceError::aborted(reason)
    }

    pub fn check_abort(&self) -> Result<()> {
        self.state.abort.check()
    }

    pub fn is_aborted(&self) -> bool {
        self.state.abort.is_aborted()
    }

    /// Asks the operator for a value.
    ///
    /// Without an answer before the timeout this yields the request's default,
    /// or a [`SequenceError::Timeout`] when it has none.
    pub async fn request_input(&self, request: InputRequest) -> Result<Value> {
        let timeout = request.timeout.unwrap_or_else(|| self.state.config.input_timeout());
        let prefix = match request.input_type {
            InputType::Confirm => "confirm",
            _ => "input",
        };
        let request_id = self.state.inputs.next_request_id(prefix);
        let rx = self.state.inputs.register(request_id.clone());

        self.state.emitter.input_request(
            &request_id,
            &request.prompt,
            request.input_type,
            request.options.clone(),
            request.default.clone(),
            timeout.as_secs_f64(),
        );

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => {
                debug!(request_id = %request_id, "Input received");
                Ok(value)
            }
            Ok(Err(_)) | Err(_) => {
                self.state.inputs.cancel(&request_id);
                warn!(request_id = %request_id, "Input request timed out");
                request.default.ok_or_else(|| SequenceError::timeout(timeout))
            }
        }
    }

    /// Asks the operator to confirm. A timeout counts as a refusal.
    pub async fn request_confirmation(&self, prompt: &str) -> bool {
        match self.request_input(InputRequest::confirm(prompt)).await {
            Ok(value) => is_affirmative(&value),
            Err(_) => false,
        }
    }

    fn spawn_hook(&self, event: HookEvent) {
        self.state
            .background
            .spawn(&self.state.hooks, Arc::clone(self.context), event);
    }
}

impl std::fmt::Debug for RunHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle")
            .field("execution_id", &self.context.execution_id)
            .field("current_step", &self.state.recorder.current_step())
            .finish()
    }
}
