//! Ordered event emitter with sequence guarantees.
//!
//! Every event of a run passes through one [`OutputEmitter`]. It stamps the
//! envelope with the run's execution id and the next sequence number, then
//! publishes it to the in-process bus and writes it to each attached sink
//! while still holding the counter, so sinks observe the same order as the
//! numbering.

use std::sync::{Arc, Mutex, PoisonError};

use events::{Event, EventBus, EventEnvelope, EventSink, InputType, LogLevel};
use serde_json::{Map, Value};
use station_core::{EnginePhase, Measurement, RunResult, StepResult};
use tracing::warn;

#[derive(Clone)]
pub struct OutputEmitter {
    execution_id: Arc<str>,
    bus: EventBus,
    sinks: Arc<Vec<Arc<dyn EventSink>>>,
    sequence: Arc<Mutex<u64>>,
}

impl OutputEmitter {
    pub fn new(execution_id: impl Into<String>, bus: EventBus) -> Self {
        Self {
            execution_id: Arc::from(execution_id.into()),
            bus,
            sinks: Arc::new(Vec::new()),
            sequence: Arc::new(Mutex::new(0)),
        }
    }

    /// Adds an output channel. Must be called before the emitter is cloned.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        let mut sinks: Vec<_> = self.sinks.iter().cloned().collect();
        sinks.push(sink);
        self.sinks = Arc::new(sinks);
        self
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Emit an event with the next sequence number.
    ///
    /// A failing sink is logged and skipped; emission itself never fails.
    pub fn emit(&self, event: Event) -> EventEnvelope {
        let mut sequence = self.sequence.lock().unwrap_or_else(PoisonError::into_inner);
        let envelope = EventEnvelope::new(self.execution_id.as_ref(), *sequence, event);
        *sequence += 1;

        for sink in self.sinks.iter() {
            if let Err(e) = sink.write(&envelope) {
                warn!(
                    execution_id = %self.execution_id,
                    event = envelope.event.kind(),
                    error = %e,
                    "Failed to write event to sink"
                );
            }
        }
        self.bus.publish(envelope.clone());
        envelope
    }

    pub fn status(
        &self,
        phase: EnginePhase,
        progress: f64,
        current_step: Option<&str>,
        message: Option<&str>,
    ) {
        self.emit(Event::Status {
            phase: phase.as_str().to_string(),
            progress: progress.clamp(0.0, 100.0),
            current_step: current_step.map(str::to_string),
            message: message.map(str::to_string),
        });
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>, extra: Map<String, Value>) {
        self.emit(Event::Log {
            level,
            message: message.into(),
            extra,
        });
    }

    pub fn step_start(&self, name: &str, index: u32, total: u32, description: &str) {
        self.emit(Event::StepStart {
            name: name.to_string(),
            index,
            total,
            description: description.to_string(),
        });
    }

    /// Empty measurement and data maps are sent as absent.
    pub fn step_complete(&self, step: &StepResult) {
        self.emit(Event::StepComplete {
            name: step.name.clone(),
            index: step.index,
            passed: step.passed,
            duration: step.duration,
            measurements: (!step.measurements.is_empty()).then(|| step.measurements.clone()),
            error: step.error.clone(),
            data: (!step.data.is_empty()).then(|| step.data.clone()),
        });
    }

    pub fn measurement(&self, measurement: &Measurement) {
        let limits = measurement.limits();
        self.emit(Event::Measurement {
            name: measurement.name().to_string(),
            value: measurement.value().clone(),
            unit: measurement.unit().to_string(),
            passed: measurement.passed(),
            min: limits.min,
            max: limits.max,
            step_name: measurement.step_name().map(str::to_string),
        });
    }

    pub fn error(&self, code: &str, message: impl Into<String>, step: Option<&str>, recoverable: bool) {
        self.emit(Event::Error {
            code: code.to_string(),
            message: message.into(),
            step: step.map(str::to_string),
            recoverable,
        });
    }

    pub fn input_request(
        &self,
        request_id: &str,
        prompt: &str,
        input_type: InputType,
        options: Option<Vec<String>>,
        default: Option<Value>,
        timeout_secs: f64,
    ) {
        self.emit(Event::InputRequest {
            request_id: request_id.to_string(),
            prompt: prompt.to_string(),
            input_type,
            options,
            default,
            timeout: timeout_secs,
        });
    }

    pub fn sequence_complete(&self, result: &RunResult) {
        self.emit(Event::SequenceComplete {
            overall_pass: result.passed,
            duration: result.duration,
            steps: result.steps.clone(),
            measurements: result.measurements.clone(),
            error: result.error.clone(),
        });
    }

    /// Number of events emitted so far.
    pub fn current_sequence(&self) -> u64 {
        *self.sequence.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}

impl std::fmt::Debug for OutputEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputEmitter")
            .field("execution_id", &self.execution_id)
            .field("sinks", &self.sinks.len())
            .field("sequence", &self.current_sequence())
            .finish()
    }
}
