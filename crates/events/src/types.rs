//! Event types for the station output protocol

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use station_core::{MeasurementValue, StepResult, ValueMap};

use crate::error::{EventsError, Result};

/// Envelope wrapping every emitted event with run metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Run this event belongs to
    pub execution_id: String,
    /// Position in the run's event stream, starting at 0
    pub sequence: u64,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event, serialized as `type` + `data`
    #[serde(flatten)]
    pub event: Event,
}

impl EventEnvelope {
    /// Create a new envelope stamped with the current time
    pub fn new(execution_id: impl Into<String>, sequence: u64, event: Event) -> Self {
        Self {
            execution_id: execution_id.into(),
            sequence,
            timestamp: Utc::now(),
            event,
        }
    }

    /// Serialize as a single JSON line (no trailing newline)
    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Severity of a protocol log event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Kind of answer an input request expects
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    #[default]
    Text,
    Number,
    Select,
    Confirm,
}

/// All events a sequence run can emit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    /// Lifecycle phase and overall progress
    Status {
        phase: String,
        /// 0-100
        progress: f64,
        current_step: Option<String>,
        message: Option<String>,
    },

    /// Log line addressed to the operator
    Log {
        level: LogLevel,
        message: String,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        #[cfg_attr(feature = "typescript", ts(type = "Record<string, unknown>"))]
        extra: Map<String, Value>,
    },

    StepStart {
        name: String,
        /// 1-based
        index: u32,
        total: u32,
        description: String,
    },

    StepComplete {
        name: String,
        index: u32,
        passed: bool,
        /// Seconds
        duration: f64,
        measurements: Option<ValueMap>,
        error: Option<String>,
        data: Option<ValueMap>,
    },

    Measurement {
        name: String,
        value: MeasurementValue,
        unit: String,
        passed: Option<bool>,
        min: Option<f64>,
        max: Option<f64>,
        step_name: Option<String>,
    },

    Error {
        code: String,
        message: String,
        step: Option<String>,
        recoverable: bool,
    },

    /// Operator input needed; the step blocks until answered or timed out
    InputRequest {
        request_id: String,
        prompt: String,
        input_type: InputType,
        options: Option<Vec<String>>,
        default: Option<Value>,
        /// Seconds
        timeout: f64,
    },

    SequenceComplete {
        overall_pass: bool,
        /// Seconds
        duration: f64,
        steps: Vec<StepResult>,
        measurements: ValueMap,
        error: Option<String>,
    },
}

impl Event {
    /// Wire name of this event kind
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Status { .. } => "status",
            Event::Log { .. } => "log",
            Event::StepStart { .. } => "step_start",
            Event::StepComplete { .. } => "step_complete",
            Event::Measurement { .. } => "measurement",
            Event::Error { .. } => "error",
            Event::InputRequest { .. } => "input_request",
            Event::SequenceComplete { .. } => "sequence_complete",
        }
    }

    /// Step name carried by the event, if any
    pub fn step_name(&self) -> Option<&str> {
        match self {
            Event::Status { current_step, .. } => current_step.as_deref(),
            Event::StepStart { name, .. } => Some(name),
            Event::StepComplete { name, .. } => Some(name),
            Event::Measurement { step_name, .. } => step_name.as_deref(),
            Event::Error { step, .. } => step.as_deref(),
            Event::Log { .. } | Event::InputRequest { .. } | Event::SequenceComplete { .. } => None,
        }
    }
}

/// Action carried by a control command
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandAction {
    Stop,
    Abort,
}

/// Messages exchanged with the orchestrator outside the event stream.
///
/// Inbound on the control channel: input responses and stop/abort commands.
/// Outbound from the `--stop` and `--status` CLI actions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    InputResponse {
        request_id: String,
        #[serde(default)]
        value: Value,
    },
    Command {
        action: CommandAction,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        execution_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    StatusRequest {
        sequence_name: String,
        #[serde(default)]
        execution_id: Option<String>,
    },
}

impl ControlMessage {
    /// Parse one line of the control channel
    pub fn parse_line(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Err(EventsError::InvalidControl("empty line".to_string()));
        }
        Ok(serde_json::from_str(line)?)
    }
}
