use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keyed JSON values with a stable serialization order.
pub type ValueMap = BTreeMap<String, Value>;

/// Outcome of a single completed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct StepResult {
    pub name: String,
    /// 1-based position within the sequence
    pub index: u32,
    pub passed: bool,
    /// Seconds
    pub duration: f64,
    #[serde(default)]
    pub measurements: ValueMap,
    #[serde(default)]
    pub data: ValueMap,
    #[serde(default)]
    pub error: Option<String>,
}

impl StepResult {
    pub fn new(name: impl Into<String>, index: u32, passed: bool, duration: f64) -> Self {
        Self {
            name: name.into(),
            index,
            passed,
            duration,
            measurements: ValueMap::new(),
            data: ValueMap::new(),
            error: None,
        }
    }

    pub fn failed(name: impl Into<String>, index: u32, duration: f64, error: impl Into<String>) -> Self {
        Self::new(name, index, false, duration).with_error(error)
    }

    pub fn with_measurement(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.measurements.insert(name.into(), value.into());
        self
    }

    pub fn with_measurements(mut self, measurements: ValueMap) -> Self {
        self.measurements.extend(measurements);
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Partial result returned by a sequence's run operation.
///
/// Measurements listed here take precedence over auto-recorded ones with the
/// same name when the engine assembles the [`RunResult`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceOutput {
    pub passed: bool,
    #[serde(default)]
    pub measurements: ValueMap,
    #[serde(default)]
    pub data: ValueMap,
}

impl SequenceOutput {
    pub fn passed() -> Self {
        Self {
            passed: true,
            ..Default::default()
        }
    }

    pub fn failed() -> Self {
        Self::default()
    }

    pub fn from_verdict(passed: bool) -> Self {
        Self {
            passed,
            ..Default::default()
        }
    }

    pub fn with_measurement(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.measurements.insert(name.into(), value.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// Terminal record of one engine execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct RunResult {
    pub passed: bool,
    pub measurements: ValueMap,
    pub steps: Vec<StepResult>,
    pub data: ValueMap,
    pub error: Option<String>,
    /// Seconds
    pub duration: f64,
}

impl RunResult {
    pub fn exit_status(&self) -> ExitStatus {
        ExitStatus::from_passed(self.passed)
    }
}

/// Process exit status of a sequence invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Pass,
    Fail,
    /// Argument, configuration or engine-level failure, or interruption
    Error,
}

impl ExitStatus {
    pub fn from_passed(passed: bool) -> Self {
        if passed {
            Self::Pass
        } else {
            Self::Fail
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Pass => 0,
            Self::Fail => 1,
            Self::Error => 2,
        }
    }
}

impl From<ExitStatus> for std::process::ExitCode {
    fn from(status: ExitStatus) -> Self {
        std::process::ExitCode::from(status.code() as u8)
    }
}
