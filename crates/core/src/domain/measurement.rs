//! Measurement records with limit-based pass/fail evaluation.
//!
//! A [`Measurement`] is built once through [`MeasurementBuilder`]; when no
//! explicit verdict is supplied and the value is numeric, `passed` is derived
//! from whichever limits are present. The record is never re-evaluated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};

/// Measured value: numeric, textual or boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(untagged)]
pub enum MeasurementValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MeasurementValue {
    /// Numeric view of the value; `None` for text and booleans.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Bool(_) | Self::Text(_) => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.as_f64().is_some()
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Bool(v) => Value::Bool(*v),
            Self::Integer(v) => Value::from(*v),
            Self::Float(v) => Value::from(*v),
            Self::Text(v) => Value::String(v.clone()),
        }
    }

    /// Scalar JSON values only; arrays, objects and null are rejected.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(Self::Bool(*v)),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float)),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

impl From<f64> for MeasurementValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<f32> for MeasurementValue {
    fn from(v: f32) -> Self {
        Self::Float(v as f64)
    }
}

impl From<i64> for MeasurementValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for MeasurementValue {
    fn from(v: i32) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<u32> for MeasurementValue {
    fn from(v: u32) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<bool> for MeasurementValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for MeasurementValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for MeasurementValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Optional lower and upper acceptance limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Limits {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// Verdict for `value`, or `None` when no limit is configured.
    pub fn evaluate(&self, value: f64) -> Option<bool> {
        match (self.min, self.max) {
            (Some(min), Some(max)) => Some(min <= value && value <= max),
            (Some(min), None) => Some(value >= min),
            (None, Some(max)) => Some(value <= max),
            (None, None) => None,
        }
    }
}

/// Returns `false` only when `value` violates a configured limit.
pub fn validate_measurement(value: f64, min: Option<f64>, max: Option<f64>) -> bool {
    if let Some(min) = min {
        if value < min {
            return false;
        }
    }
    if let Some(max) = max {
        if value > max {
            return false;
        }
    }
    true
}

/// An immutable, named, unit-tagged measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Measurement {
    name: String,
    value: MeasurementValue,
    unit: String,
    passed: Option<bool>,
    min: Option<f64>,
    max: Option<f64>,
    step_name: Option<String>,
    timestamp: DateTime<Utc>,
}

impl Measurement {
    pub fn builder(name: impl Into<String>, value: impl Into<MeasurementValue>) -> MeasurementBuilder {
        MeasurementBuilder::new(name, value)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &MeasurementValue {
        &self.value
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn passed(&self) -> Option<bool> {
        self.passed
    }

    pub fn limits(&self) -> Limits {
        Limits::new(self.min, self.max)
    }

    pub fn step_name(&self) -> Option<&str> {
        self.step_name.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Protocol form: absent optionals are omitted.
    pub fn to_protocol(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("name".to_string(), Value::String(self.name.clone()));
        data.insert("value".to_string(), self.value.to_value());
        data.insert("unit".to_string(), Value::String(self.unit.clone()));
        if let Some(passed) = self.passed {
            data.insert("passed".to_string(), Value::Bool(passed));
        }
        if let Some(min) = self.min {
            data.insert("min".to_string(), Value::from(min));
        }
        if let Some(max) = self.max {
            data.insert("max".to_string(), Value::from(max));
        }
        if let Some(step) = self.step_name.as_deref().filter(|s| !s.is_empty()) {
            data.insert("step".to_string(), Value::String(step.to_string()));
        }
        data
    }

    /// Storage form used in the run's measurement table.
    pub fn to_storage(&self) -> StoredMeasurement {
        StoredMeasurement {
            value: self.value.clone(),
            unit: self.unit.clone(),
            passed: self.passed,
            min: self.min,
            max: self.max,
        }
    }

    /// Rebuilds a measurement from its protocol or storage form.
    ///
    /// The verdict is re-derived when the map carries no explicit `passed`.
    pub fn from_map(name: impl Into<String>, data: &Map<String, Value>) -> Result<Self> {
        let name = name.into();
        let value = data
            .get("value")
            .and_then(MeasurementValue::from_value)
            .ok_or_else(|| {
                CoreError::Validation(format!("measurement '{}' has no scalar value", name))
            })?;

        let mut builder = MeasurementBuilder::new(name, value);
        if let Some(unit) = data.get("unit").and_then(Value::as_str) {
            builder = builder.unit(unit);
        }
        if let Some(passed) = data.get("passed").and_then(Value::as_bool) {
            builder = builder.passed(passed);
        }
        if let Some(min) = data.get("min").and_then(Value::as_f64) {
            builder = builder.min(min);
        }
        if let Some(max) = data.get("max").and_then(Value::as_f64) {
            builder = builder.max(max);
        }
        if let Some(step) = data.get("step").and_then(Value::as_str) {
            builder = builder.step(step);
        }
        Ok(builder.build())
    }
}

/// Storage form: `{value, unit, passed, min, max}` with nulls kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMeasurement {
    pub value: MeasurementValue,
    pub unit: String,
    pub passed: Option<bool>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl StoredMeasurement {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone)]
pub struct MeasurementBuilder {
    name: String,
    value: MeasurementValue,
    unit: String,
    passed: Option<bool>,
    limits: Limits,
    step_name: Option<String>,
}

impl MeasurementBuilder {
    pub fn new(name: impl Into<String>, value: impl Into<MeasurementValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            unit: String::new(),
            passed: None,
            limits: Limits::default(),
            step_name: None,
        }
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.limits.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.limits.max = Some(max);
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Explicit verdict; suppresses limit evaluation.
    pub fn passed(mut self, passed: bool) -> Self {
        self.passed = Some(passed);
        self
    }

    pub fn step(mut self, step_name: impl Into<String>) -> Self {
        self.step_name = Some(step_name.into());
        self
    }

    /// Attributes the measurement to `step_name` unless a step was already set.
    pub fn default_step(mut self, step_name: Option<&str>) -> Self {
        if self.step_name.is_none() {
            self.step_name = step_name.map(str::to_string);
        }
        self
    }

    pub fn build(self) -> Measurement {
        let passed = self.passed.or_else(|| {
            self.value
                .as_f64()
                .and_then(|value| self.limits.evaluate(value))
        });

        Measurement {
            name: self.name,
            value: self.value,
            unit: self.unit,
            passed,
            min: self.limits.min,
            max: self.limits.max,
            step_name: self.step_name,
            timestamp: Utc::now(),
        }
    }
}
