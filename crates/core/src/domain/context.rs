use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;

/// Per-device settings keyed by device name.
pub type HardwareConfig = HashMap<String, HashMap<String, Value>>;

/// Free-form sequence parameters.
pub type Parameters = HashMap<String, Value>;

fn short_execution_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Identity, configuration and timing of a single sequence run.
///
/// Built from the station's configuration document before the run starts and
/// owned by exactly one engine. Hardware configuration and parameters are
/// carried verbatim for the sequence; the engine never interprets them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ExecutionContext {
    #[serde(default = "short_execution_id")]
    pub execution_id: String,
    #[serde(default)]
    pub wip_id: Option<String>,
    #[serde(default)]
    pub batch_id: Option<String>,

    // MES integration
    #[serde(default)]
    pub process_id: Option<i64>,
    #[serde(default)]
    pub operator_id: Option<i64>,
    #[serde(default)]
    pub lot_id: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,

    #[serde(default, alias = "hardware")]
    pub hardware_config: HardwareConfig,
    #[serde(default)]
    pub parameters: Parameters,

    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub sequence_name: String,
    #[serde(default)]
    pub sequence_version: String,
    #[serde(default)]
    pub station_id: String,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            execution_id: short_execution_id(),
            wip_id: None,
            batch_id: None,
            process_id: None,
            operator_id: None,
            lot_id: None,
            serial_number: None,
            hardware_config: HardwareConfig::new(),
            parameters: Parameters::new(),
            dry_run: false,
            started_at: None,
            completed_at: None,
            sequence_name: String::new(),
            sequence_version: String::new(),
            station_id: String::new(),
        }
    }
}

impl ExecutionContext {
    pub fn new(sequence_name: impl Into<String>, sequence_version: impl Into<String>) -> Self {
        Self {
            sequence_name: sequence_name.into(),
            sequence_version: sequence_version.into(),
            ..Default::default()
        }
    }

    /// Builds a context from a station configuration document.
    ///
    /// Hardware settings may be given under `hardware` or `hardware_config`.
    pub fn from_config(config: Value) -> Result<Self> {
        Ok(serde_json::from_value(config)?)
    }

    pub fn with_hardware_config(mut self, hardware_config: HardwareConfig) -> Self {
        self.hardware_config = hardware_config;
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// Settings for one device; empty when the device is not configured.
    pub fn hardware(&self, name: &str) -> HashMap<String, Value> {
        self.hardware_config.get(name).cloned().unwrap_or_default()
    }

    /// Whether the `debug` parameter is set to a truthy value.
    pub fn debug_enabled(&self) -> bool {
        match self.parameters.get("debug") {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            _ => false,
        }
    }

    /// Elapsed run time: to completion if completed, otherwise to now.
    pub fn duration(&self) -> Option<Duration> {
        let started_at = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        Some((end - started_at).to_std().unwrap_or_default())
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.duration().map(|d| d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_config() {
        let config = json!({
            "execution_id": "exec-001",
            "wip_id": "WIP-42",
            "process_id": 7,
            "operator_id": 12,
            "serial_number": "SN0001",
            "hardware": {"psu": {"port": "/dev/ttyUSB0", "baud": 9600}},
            "parameters": {"target_voltage": 3.3},
            "station_id": "ST-01"
        });

        let ctx = ExecutionContext::from_config(config).unwrap();
        assert_eq!(ctx.execution_id, "exec-001");
        assert_eq!(ctx.wip_id.as_deref(), Some("WIP-42"));
        assert_eq!(ctx.process_id, Some(7));
        assert_eq!(ctx.hardware("psu")["baud"], json!(9600));
        assert_eq!(ctx.parameter("target_voltage"), Some(&json!(3.3)));
        assert_eq!(ctx.station_id, "ST-01");
        assert!(!ctx.dry_run);
    }

    #[test]
    fn test_default_execution_id() {
        let ctx = ExecutionContext::from_config(json!({})).unwrap();
        assert_eq!(ctx.execution_id.len(), 8);
        assert!(ctx.hardware("missing").is_empty());
    }

    #[test]
    fn test_from_config_rejects_bad_types() {
        let result = ExecutionContext::from_config(json!({"process_id": "not-a-number"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_duration_lifecycle() {
        let mut ctx = ExecutionContext::new("demo", "1.0.0");
        assert!(ctx.duration().is_none());

        ctx.start();
        assert!(ctx.duration().is_some());
        assert!(ctx.completed_at.is_none());

        ctx.complete();
        let first = ctx.duration_seconds().unwrap();
        let second = ctx.duration_seconds().unwrap();
        assert_eq!(first, second);
        assert!(first >= 0.0);
    }

    #[test]
    fn test_to_value_includes_timestamps() {
        let mut ctx = ExecutionContext::new("demo", "1.0.0");
        let value = ctx.to_value();
        assert_eq!(value["started_at"], Value::Null);
        assert_eq!(value["sequence_name"], json!("demo"));

        ctx.start();
        let value = ctx.to_value();
        assert!(value["started_at"].is_string());
    }

    #[test]
    fn test_debug_enabled() {
        let mut ctx = ExecutionContext::default();
        assert!(!ctx.debug_enabled());
        ctx.parameters.insert("debug".to_string(), json!(true));
        assert!(ctx.debug_enabled());
        ctx.parameters.insert("debug".to_string(), json!(0));
        assert!(!ctx.debug_enabled());
    }
}
