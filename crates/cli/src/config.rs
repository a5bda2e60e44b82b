//! Run configuration supplied on the command line.

use std::path::Path;

use anyhow::{bail, Context, Result};
use sequencer::EngineConfig;
use serde_json::{Map, Value};
use station_core::ExecutionContext;
use tracing::debug;

const ENGINE_KEY: &str = "engine";

/// Everything needed to start one execution.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub context: ExecutionContext,
    pub engine: EngineConfig,
}

impl RunConfig {
    /// Loads the `--config` argument.
    ///
    /// A value starting with `{` is parsed as inline JSON; anything else is a
    /// path to a `.json` or `.toml` document. No argument gives the defaults.
    pub fn load(source: Option<&str>) -> Result<Self> {
        let document = match source.map(str::trim) {
            None | Some("") => Value::Object(Map::new()),
            Some(inline) if inline.starts_with('{') => {
                serde_json::from_str(inline).context("Invalid JSON in --config")?
            }
            Some(path) => read_document(Path::new(path))?,
        };
        Self::from_document(document)
    }

    pub fn from_document(document: Value) -> Result<Self> {
        let Value::Object(mut map) = document else {
            bail!("Configuration must be a JSON object");
        };

        let engine = match map.remove(ENGINE_KEY) {
            Some(section) => {
                serde_json::from_value(section).context("Invalid 'engine' configuration")?
            }
            None => EngineConfig::default(),
        };
        let context = ExecutionContext::from_config(Value::Object(map))
            .context("Invalid execution configuration")?;

        Ok(Self { context, engine })
    }

    /// Applies `--hardware`, `--parameters` and `--execution-id`.
    ///
    /// An override object replaces the configured map only when non-empty.
    pub fn apply_overrides(
        &mut self,
        hardware: Option<&str>,
        parameters: Option<&str>,
        execution_id: Option<&str>,
    ) -> Result<()> {
        if let Some(raw) = hardware {
            let hardware: station_core::HardwareConfig =
                serde_json::from_str(raw).context("Invalid JSON in --hardware")?;
            if !hardware.is_empty() {
                self.context.hardware_config = hardware;
            }
        }

        if let Some(raw) = parameters {
            let parameters: station_core::Parameters =
                serde_json::from_str(raw).context("Invalid JSON in --parameters")?;
            if !parameters.is_empty() {
                self.context.parameters = parameters;
            }
        }

        if let Some(id) = execution_id.filter(|id| !id.is_empty()) {
            self.context.execution_id = id.to_string();
        }
        Ok(())
    }
}

fn read_document(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Config file not found: {}", path.display()))?;
    debug!(path = %path.display(), "Loaded config file");

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => {
            toml::from_str(&content).with_context(|| format!("Invalid TOML in {}", path.display()))
        }
        _ => serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::Builder;

    #[test]
    fn test_inline_json() {
        let config = RunConfig::load(Some(
            r#"{"execution_id": "run-0001", "wip_id": "WIP-9", "hardware": {"psu": {"port": "/dev/ttyUSB0"}}}"#,
        ))
        .unwrap();

        assert_eq!(config.context.execution_id, "run-0001");
        assert_eq!(config.context.wip_id.as_deref(), Some("WIP-9"));
        assert_eq!(config.context.hardware("psu")["port"], json!("/dev/ttyUSB0"));
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_defaults_without_config() {
        let config = RunConfig::load(None).unwrap();
        assert_eq!(config.context.execution_id.len(), 8);
        assert!(config.context.parameters.is_empty());
    }

    #[test]
    fn test_toml_file_with_engine_section() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
station_id = "ST-04"
lot_id = "LOT-7"

[parameters]
target_voltage = 5.0

[engine]
hook_drain_timeout_ms = 250
"#
        )
        .unwrap();

        let config = RunConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.context.station_id, "ST-04");
        assert_eq!(config.context.lot_id.as_deref(), Some("LOT-7"));
        assert_eq!(config.context.parameter("target_voltage"), Some(&json!(5.0)));
        assert_eq!(config.engine.hook_drain_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_json_file() {
        let mut file = Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"serial_number": "SN-42", "operator_id": 7}}"#).unwrap();

        let config = RunConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.context.serial_number.as_deref(), Some("SN-42"));
        assert_eq!(config.context.operator_id, Some(7));
    }

    #[test]
    fn test_missing_file() {
        let err = RunConfig::load(Some("/nonexistent/station.json")).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_invalid_inline_json() {
        assert!(RunConfig::load(Some("{not json")).is_err());
    }

    #[test]
    fn test_overrides_replace_when_non_empty() {
        let mut config =
            RunConfig::load(Some(r#"{"parameters": {"a": 1}, "hardware": {"dmm": {"addr": 3}}}"#))
                .unwrap();

        config
            .apply_overrides(Some("{}"), Some(r#"{"b": 2}"#), Some("override1"))
            .unwrap();

        assert_eq!(config.context.hardware("dmm")["addr"], json!(3));
        assert_eq!(config.context.parameter("a"), None);
        assert_eq!(config.context.parameter("b"), Some(&json!(2)));
        assert_eq!(config.context.execution_id, "override1");
    }

    #[test]
    fn test_invalid_override() {
        let mut config = RunConfig::load(None).unwrap();
        assert!(config.apply_overrides(None, Some("[1, 2]"), None).is_err());
    }
}
