//! Sample power-supply check run by the `station-demo` binary.
//!
//! Without a `psu` hardware entry the supply is simulated at the target
//! voltage. Hardware keys: `port`, `voltage`, `current`, `settle_ms`, `fault`.

use std::collections::HashMap;
use std::time::Duration;

use events::LogLevel;
use serde::Deserialize;
use serde_json::{Map, Value};
use station_core::{Measurement, SequenceOutput};
use sequencer::{async_trait, run_with_retry, run_with_timeout, Result, RunHandle, Sequence, SequenceError};

const DEVICE: &str = "psu";
const TOTAL_STEPS: u32 = 3;
const READ_TIMEOUT: Duration = Duration::from_secs(2);
const ENABLE_RETRIES: u32 = 2;
const ENABLE_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Tunables read from the run's `parameters`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SupplyParameters {
    pub target_voltage: f64,
    /// Allowed deviation as a fraction of the target
    pub tolerance: f64,
    /// Amps
    pub max_current: f64,
}

impl Default for SupplyParameters {
    fn default() -> Self {
        Self {
            target_voltage: 3.3,
            tolerance: 0.05,
            max_current: 0.5,
        }
    }
}

impl SupplyParameters {
    fn voltage_limits(&self) -> (f64, f64) {
        let band = self.target_voltage * self.tolerance;
        (self.target_voltage - band, self.target_voltage + band)
    }
}

#[derive(Debug, Clone)]
struct SimulatedSupply {
    port: Option<String>,
    voltage: f64,
    current: f64,
    settle: Duration,
    fault: Option<String>,
}

impl SimulatedSupply {
    fn from_config(config: &HashMap<String, Value>, target_voltage: f64) -> Self {
        let number = |key: &str| config.get(key).and_then(Value::as_f64);
        Self {
            port: config.get("port").and_then(Value::as_str).map(str::to_string),
            voltage: number("voltage").unwrap_or(target_voltage),
            current: number("current").unwrap_or(0.12),
            settle: Duration::from_millis(config.get("settle_ms").and_then(Value::as_u64).unwrap_or(50)),
            fault: config.get("fault").and_then(Value::as_str).map(str::to_string),
        }
    }

    async fn enable(&self) -> Result<()> {
        match &self.fault {
            Some(fault) => Err(SequenceError::hardware(DEVICE, fault.clone())),
            None => Ok(()),
        }
    }

    async fn read_voltage(&self) -> Result<f64> {
        tokio::time::sleep(self.settle).await;
        Ok(self.voltage)
    }

    async fn read_current(&self) -> Result<f64> {
        tokio::time::sleep(self.settle).await;
        Ok(self.current)
    }
}

/// Powers the supply, checks output voltage against a tolerance band and
/// load current against a ceiling.
#[derive(Debug, Default)]
pub struct PowerSupplyCheck {
    params: SupplyParameters,
    supply: Option<SimulatedSupply>,
    output_on: bool,
}

impl PowerSupplyCheck {
    pub fn new() -> Self {
        Self::default()
    }

    fn supply(&self) -> Result<&SimulatedSupply> {
        self.supply
            .as_ref()
            .ok_or_else(|| SequenceError::sequence("Power supply not initialized"))
    }
}

#[async_trait]
impl Sequence for PowerSupplyCheck {
    fn name(&self) -> &str {
        "power_supply_check"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Output voltage and load current of a bench supply"
    }

    async fn setup(&mut self, run: &RunHandle<'_>) -> Result<()> {
        let parameters: Map<String, Value> = run
            .context()
            .parameters
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        self.params = serde_json::from_value(Value::Object(parameters))
            .map_err(|e| SequenceError::validation(format!("Invalid parameters: {}", e)))?;
        if self.params.tolerance < 0.0 {
            return Err(SequenceError::setup("tolerance must not be negative"));
        }

        let supply = SimulatedSupply::from_config(&run.hardware_config(DEVICE), self.params.target_voltage);
        let mut extra = Map::new();
        extra.insert("device".to_string(), Value::from(DEVICE));
        if let Some(port) = &supply.port {
            extra.insert("port".to_string(), Value::from(port.as_str()));
        }
        run.emit_log_with(LogLevel::Info, "Power supply connected", extra);

        self.supply = Some(supply);
        Ok(())
    }

    async fn run(&mut self, run: &RunHandle<'_>) -> Result<SequenceOutput> {
        let params = self.params.clone();
        let supply = self.supply()?.clone();

        run.run_step("power_on", 1, TOTAL_STEPS, async {
            run_with_retry(|| supply.enable(), ENABLE_RETRIES, ENABLE_RETRY_DELAY).await?;
            Ok(true)
        })
        .await?;
        self.output_on = true;
        run.check_abort()?;

        let (min, max) = params.voltage_limits();
        let voltage_ok = run
            .run_step("measure_voltage", 2, TOTAL_STEPS, async {
                let volts = run_with_timeout(READ_TIMEOUT, supply.read_voltage()).await?;
                let measurement = run.emit_measurement(
                    Measurement::builder("output_voltage", volts)
                        .unit("V")
                        .min(min)
                        .max(max),
                );
                Ok(measurement.passed() == Some(true))
            })
            .await?;
        run.check_abort()?;

        let current_ok = run
            .run_step("measure_current", 3, TOTAL_STEPS, async {
                let amps = run_with_timeout(READ_TIMEOUT, supply.read_current()).await?;
                let measurement = run.emit_measurement(
                    Measurement::builder("load_current", amps)
                        .unit("A")
                        .max(params.max_current),
                );
                Ok(measurement.passed() == Some(true))
            })
            .await?;

        Ok(SequenceOutput::from_verdict(voltage_ok && current_ok)
            .with_data("target_voltage", params.target_voltage))
    }

    async fn teardown(&mut self, run: &RunHandle<'_>) -> Result<()> {
        if self.output_on {
            self.output_on = false;
            run.emit_log(LogLevel::Info, "Power supply output disabled");
        }
        self.supply = None;
        Ok(())
    }
}
