mod context;
mod measurement;
mod phase;
mod result;

pub use context::{ExecutionContext, HardwareConfig, Parameters};
pub use measurement::{
    validate_measurement, Limits, Measurement, MeasurementBuilder, MeasurementValue,
    StoredMeasurement,
};
pub use phase::{EnginePhase, Phase};
pub use result::{ExitStatus, RunResult, SequenceOutput, StepResult, ValueMap};
