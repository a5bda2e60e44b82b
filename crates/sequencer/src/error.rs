use std::any::Any;
use std::time::Duration;

use thiserror::Error;

/// Failures raised by sequence code and the timing utilities.
///
/// The variant decides how a phase failure is reported in the run's
/// top-level `error` field; see [`SequenceError::summary`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SequenceError {
    #[error("{message}")]
    Setup { message: String },

    /// Generic failure of the sequence logic
    #[error("{message}")]
    Sequence { message: String },

    #[error("Step '{step}' failed: {message}")]
    Step { step: String, message: String },

    #[error("{reason}")]
    Aborted { reason: String },

    #[error("{message}")]
    Teardown { message: String },

    #[error("Operation timed out after {}s", .timeout.as_secs_f64())]
    Timeout { timeout: Duration },

    #[error("Hardware '{device}': {message}")]
    Hardware { device: String, message: String },

    #[error("Input error: {message}")]
    Input { message: String },

    /// Invalid parameters or configuration seen by the sequence
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Any fault not covered by the variants above, including panics
    #[error("{message}")]
    Unexpected { message: String },
}

impl SequenceError {
    pub fn setup(message: impl Into<String>) -> Self {
        Self::Setup {
            message: message.into(),
        }
    }

    pub fn sequence(message: impl Into<String>) -> Self {
        Self::Sequence {
            message: message.into(),
        }
    }

    pub fn step(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Step {
            step: step.into(),
            message: message.into(),
        }
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    pub fn teardown(message: impl Into<String>) -> Self {
        Self::Teardown {
            message: message.into(),
        }
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout { timeout }
    }

    pub fn hardware(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hardware {
            device: device.into(),
            message: message.into(),
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            message: message.into(),
        }
    }

    /// Stable code used in `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Setup { .. } => "SETUP_ERROR",
            Self::Sequence { .. } => "SEQUENCE_ERROR",
            Self::Step { .. } => "STEP_ERROR",
            Self::Aborted { .. } => "ABORT_ERROR",
            Self::Teardown { .. } => "TEARDOWN_ERROR",
            Self::Timeout { .. } => "TIMEOUT_ERROR",
            Self::Hardware { .. } => "HARDWARE_ERROR",
            Self::Input { .. } => "INPUT_ERROR",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Unexpected { .. } => "UNEXPECTED_ERROR",
        }
    }

    /// Run-level description, classified setup → abort → sequence → unexpected.
    pub fn summary(&self) -> String {
        match self {
            Self::Setup { message } => format!("Setup failed: {}", message),
            Self::Aborted { reason } => format!("Aborted: {}", reason),
            Self::Unexpected { message } => format!("Unexpected error: {}", message),
            other => format!("Sequence error: {}", other),
        }
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Step the failure is attributed to, if any.
    pub fn step_name(&self) -> Option<&str> {
        match self {
            Self::Step { step, .. } => Some(step),
            _ => None,
        }
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

impl From<anyhow::Error> for SequenceError {
    fn from(err: anyhow::Error) -> Self {
        Self::unexpected(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, SequenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_classification() {
        assert_eq!(
            SequenceError::setup("PSU not found").summary(),
            "Setup failed: PSU not found"
        );
        assert_eq!(
            SequenceError::aborted("operator stop").summary(),
            "Aborted: operator stop"
        );
        assert_eq!(
            SequenceError::sequence("limit exceeded").summary(),
            "Sequence error: limit exceeded"
        );
        assert_eq!(
            SequenceError::unexpected("index out of range").summary(),
            "Unexpected error: index out of range"
        );
        assert_eq!(
            SequenceError::step("flash", "crc").summary(),
            "Sequence error: Step 'flash' failed: crc"
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = SequenceError::timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "Operation timed out after 1.5s");
        assert_eq!(err.code(), "TIMEOUT_ERROR");
        assert!(err.is_timeout());
    }

    #[test]
    fn test_from_anyhow() {
        let err: SequenceError = anyhow::anyhow!("serial port closed").into();
        assert_eq!(err.code(), "UNEXPECTED_ERROR");
        assert_eq!(err.to_string(), "serial port closed");
    }

    #[test]
    fn test_panic_message() {
        let payload = std::panic::catch_unwind(|| panic!("driver crashed")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "driver crashed");

        let payload = std::panic::catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "code 7");
    }

    #[test]
    fn test_validation_is_a_sequence_error() {
        let err = SequenceError::validation("tolerance must not be negative");
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(
            err.summary(),
            "Sequence error: Validation error: tolerance must not be negative"
        );
    }

    #[test]
    fn test_step_name() {
        assert_eq!(SequenceError::step("flash", "x").step_name(), Some("flash"));
        assert_eq!(SequenceError::sequence("x").step_name(), None);
    }
}
