//! Operator input requests and their responses.
//!
//! A step asks for input through the run handle, which registers the request
//! with the [`InputBroker`] and emits an `input_request` event. Whoever reads
//! the control channel routes `input_response` messages back through
//! [`InputBroker::respond`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use events::InputType;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

/// Routes operator responses to the steps waiting on them.
#[derive(Debug, Clone, Default)]
pub struct InputBroker {
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<Value>>>>,
    counter: Arc<AtomicU64>,
}

impl InputBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unique id of the form `{prefix}_{n}`.
    pub fn next_request_id(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}_{}", prefix, n)
    }

    /// Registers `request_id` and returns the receiver its answer arrives on.
    pub fn register(&self, request_id: impl Into<String>) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(request_id.into(), tx);
        rx
    }

    /// Delivers a response. Returns false when nothing is waiting on the id.
    pub fn respond(&self, request_id: &str, value: Value) -> bool {
        let Some(tx) = self.lock().remove(request_id) else {
            debug!(request_id, "Ignoring response for unknown input request");
            return false;
        };
        tx.send(value).is_ok()
    }

    /// Drops a pending request, typically after it timed out.
    pub fn cancel(&self, request_id: &str) {
        self.lock().remove(request_id);
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<Value>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What to ask the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct InputRequest {
    pub prompt: String,
    pub input_type: InputType,
    pub options: Option<Vec<String>>,
    pub default: Option<Value>,
    /// Falls back to the engine's input timeout when unset
    pub timeout: Option<Duration>,
}

impl InputRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            input_type: InputType::Text,
            options: None,
            default: None,
            timeout: None,
        }
    }

    pub fn number(prompt: impl Into<String>) -> Self {
        Self {
            input_type: InputType::Number,
            ..Self::text(prompt)
        }
    }

    pub fn select(prompt: impl Into<String>, options: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            input_type: InputType::Select,
            options: Some(options.into_iter().map(Into::into).collect()),
            ..Self::text(prompt)
        }
    }

    pub fn confirm(prompt: impl Into<String>) -> Self {
        Self {
            input_type: InputType::Confirm,
            ..Self::text(prompt)
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Truthiness of a confirmation answer.
///
/// Accepts booleans, non-zero numbers and the usual affirmative words.
pub fn is_affirmative(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "y" | "yes" | "true" | "1" | "ok"
        ),
        Value::Null => false,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
