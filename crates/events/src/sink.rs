//! Output channels for emitted events

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use crate::bus::EventBus;
use crate::error::Result;
use crate::types::EventEnvelope;

/// Destination for serialized events.
///
/// Writes are synchronous and must not wait on a consumer.
pub trait EventSink: Send + Sync {
    fn write(&self, envelope: &EventEnvelope) -> Result<()>;
}

impl EventSink for EventBus {
    fn write(&self, envelope: &EventEnvelope) -> Result<()> {
        self.publish(envelope.clone());
        Ok(())
    }
}

/// Writes one JSON object per line and flushes after each event.
pub struct JsonLinesSink {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesSink {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    /// Sink over the process's standard output
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl EventSink for JsonLinesSink {
    fn write(&self, envelope: &EventEnvelope) -> Result<()> {
        let line = envelope.to_json_line()?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for JsonLinesSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesSink").finish_non_exhaustive()
    }
}
