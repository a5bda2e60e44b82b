//! Output protocol for station sequences
//!
//! This crate provides the event types emitted during a sequence run, the
//! broadcast bus used to fan them out in-process, and sinks that serialize
//! them to an output channel as JSON Lines.

mod bus;
mod error;
mod sink;
mod types;

pub use bus::EventBus;
pub use error::{EventsError, Result};
pub use sink::{EventSink, JsonLinesSink};
pub use types::*;
