//! Domain model for station test sequences.
//!
//! Measurements, the per-run execution context, step and run results, and the
//! lifecycle phases shared by the engine and the event protocol.

pub mod domain;
pub mod error;

pub use domain::*;
pub use error::{CoreError, Result};
