//! Engine, run handle and event emission for one sequence run.
//!
//! - [`ExecutionEngine`] - Drives setup, run and teardown of one sequence
//! - [`RunHandle`] - What a sequence uses to emit output during a phase
//! - [`OutputEmitter`] - Event emitter with sequence guarantees

mod events;
mod execution;
mod handle;

pub use events::OutputEmitter;
pub use execution::{EngineBuilder, ExecutionEngine};
pub use handle::{RunHandle, RunRecorder, RunState};
