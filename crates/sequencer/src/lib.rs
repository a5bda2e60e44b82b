//! Sequence execution engine.
//!
//! A [`Sequence`] is handed to an [`ExecutionEngine`] together with its
//! [`ExecutionContext`](station_core::ExecutionContext). The engine runs the
//! three lifecycle phases, streams events through its [`OutputEmitter`],
//! notifies [`LifecycleHook`]s and returns a [`RunResult`](station_core::RunResult).

pub mod abort;
pub mod config;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod input;
pub mod runner;
pub mod sequence;
pub mod state_machine;

pub use abort::{AbortHandle, DEFAULT_ABORT_REASON};
pub use config::EngineConfig;
pub use engine::{EngineBuilder, ExecutionEngine, OutputEmitter, RunHandle};
pub use error::{Result, SequenceError};
pub use hooks::{BackgroundHooks, DrainReport, HookDispatcher, HookEvent, HookResult, LifecycleHook};
pub use input::{InputBroker, InputRequest};
pub use runner::{
    format_duration, run_with_retry, run_with_timeout, timed, RetryPolicy, StepTimer, TimerScope,
};
pub use sequence::Sequence;
pub use state_machine::PhaseStateMachine;

// Re-exported so sequence crates need only this one dependency for the
// async trait and the data model.
pub use async_trait::async_trait;
pub use station_core;
