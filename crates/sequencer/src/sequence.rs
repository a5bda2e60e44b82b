use async_trait::async_trait;
use station_core::SequenceOutput;

use crate::engine::RunHandle;
use crate::error::Result;

/// A test sequence driven by the [`ExecutionEngine`](crate::ExecutionEngine).
///
/// The engine calls `setup`, then `run` only if setup succeeded, then
/// `teardown` exactly once whatever happened before. Output such as steps,
/// measurements and logs goes through the [`RunHandle`] passed to each phase.
///
/// ```ignore
/// struct PowerCheck;
///
/// #[async_trait]
/// impl Sequence for PowerCheck {
///     fn name(&self) -> &str { "power_check" }
///
///     async fn setup(&mut self, _run: &RunHandle<'_>) -> Result<()> { Ok(()) }
///
///     async fn run(&mut self, run: &RunHandle<'_>) -> Result<SequenceOutput> {
///         let v = run.emit_measurement(Measurement::builder("voltage", 3.3).min(3.0).max(3.6));
///         Ok(SequenceOutput::from_verdict(v.passed() == Some(true)))
///     }
///
///     async fn teardown(&mut self, _run: &RunHandle<'_>) -> Result<()> { Ok(()) }
/// }
/// ```
#[async_trait]
pub trait Sequence: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "0.0.0"
    }

    fn description(&self) -> &str {
        ""
    }

    /// Acquire hardware and resources.
    async fn setup(&mut self, run: &RunHandle<'_>) -> Result<()>;

    /// Execute the test logic and report the verdict.
    async fn run(&mut self, run: &RunHandle<'_>) -> Result<SequenceOutput>;

    /// Release everything `setup` acquired; may see a partially set-up state.
    async fn teardown(&mut self, run: &RunHandle<'_>) -> Result<()>;
}
