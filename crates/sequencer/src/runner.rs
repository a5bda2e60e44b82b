//! Timeout, retry and timing helpers for engine and sequence code.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, warn};

use crate::error::{Result, SequenceError};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Runs `operation` with a wall-clock deadline.
///
/// If the deadline passes first the operation is dropped, which cancels it at
/// its next suspension point, and a [`SequenceError::Timeout`] carrying
/// `timeout` is returned. Otherwise the operation's own result is returned.
pub async fn run_with_timeout<T, F>(timeout: Duration, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "Operation timed out");
            Err(SequenceError::timeout(timeout))
        }
    }
}

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Runs `operation` until it succeeds or the attempts are used up.
    ///
    /// Only failures accepted by `should_retry` are retried; any other failure
    /// is returned immediately. When every attempt fails, the error of the
    /// last attempt is returned unchanged.
    pub async fn run<T, E, F, Fut, P>(&self, mut operation: F, should_retry: P) -> std::result::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if !should_retry(&e) => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    error!(
                        attempts = attempt,
                        error = %e,
                        "Operation failed, retries exhausted"
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = self.retry_delay.as_millis() as u64,
                        error = %e,
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }
}

/// Retries `operation` on any [`SequenceError`] except an abort.
pub async fn run_with_retry<T, F, Fut>(
    operation: F,
    max_retries: u32,
    retry_delay: Duration,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    RetryPolicy::new(max_retries, retry_delay)
        .run(operation, |e: &SequenceError| !e.is_abort())
        .await
}

/// Elapsed-time measurement for a step or any other scope.
#[derive(Debug, Clone, Copy)]
pub struct StepTimer {
    started: Instant,
    stopped: Option<Instant>,
}

impl StepTimer {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            stopped: None,
        }
    }

    /// Stamps the end time; later calls keep the first stamp.
    pub fn stop(&mut self) -> Duration {
        let stopped = *self.stopped.get_or_insert_with(Instant::now);
        stopped - self.started
    }

    pub fn is_running(&self) -> bool {
        self.stopped.is_none()
    }

    /// Guard that stops the timer when dropped, so the end is stamped on
    /// every exit from the enclosing scope: normal, `?` or unwinding.
    pub fn scope(&mut self) -> TimerScope<'_> {
        TimerScope { timer: self }
    }

    /// End minus start, or now minus start while still running.
    pub fn duration(&self) -> Duration {
        self.stopped.unwrap_or_else(Instant::now) - self.started
    }

    pub fn seconds(&self) -> f64 {
        self.duration().as_secs_f64()
    }
}

/// Scope guard returned by [`StepTimer::scope`].
#[derive(Debug)]
pub struct TimerScope<'a> {
    timer: &'a mut StepTimer,
}

impl TimerScope<'_> {
    /// Elapsed time so far.
    pub fn elapsed(&self) -> Duration {
        self.timer.duration()
    }
}

impl Drop for TimerScope<'_> {
    fn drop(&mut self) {
        self.timer.stop();
    }
}

/// Awaits `operation` and reports how long it took, whatever its outcome.
pub async fn timed<T, F>(operation: F) -> (T, Duration)
where
    F: Future<Output = T>,
{
    let mut timer = StepTimer::start();
    let output = operation.await;
    (output, timer.stop())
}

/// Formats seconds as `45.2s`, `1m 23s` or `1h 2m`.
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor() as u64;
        let secs = seconds % 60.0;
        format!("{}m {:.0}s", minutes, secs)
    } else {
        let hours = (seconds / 3600.0).floor() as u64;
        let minutes = ((seconds % 3600.0) / 60.0).floor() as u64;
        format!("{}h {}m", hours, minutes)
    }
}
