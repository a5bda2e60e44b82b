use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use crate::error::{Result, SequenceError};

/// Reason recorded when an abort is raised without one.
pub const DEFAULT_ABORT_REASON: &str = "User requested abort";

/// Sticky per-run abort flag.
///
/// Clones share the flag, so the CLI's stop command and Ctrl-C handler can
/// raise the same signal the sequence checks with [`AbortHandle::check`].
/// Raising it never interrupts a running phase; sequences observe it
/// cooperatively.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    inner: Arc<AbortState>,
}

#[derive(Debug, Default)]
struct AbortState {
    aborted: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag. The first reason given is kept.
    pub fn abort(&self, reason: impl Into<String>) {
        let reason = reason.into();
        {
            let mut current = self
                .inner
                .reason
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if current.is_none() {
                info!(reason = %reason, "Abort requested");
                *current = Some(reason);
            }
        }
        self.inner.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<String> {
        self.inner
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fails with [`SequenceError::Aborted`] once the flag is raised.
    pub fn check(&self) -> Result<()> {
        if self.is_aborted() {
            let reason = self
                .reason()
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| DEFAULT_ABORT_REASON.to_string());
            return Err(SequenceError::aborted(reason));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_aborted_by_default() {
        let handle = AbortHandle::new();
        assert!(!handle.is_aborted());
        assert!(handle.check().is_ok());
        assert_eq!(handle.reason(), None);
    }

    #[test]
    fn test_abort_is_sticky_and_keeps_first_reason() {
        let handle = AbortHandle::new();
        let remote = handle.clone();

        remote.abort("operator stop");
        handle.abort("ctrl-c");

        assert!(handle.is_aborted());
        assert_eq!(handle.reason().as_deref(), Some("operator stop"));
        assert_eq!(
            handle.check(),
            Err(SequenceError::aborted("operator stop"))
        );
        // still raised on the next check
        assert!(handle.check().is_err());
    }

    #[test]
    fn test_empty_reason_uses_default() {
        let handle = AbortHandle::new();
        handle.abort("");
        assert_eq!(handle.check(), Err(SequenceError::aborted(DEFAULT_ABORT_REASON)));
    }
}
