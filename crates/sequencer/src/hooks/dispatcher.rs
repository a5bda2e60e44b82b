use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use events::LogLevel;
use futures::FutureExt;
use serde_json::{Map, Value};
use station_core::ExecutionContext;
use tracing::{debug, warn};

use super::{HookEvent, LifecycleHook};
use crate::engine::OutputEmitter;
use crate::error::panic_message;

/// Runs every registered hook for an event, in registration order.
///
/// A hook that returns an error or panics is reported as a `warning` log
/// event naming the hook and the event, and the next hook still runs.
#[derive(Clone)]
pub struct HookDispatcher {
    hooks: Arc<[Arc<dyn LifecycleHook>]>,
    emitter: OutputEmitter,
}

impl HookDispatcher {
    pub fn new(hooks: Vec<Arc<dyn LifecycleHook>>, emitter: OutputEmitter) -> Self {
        Self {
            hooks: hooks.into(),
            emitter,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns the number of hooks that failed.
    pub async fn dispatch(&self, context: &ExecutionContext, event: &HookEvent) -> usize {
        let mut failures = 0;

        for hook in self.hooks.iter() {
            let outcome = AssertUnwindSafe(event.invoke(hook.as_ref(), context))
                .catch_unwind()
                .await;

            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{:#}", e),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };

            failures += 1;
            self.report(hook.name(), event.name(), &error);
        }

        if failures == 0 && !self.hooks.is_empty() {
            debug!(event = event.name(), hooks = self.hooks.len(), "Hooks dispatched");
        }
        failures
    }

    fn report(&self, hook: &str, event: &str, error: &str) {
        warn!(hook, event, error, "Hook raised an error");

        let mut extra = Map::new();
        extra.insert("hook".to_string(), Value::String(hook.to_string()));
        extra.insert("event".to_string(), Value::String(event.to_string()));
        self.emitter.log(
            LogLevel::Warning,
            format!("Hook error in {}: {}", event, error),
            extra,
        );
    }
}

impl std::fmt::Debug for HookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.hooks.iter().map(|h| h.name()).collect();
        f.debug_struct("HookDispatcher").field("hooks", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::HookResult;
    use async_trait::async_trait;
    use events::{Event, EventBus};
    use std::sync::Mutex;

    struct Recording {
        label: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl LifecycleHook for Recording {
        fn name(&self) -> &str {
            self.label
        }

        async fn on_setup_start(&self, _context: &ExecutionContext) -> HookResult {
            self.calls.lock().unwrap().push(self.label.to_string());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl LifecycleHook for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn on_setup_start(&self, _context: &ExecutionContext) -> HookResult {
            anyhow::bail!("database unavailable")
        }
    }

    struct Panicking;

    #[async_trait]
    impl LifecycleHook for Panicking {
        async fn on_setup_start(&self, _context: &ExecutionContext) -> HookResult {
            panic!("hook exploded")
        }
    }

    #[tokio::test]
    async fn test_dispatch_in_registration_order_despite_failures() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let emitter = OutputEmitter::new("exec-1", bus);

        let hooks: Vec<Arc<dyn LifecycleHook>> = vec![
            Arc::new(Recording {
                label: "first",
                calls: calls.clone(),
            }),
            Arc::new(Failing),
            Arc::new(Panicking),
            Arc::new(Recording {
                label: "last",
                calls: calls.clone(),
            }),
        ];
        let dispatcher = HookDispatcher::new(hooks, emitter);

        let context = ExecutionContext::new("demo", "1.0.0");
        let failures = dispatcher.dispatch(&context, &HookEvent::SetupStart).await;

        assert_eq!(failures, 2);
        assert_eq!(*calls.lock().unwrap(), vec!["first", "last"]);

        let first = rx.recv().await.unwrap();
        match first.event {
            Event::Log {
                level,
                message,
                extra,
            } => {
                assert_eq!(level, LogLevel::Warning);
                assert_eq!(message, "Hook error in on_setup_start: database unavailable");
                assert_eq!(extra["hook"], "failing");
            }
            other => panic!("unexpected event {:?}", other),
        }

        let second = rx.recv().await.unwrap();
        match second.event {
            Event::Log { message, .. } => assert!(message.contains("hook exploded")),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_dispatcher() {
        let dispatcher = HookDispatcher::new(Vec::new(), OutputEmitter::new("x", EventBus::new()));
        assert!(dispatcher.is_empty());
        let context = ExecutionContext::default();
        assert_eq!(dispatcher.dispatch(&context, &HookEvent::RunStart).await, 0);
    }
}
