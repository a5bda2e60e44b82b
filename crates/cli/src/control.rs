//! Inbound control channel: operator input responses and stop/abort commands.

use std::io::BufRead;

use events::{CommandAction, ControlMessage};
use sequencer::{AbortHandle, InputBroker, DEFAULT_ABORT_REASON};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const STOP_REASON: &str = "Stop requested";

/// What a control line resulted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    InputDelivered,
    /// Response for a request nobody is waiting on
    InputIgnored,
    AbortRaised,
    /// Command addressed to another execution, or a status request
    Ignored,
    Invalid(String),
}

/// Applies control messages to one execution.
#[derive(Debug, Clone)]
pub struct ControlRouter {
    execution_id: String,
    inputs: InputBroker,
    abort: AbortHandle,
}

impl ControlRouter {
    pub fn new(execution_id: impl Into<String>, inputs: InputBroker, abort: AbortHandle) -> Self {
        Self {
            execution_id: execution_id.into(),
            inputs,
            abort,
        }
    }

    pub fn handle_line(&self, line: &str) -> ControlOutcome {
        let message = match ControlMessage::parse_line(line) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed control line");
                return ControlOutcome::Invalid(e.to_string());
            }
        };

        match message {
            ControlMessage::InputResponse { request_id, value } => {
                if self.inputs.respond(&request_id, value) {
                    ControlOutcome::InputDelivered
                } else {
                    ControlOutcome::InputIgnored
                }
            }
            ControlMessage::Command {
                action,
                execution_id,
                reason,
            } => {
                if execution_id
                    .as_deref()
                    .is_some_and(|id| id != self.execution_id)
                {
                    debug!(target_id = ?execution_id, "Command for another execution");
                    return ControlOutcome::Ignored;
                }
                let reason = reason.unwrap_or_else(|| match action {
                    CommandAction::Stop => STOP_REASON.to_string(),
                    CommandAction::Abort => DEFAULT_ABORT_REASON.to_string(),
                });
                info!(action = ?action, reason = %reason, "Control command received");
                self.abort.abort(reason);
                ControlOutcome::AbortRaised
            }
            ControlMessage::StatusRequest { .. } => ControlOutcome::Ignored,
        }
    }
}

/// Reads lines from the process's stdin on a dedicated thread.
///
/// The thread is detached; blocking reads never hold up runtime shutdown.
pub fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = std::thread::Builder::new()
        .name("control-stdin".to_string())
        .spawn(move || forward_lines(std::io::stdin().lock(), &tx));

    if let Err(e) = spawned {
        warn!(error = %e, "Could not start control channel reader");
    }
    rx
}

/// Sends each line of `reader` until it ends, fails, or nobody listens.
fn forward_lines(reader: impl BufRead, tx: &mpsc::UnboundedSender<String>) {
    for line in reader.lines() {
        match line {
            Ok(line) => {
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "Control channel read failed");
                break;
            }
        }
    }
    debug!("Control channel closed");
}

/// Routes every received line until the channel closes.
pub fn spawn_router(mut lines: mpsc::UnboundedReceiver<String>, router: ControlRouter) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(line) = lines.recv().await {
            if line.trim().is_empty() {
                continue;
            }
            router.handle_line(&line);
        }
    })
}
