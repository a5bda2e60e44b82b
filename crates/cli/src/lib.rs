//! Command-line entry point for station sequences.
//!
//! A sequence executable hands a factory to [`run_from_cli`], which parses the
//! command line, loads the run configuration, streams events to stdout as JSON
//! Lines and listens for control messages on stdin.

pub mod args;
pub mod config;
pub mod control;
pub mod demo;

use std::sync::Arc;

use clap::error::ErrorKind;
use clap::Parser;
use events::{CommandAction, ControlMessage, EventBus, JsonLinesSink, LogLevel};
use sequencer::{AbortHandle, ExecutionEngine, InputBroker, OutputEmitter, Sequence};
use serde_json::Map;
use station_core::{ExitStatus, RunResult};
use tokio::task::JoinError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use args::{Action, Cli};
pub use config::RunConfig;
pub use control::{ControlOutcome, ControlRouter};

const INTERRUPT_REASON: &str = "Execution interrupted by user";
const UNKNOWN_EXECUTION: &str = "unknown";

/// Parses the process arguments and performs the requested action.
pub async fn run_from_cli<F>(factory: F) -> ExitStatus
where
    F: FnOnce() -> Box<dyn Sequence>,
{
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let informational = matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion);
            // Output already goes to the right stream with clap's formatting
            let _ = e.print();
            if informational {
                return ExitStatus::Pass;
            }
            report_error(UNKNOWN_EXECUTION, "ARGUMENT_ERROR", e.kind().to_string());
            return ExitStatus::Error;
        }
    };

    init_tracing(cli.verbose);
    run(cli, factory).await
}

/// Performs the action of an already parsed command line.
pub async fn run<F>(cli: Cli, factory: F) -> ExitStatus
where
    F: FnOnce() -> Box<dyn Sequence>,
{
    match cli.action() {
        Action::Start => start(&cli, factory()).await,
        Action::Stop => {
            print_control(&ControlMessage::Command {
                action: CommandAction::Stop,
                execution_id: cli.execution_id.clone(),
                reason: None,
            });
            ExitStatus::Pass
        }
        Action::Status => {
            let sequence = factory();
            print_control(&ControlMessage::StatusRequest {
                sequence_name: sequence.name().to_string(),
                execution_id: cli.execution_id.clone(),
            });
            ExitStatus::Pass
        }
    }
}

async fn start(cli: &Cli, sequence: Box<dyn Sequence>) -> ExitStatus {
    let config = match load_config(cli) {
        Ok(config) => config,
        Err(e) => {
            let execution_id = cli.execution_id.as_deref().unwrap_or(UNKNOWN_EXECUTION);
            report_error(execution_id, "CONFIG_ERROR", format!("{:#}", e));
            return ExitStatus::Error;
        }
    };

    if cli.dry_run {
        stdout_emitter(&config.context.execution_id).log(
            LogLevel::Info,
            "Dry run - config validated",
            Map::new(),
        );
        return ExitStatus::Pass;
    }

    let execution_id = config.context.execution_id.clone();
    info!(
        execution_id = %execution_id,
        sequence = sequence.name(),
        "Starting sequence"
    );

    let abort = AbortHandle::new();
    let inputs = InputBroker::new();
    let engine = ExecutionEngine::builder(sequence, config.context)
        .config(config.engine)
        .sink(Arc::new(JsonLinesSink::stdout()))
        .abort_handle(abort.clone())
        .input_broker(inputs.clone())
        .build();
    let emitter = engine.emitter().clone();

    let router = ControlRouter::new(execution_id, inputs, abort.clone());
    let control = control::spawn_router(control::stdin_lines(), router);

    let mut task = tokio::spawn(engine.execute());
    let status = tokio::select! {
        joined = &mut task => finish(joined, &emitter),
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupt received, aborting sequence");
            abort.abort(INTERRUPT_REASON);
            emitter.error("INTERRUPTED", INTERRUPT_REASON, None, false);

            tokio::select! {
                joined = &mut task => {
                    finish(joined, &emitter);
                }
                _ = tokio::signal::ctrl_c() => {
                    warn!("Second interrupt, abandoning teardown");
                    task.abort();
                }
            }
            ExitStatus::Error
        }
    };

    control.abort();
    status
}

fn load_config(cli: &Cli) -> anyhow::Result<RunConfig> {
    let mut config = RunConfig::load(cli.config.as_deref())?;
    config.apply_overrides(
        cli.hardware.as_deref(),
        cli.parameters.as_deref(),
        cli.execution_id.as_deref(),
    )?;
    Ok(config)
}

fn finish(joined: Result<RunResult, JoinError>, emitter: &OutputEmitter) -> ExitStatus {
    match joined {
        Ok(result) => {
            info!(passed = result.passed, duration = result.duration, "Sequence finished");
            result.exit_status()
        }
        Err(e) => {
            emitter.error("FATAL", format!("Engine task failed: {}", e), None, false);
            ExitStatus::Error
        }
    }
}

fn stdout_emitter(execution_id: &str) -> OutputEmitter {
    OutputEmitter::new(execution_id, EventBus::new()).with_sink(Arc::new(JsonLinesSink::stdout()))
}

fn report_error(execution_id: &str, code: &str, message: impl Into<String>) {
    stdout_emitter(execution_id).error(code, message, None, false);
}

fn print_control(message: &ControlMessage) {
    match serde_json::to_string(message) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!(error = %e, "Failed to serialize control message"),
    }
}

/// Diagnostics go to stderr; stdout carries only protocol events.
pub fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "station_cli=debug,sequencer=debug,events=debug"
    } else {
        "station_cli=info,sequencer=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use demo::PowerSupplyCheck;

    fn factory() -> Box<dyn Sequence> {
        Box::new(PowerSupplyCheck::new())
    }

    #[tokio::test]
    async fn test_dry_run_succeeds() {
        let cli = Cli::try_parse_from([
            "station-demo",
            "--start",
            "--dry-run",
            "--config",
            r#"{"execution_id": "dry00001"}"#,
        ])
        .unwrap();
        assert_eq!(run(cli, factory).await, ExitStatus::Pass);
    }

    #[tokio::test]
    async fn test_bad_config_is_an_error() {
        let cli = Cli::try_parse_from(["station-demo", "--start", "--config", "/missing/station.toml"])
            .unwrap();
        assert_eq!(run(cli, factory).await, ExitStatus::Error);
    }

    #[tokio::test]
    async fn test_stop_and_status_succeed() {
        let stop = Cli::try_parse_from(["station-demo", "--stop", "--execution-id", "abc"]).unwrap();
        assert_eq!(run(stop, factory).await, ExitStatus::Pass);

        let status = Cli::try_parse_from(["station-demo", "--status"]).unwrap();
        assert_eq!(run(status, factory).await, ExitStatus::Pass);
    }

    #[test]
    fn test_control_message_shapes() {
        let stop = ControlMessage::Command {
            action: CommandAction::Stop,
            execution_id: Some("abc".to_string()),
            reason: None,
        };
        assert_eq!(
            serde_json::to_value(&stop).unwrap(),
            serde_json::json!({"type": "command", "action": "stop", "execution_id": "abc"})
        );
    }
}
