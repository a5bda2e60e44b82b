use clap::{ArgGroup, Parser};

/// Command line of a station sequence executable.
#[derive(Debug, Parser)]
#[command(version, about = "Run a station test sequence", long_about = None)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["start", "stop", "status"]),
))]
pub struct Cli {
    /// Execute the sequence
    #[arg(long)]
    pub start: bool,

    /// Ask a running execution to stop
    #[arg(long)]
    pub stop: bool,

    /// Request the status of an execution
    #[arg(long)]
    pub status: bool,

    /// Run configuration: inline JSON, or a path to a .json or .toml file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Hardware configuration as a JSON object; replaces the config's
    #[arg(long)]
    pub hardware: Option<String>,

    /// Sequence parameters as a JSON object; replaces the config's
    #[arg(long)]
    pub parameters: Option<String>,

    #[arg(long)]
    pub execution_id: Option<String>,

    /// Validate the configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Debug-level diagnostics on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Stop,
    Status,
}

impl Cli {
    pub fn action(&self) -> Action {
        if self.stop {
            Action::Stop
        } else if self.status {
            Action::Status
        } else {
            Action::Start
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_with_overrides() {
        let cli = Cli::try_parse_from([
            "station-demo",
            "--start",
            "--config",
            r#"{"wip_id": "WIP-1"}"#,
            "--parameters",
            r#"{"target_voltage": 5.0}"#,
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(cli.action(), Action::Start);
        assert!(cli.dry_run);
        assert_eq!(cli.config.as_deref(), Some(r#"{"wip_id": "WIP-1"}"#));
    }

    #[test]
    fn test_action_required() {
        assert!(Cli::try_parse_from(["station-demo"]).is_err());
    }

    #[test]
    fn test_actions_are_exclusive() {
        assert!(Cli::try_parse_from(["station-demo", "--start", "--stop"]).is_err());
    }

    #[test]
    fn test_stop_action() {
        let cli =
            Cli::try_parse_from(["station-demo", "--stop", "--execution-id", "abc12345"]).unwrap();
        assert_eq!(cli.action(), Action::Stop);
        assert_eq!(cli.execution_id.as_deref(), Some("abc12345"));
    }
}
