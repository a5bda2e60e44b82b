use serde::{Deserialize, Serialize};

/// Position of an engine in its single-use run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum EnginePhase {
    #[default]
    Created,
    Setup,
    Running,
    Teardown,
    Completed,
}

impl EnginePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Setup => "setup",
            Self::Running => "running",
            Self::Teardown => "teardown",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "setup" => Some(Self::Setup),
            "running" => Some(Self::Running),
            "teardown" => Some(Self::Teardown),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Sequence operation a failure is attributed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "typescript", derive(ts_rs::TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    Run,
    Teardown,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Run => "run",
            Self::Teardown => "teardown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "setup" => Some(Self::Setup),
            "run" => Some(Self::Run),
            "teardown" => Some(Self::Teardown),
            _ => None,
        }
    }

    /// Engine phase during which this operation executes.
    pub fn engine_phase(&self) -> EnginePhase {
        match self {
            Self::Setup => EnginePhase::Setup,
            Self::Run => EnginePhase::Running,
            Self::Teardown => EnginePhase::Teardown,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_phase_strings() {
        assert_eq!(EnginePhase::Running.as_str(), "running");
        assert_eq!(EnginePhase::parse("teardown"), Some(EnginePhase::Teardown));
        assert_eq!(EnginePhase::parse("run"), None);
        assert_eq!(EnginePhase::default(), EnginePhase::Created);
    }

    #[test]
    fn test_phase_maps_to_engine_phase() {
        assert_eq!(Phase::Run.engine_phase(), EnginePhase::Running);
        assert_eq!(Phase::Setup.to_string(), "setup");
        assert_eq!(Phase::parse("run"), Some(Phase::Run));
    }

    #[test]
    fn test_phase_serialization() {
        let json = serde_json::to_string(&EnginePhase::Teardown).unwrap();
        assert_eq!(json, "\"teardown\"");
        assert!(EnginePhase::Completed.is_terminal());
    }
}
