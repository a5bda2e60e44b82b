use station_core::{CoreError, EnginePhase, Result};

/// Allowed moves of an engine through its single run.
///
/// Failure is not a phase: a failed setup jumps straight to teardown, and
/// every run ends in `Completed`.
pub struct PhaseStateMachine;

impl PhaseStateMachine {
    pub fn validate_transition(from: &EnginePhase, to: &EnginePhase) -> Result<()> {
        let allowed = Self::allowed_transitions(from);

        if allowed.contains(to) {
            Ok(())
        } else {
            Err(CoreError::InvalidPhaseTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    fn allowed_transitions(from: &EnginePhase) -> Vec<EnginePhase> {
        match from {
            EnginePhase::Created => vec![EnginePhase::Setup],
            EnginePhase::Setup => vec![EnginePhase::Running, EnginePhase::Teardown],
            EnginePhase::Running => vec![EnginePhase::Teardown],
            EnginePhase::Teardown => vec![EnginePhase::Completed],
            EnginePhase::Completed => vec![],
        }
    }

    pub fn can_transition(from: &EnginePhase, to: &EnginePhase) -> bool {
        Self::validate_transition(from, to).is_ok()
    }

    /// Successor on the success path.
    pub fn next_phase(current: &EnginePhase) -> Option<EnginePhase> {
        match current {
            EnginePhase::Created => Some(EnginePhase::Setup),
            EnginePhase::Setup => Some(EnginePhase::Running),
            EnginePhase::Running => Some(EnginePhase::Teardown),
            EnginePhase::Teardown => Some(EnginePhase::Completed),
            EnginePhase::Completed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(PhaseStateMachine::can_transition(
            &EnginePhase::Created,
            &EnginePhase::Setup
        ));
        assert!(PhaseStateMachine::can_transition(
            &EnginePhase::Setup,
            &EnginePhase::Running
        ));
        assert!(PhaseStateMachine::can_transition(
            &EnginePhase::Running,
            &EnginePhase::Teardown
        ));
        assert!(PhaseStateMachine::can_transition(
            &EnginePhase::Teardown,
            &EnginePhase::Completed
        ));
    }

    #[test]
    fn test_setup_failure_skips_run() {
        assert!(PhaseStateMachine::can_transition(
            &EnginePhase::Setup,
            &EnginePhase::Teardown
        ));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!PhaseStateMachine::can_transition(
            &EnginePhase::Created,
            &EnginePhase::Running
        ));
        assert!(!PhaseStateMachine::can_transition(
            &EnginePhase::Running,
            &EnginePhase::Completed
        ));
        assert!(!PhaseStateMachine::can_transition(
            &EnginePhase::Completed,
            &EnginePhase::Setup
        ));

        let err =
            PhaseStateMachine::validate_transition(&EnginePhase::Teardown, &EnginePhase::Running)
                .unwrap_err();
        assert!(err.to_string().contains("teardown"));
    }

    #[test]
    fn test_next_phase() {
        assert_eq!(
            PhaseStateMachine::next_phase(&EnginePhase::Created),
            Some(EnginePhase::Setup)
        );
        assert_eq!(PhaseStateMachine::next_phase(&EnginePhase::Completed), None);
    }
}
