//! Session state machine transition table (§3).

use crate::error::RtError;
use crate::types::SessionState;

/// Validate a proposed state transition. `idle -> connecting -> started ->
/// draining -> closed` is the happy path; `failed` is reachable from any
/// non-terminal state, and both `failed`/`closed` are absorbing.
pub fn validate_transition(current: SessionState, next: SessionState) -> Result<(), RtError> {
    use SessionState::*;

    if current.is_terminal() {
        return Err(RtError::InvalidState(format!(
            "session already {current:?}, cannot transition to {next:?}"
        )));
    }

    let allowed = match (current, next) {
        (Idle, Connecting) => true,
        (Connecting, Started) => true,
        (Started, Draining) => true,
        (Draining, Closed) => true,
        (_, Failed) => true,
        (_, Closed) => true,
        _ => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(RtError::InvalidState(format!(
            "illegal transition {current:?} -> {next:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    #[test]
    fn happy_path_transitions_are_allowed() {
        assert!(validate_transition(Idle, Connecting).is_ok());
        assert!(validate_transition(Connecting, Started).is_ok());
        assert!(validate_transition(Started, Draining).is_ok());
        assert!(validate_transition(Draining, Closed).is_ok());
    }

    #[test]
    fn failed_reachable_from_any_non_terminal_state() {
        assert!(validate_transition(Connecting, Failed).is_ok());
        assert!(validate_transition(Started, Failed).is_ok());
        assert!(validate_transition(Draining, Failed).is_ok());
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        assert!(validate_transition(Closed, Connecting).is_err());
        assert!(validate_transition(Failed, Started).is_err());
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        assert!(validate_transition(Idle, Started).is_err());
        assert!(validate_transition(Connecting, Draining).is_err());
    }
}
