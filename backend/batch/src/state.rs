//! The upload batch state machine (spec.md §4.H):
//! `QUEUED -> PARSING -> VALIDATING -> PROCESSING -> {COMPLETED | FAILED |
//! WAITING_FOR_APPROVAL | CANCELED}`, plus `WAITING_FOR_APPROVAL -> PROCESSING`
//! on entity approval and `* -> CANCELED` while still queued or parsing.

use model::ProcessingStatus as Status;

pub fn can_transition(from: Status, to: Status) -> bool {
    use Status::*;
    matches!(
        (from, to),
        (Queued, Parsing)
            | (Queued, Canceled)
            | (Parsing, Validating)
            | (Parsing, Failed)
            | (Parsing, Canceled)
            | (Validating, Processing)
            | (Validating, Failed)
            | (Validating, WaitingForApproval)
            | (Validating, Canceled)
            | (WaitingForApproval, Processing)
            | (WaitingForApproval, Canceled)
            | (WaitingForApproval, Failed)
            | (Processing, Completed)
            | (Processing, Failed)
    )
}

pub fn is_terminal(status: Status) -> bool {
    matches!(status, Status::Completed | Status::Failed | Status::Canceled)
}

/// Batches are rollback-eligible from any non-terminal state, and from
/// `COMPLETED` within the operator rollback window — the caller enforces
/// the window, this just excludes the states rollback can never apply to.
pub fn is_rollback_eligible(status: Status) -> bool {
    !matches!(status, Status::Canceled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::ProcessingStatus::*;

    #[test]
    fn happy_path_is_allowed() {
        assert!(can_transition(Queued, Parsing));
        assert!(can_transition(Parsing, Validating));
        assert!(can_transition(Validating, Processing));
        assert!(can_transition(Processing, Completed));
    }

    #[test]
    fn approval_gate_resumes_into_processing() {
        assert!(can_transition(Validating, WaitingForApproval));
        assert!(can_transition(WaitingForApproval, Processing));
    }

    #[test]
    fn terminal_states_have_no_outbound_transitions() {
        for terminal in [Completed, Failed, Canceled] {
            for to in [Queued, Parsing, Validating, Processing, Completed, Failed, WaitingForApproval, Canceled] {
                assert!(!can_transition(terminal, to), "{terminal:?} -> {to:?} should be rejected");
            }
        }
    }

    #[test]
    fn cannot_skip_validating() {
        assert!(!can_transition(Parsing, Processing));
        assert!(!can_transition(Queued, Processing));
    }
}
