//! Round status transition rules
//!
//! The allowed transitions form a small DAG with COMPLETED terminal:
//!
//! ```text
//! SCHEDULED → READY       (pre-flight: ready)
//! SCHEDULED → BLOCKED     (pre-flight: blocked; or explicit cancel)
//! READY     → BLOCKED     (late warning-stage verification fails)
//! READY     → LAUNCHING   (launch initiated)
//! LAUNCHING → SENT        (launch succeeded)
//! LAUNCHING → SCHEDULED   (launch failed; manual re-verify required)
//! SENT      → COMPLETED   (wrap-up succeeded)
//! BLOCKED   → SCHEDULED   (explicit unblock)
//! ```

use crate::error::{EngineError, EngineResult};
use crate::schedule::RoundStatus;

/// Whether `from → to` is an allowed transition
pub fn is_allowed(from: RoundStatus, to: RoundStatus) -> bool {
    use RoundStatus::*;
    matches!(
        (from, to),
        (Scheduled, Ready)
            | (Scheduled, Blocked)
            | (Ready, Blocked)
            | (Ready, Launching)
            | (Launching, Sent)
            | (Launching, Scheduled)
            | (Sent, Completed)
            | (Blocked, Scheduled)
    )
}

/// Validate a transition, returning a state error on a forbidden edge.
///
/// A forbidden edge indicates a logic bug or a race; callers log it at error
/// level and surface it without retry.
pub fn check_transition(from: RoundStatus, to: RoundStatus) -> EngineResult<()> {
    if is_allowed(from, to) {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const ALL: [RoundStatus; 6] = [
        RoundStatus::Scheduled,
        RoundStatus::Ready,
        RoundStatus::Launching,
        RoundStatus::Sent,
        RoundStatus::Completed,
        RoundStatus::Blocked,
    ];

    #[test_case(RoundStatus::Scheduled, RoundStatus::Ready)]
    #[test_case(RoundStatus::Scheduled, RoundStatus::Blocked)]
    #[test_case(RoundStatus::Ready, RoundStatus::Launching)]
    #[test_case(RoundStatus::Launching, RoundStatus::Sent)]
    #[test_case(RoundStatus::Launching, RoundStatus::Scheduled)]
    #[test_case(RoundStatus::Sent, RoundStatus::Completed)]
    #[test_case(RoundStatus::Blocked, RoundStatus::Scheduled)]
    fn allowed_edges(from: RoundStatus, to: RoundStatus) {
        check_transition(from, to).unwrap();
    }

    #[test]
    fn completed_is_terminal() {
        for to in ALL {
            assert!(!is_allowed(RoundStatus::Completed, to));
        }
    }

    #[test]
    fn no_self_edges() {
        for status in ALL {
            assert!(!is_allowed(status, status));
        }
    }

    #[test]
    fn launch_requires_ready() {
        assert!(!is_allowed(RoundStatus::Scheduled, RoundStatus::Launching));
        assert!(!is_allowed(RoundStatus::Blocked, RoundStatus::Launching));
        assert!(!is_allowed(RoundStatus::Sent, RoundStatus::Launching));
    }
}
