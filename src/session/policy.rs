//! Pure steady-loop policy
//!
//! Decides what one loop iteration does with a drive outcome and how a
//! publish failure is treated per delivery tier. Failure tolerance is
//! asymmetric: the at-most-once publish masks every failure, the
//! at-least-once publish masks only the acknowledgment timeout.

use crate::session::connection::{SessionError, SessionStatus};
use crate::session::message::QosLevel;

/// What the steady loop does after a drive pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopDirective {
    /// Publish this iteration's telemetry pair.
    Publish,
    /// Skip publishing; the transport is recovering the session.
    SkipPublish,
    /// End the loop and escalate to the supervisor.
    Terminate,
}

/// Map a drive outcome to a loop directive.
pub fn directive_for(status: &SessionStatus) -> LoopDirective {
    match status {
        SessionStatus::Success | SessionStatus::Reconnected => LoopDirective::Publish,
        SessionStatus::ReconnectInProgress => LoopDirective::SkipPublish,
        SessionStatus::Failed(_) => LoopDirective::Terminate,
    }
}

/// How a publish failure is treated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishFailureAction {
    /// Log and move on; the loop keeps running.
    Tolerate,
    /// End the loop; the failure escalates as fatal.
    Escalate,
}

/// Classify a publish failure for the given tier.
pub fn failure_action(tier: QosLevel, error: &SessionError) -> PublishFailureAction {
    match tier {
        QosLevel::AtMostOnce => PublishFailureAction::Tolerate,
        QosLevel::AtLeastOnce => match error {
            SessionError::AckTimeout { .. } => PublishFailureAction::Tolerate,
            _ => PublishFailureAction::Escalate,
        },
    }
}
