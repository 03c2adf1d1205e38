// Session phase state machine with validation

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Phase of an agent session.
///
/// Phases are ordered; a session only ever moves to the next phase in the
/// pipeline or to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Initializing,
    AnalyzingEnvironment,
    PreparingTask,
    ExecutingCore,
    AssuringQuality,
    PreparingIntegration,
    Completed,
    Failed,
}

impl SessionPhase {
    /// The success pipeline, in order
    pub const PIPELINE: [SessionPhase; 7] = [
        SessionPhase::Initializing,
        SessionPhase::AnalyzingEnvironment,
        SessionPhase::PreparingTask,
        SessionPhase::ExecutingCore,
        SessionPhase::AssuringQuality,
        SessionPhase::PreparingIntegration,
        SessionPhase::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Initializing => "initializing",
            SessionPhase::AnalyzingEnvironment => "analyzing_environment",
            SessionPhase::PreparingTask => "preparing_task",
            SessionPhase::ExecutingCore => "executing_core",
            SessionPhase::AssuringQuality => "assuring_quality",
            SessionPhase::PreparingIntegration => "preparing_integration",
            SessionPhase::Completed => "completed",
            SessionPhase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateTransitionError {
    #[error("Invalid phase transition from {from} to {to}")]
    InvalidTransition {
        from: SessionPhase,
        to: SessionPhase,
    },

    #[error("Session already in terminal phase: {0}")]
    AlreadyTerminal(SessionPhase),
}

/// Validates if a session can move from one phase to another
pub fn can_transition(from: SessionPhase, to: SessionPhase) -> bool {
    if is_terminal_state(from) {
        return false;
    }

    match to {
        // Any live phase can fail
        SessionPhase::Failed => true,
        // Otherwise only the next pipeline phase is reachable
        _ => next_state(from) == Some(to),
    }
}

/// Validates and performs a phase transition
pub fn transition_state(
    current: SessionPhase,
    target: SessionPhase,
) -> Result<SessionPhase, StateTransitionError> {
    if is_terminal_state(current) {
        return Err(StateTransitionError::AlreadyTerminal(current));
    }

    if !can_transition(current, target) {
        return Err(StateTransitionError::InvalidTransition {
            from: current,
            to: target,
        });
    }

    Ok(target)
}

/// Check if a phase is terminal
pub fn is_terminal_state(phase: SessionPhase) -> bool {
    matches!(phase, SessionPhase::Completed | SessionPhase::Failed)
}

/// Get the next pipeline phase, `None` for terminal phases
pub fn next_state(current: SessionPhase) -> Option<SessionPhase> {
    match current {
        SessionPhase::Initializing => Some(SessionPhase::AnalyzingEnvironment),
        SessionPhase::AnalyzingEnvironment => Some(SessionPhase::PreparingTask),
        SessionPhase::PreparingTask => Some(SessionPhase::ExecutingCore),
        SessionPhase::ExecutingCore => Some(SessionPhase::AssuringQuality),
        SessionPhase::AssuringQuality => Some(SessionPhase::PreparingIntegration),
        SessionPhase::PreparingIntegration => Some(SessionPhase::Completed),
        SessionPhase::Completed | SessionPhase::Failed => None,
    }
}

/// Get all valid next phases from the current phase
pub fn valid_next_states(current: SessionPhase) -> Vec<SessionPhase> {
    SessionPhase::PIPELINE
        .iter()
        .copied()
        .chain(std::iter::once(SessionPhase::Failed))
        .filter(|&phase| can_transition(current, phase))
        .collect()
}
