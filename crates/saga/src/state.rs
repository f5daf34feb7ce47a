//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The state of a saga in its lifecycle.
///
/// State transitions:
/// ```text
/// NotStarted ──► Running ──┬──► Completed
///                  ▲  │    └──► Compensating ──► Failed
///                  │  ▼               ▲
///                Suspended ───────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// Saga has not started yet.
    #[default]
    NotStarted,

    /// Saga steps are being executed.
    Running,

    /// An async step yielded control and is awaiting an external signal
    /// or its timeout.
    Suspended,

    /// A step failed and compensating transactions are in progress.
    Compensating,

    /// All steps completed successfully (terminal state).
    Completed,

    /// Compensation finished after a failure (terminal state).
    Failed,
}

impl SagaState {
    /// Returns true if the saga can begin running.
    pub fn can_run(&self) -> bool {
        matches!(self, SagaState::NotStarted)
    }

    /// Returns true if the saga is in flight (running or parked).
    pub fn is_active(&self) -> bool {
        matches!(self, SagaState::Running | SagaState::Suspended)
    }

    /// Returns true if an async step can park the saga.
    pub fn can_suspend(&self) -> bool {
        matches!(self, SagaState::Running)
    }

    /// Returns true if a suspended saga can resume.
    pub fn can_resume(&self) -> bool {
        matches!(self, SagaState::Suspended)
    }

    /// Returns true if the saga can begin compensation.
    pub fn can_compensate(&self) -> bool {
        matches!(self, SagaState::Running | SagaState::Suspended)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Failed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::NotStarted => "NotStarted",
            SagaState::Running => "Running",
            SagaState::Suspended => "Suspended",
            SagaState::Compensating => "Compensating",
            SagaState::Completed => "Completed",
            SagaState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
