use thiserror::Error;

/// Error types for state machine operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateMachineError {
    #[error("Invalid state transition from {from} on event {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for state machine operations
pub type StateMachineResult<T> = Result<T, StateMachineError>;

