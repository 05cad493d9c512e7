//! Error types for the sequence engine.
//!
//! Two layers exist: [`ActionError`] is what a user-supplied action reports back
//! to the item that runs it, and [`SequenceError`] is what escapes a node's `run`.
//! Only run-wide cancellation and an explicit abort ever cross a node boundary.

use thiserror::Error;

use crate::state_machine::errors::StateMachineError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SequenceError {
    /// The run-wide cancellation token fired. Nodes that were in flight have
    /// reverted to `Created` so a later run picks them up again.
    #[error("Sequence run was cancelled")]
    Cancelled,
    /// An item configured with `ErrorBehavior::AbortRun` failed.
    #[error("Sequence aborted by {entity}: {reason}")]
    Aborted { entity: String, reason: String },
    #[error("State transition error: {0}")]
    StateTransition(String),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SequenceError {
    /// True for the errors that unwind every enclosing loop and join.
    pub fn is_unwinding(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Aborted { .. })
    }

    pub fn aborted(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Aborted {
            entity: entity.into(),
            reason: reason.into(),
        }
    }
}

impl From<StateMachineError> for SequenceError {
    fn from(err: StateMachineError) -> Self {
        SequenceError::StateTransition(err.to_string())
    }
}

impl From<crate::config::ConfigurationError> for SequenceError {
    fn from(err: crate::config::ConfigurationError) -> Self {
        SequenceError::Configuration(err.to_string())
    }
}

pub type SequenceResult<T> = std::result::Result<T, SequenceError>;

/// Outcome signals an action may raise while executing.
#[derive(Debug, Error)]
pub enum ActionError {
    /// Deliberate skip: a precondition was not met or there is nothing to do.
    #[error("Skipped: {reason}")]
    Skipped { reason: String },
    /// The action observed its cancellation token and stopped.
    #[error("Action was cancelled")]
    Cancelled,
    /// Any other failure.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl ActionError {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(anyhow::anyhow!(message.into()))
    }
}

pub type ActionResult<T> = std::result::Result<T, ActionError>;
