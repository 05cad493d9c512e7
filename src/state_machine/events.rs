use serde::{Deserialize, Serialize};

/// Events that drive entity status transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EntityEvent {
    /// `run` was invoked
    Start,
    /// The action completed
    Complete,
    /// Precondition failure, local cancellation or an external `skip`
    Skip,
    /// The action raised an error
    Fail(String),
    /// Run-wide cancellation observed while running
    Revert,
    /// Explicit reset so the node can run again (loop iteration, trigger re-fire)
    Reset,
}

impl EntityEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Skip => "skip",
            Self::Fail(_) => "fail",
            Self::Revert => "revert",
            Self::Reset => "reset",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}
