use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status shared by items, containers and triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    /// Initial state, and the state a node reverts to when a run is cancelled
    #[default]
    Created,
    /// The node's `run` is in flight
    Running,
    /// The node completed without error
    Finished,
    /// The node's action raised an error
    Failed,
    /// The node was skipped, either by precondition or by a local skip request
    Skipped,
}

impl EntityStatus {
    /// Check if this is a terminal state (the node will not run again until reset)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Skipped)
    }

    /// Check if this is an active state (node is being processed)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Check if the node is still waiting to be run
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Created)
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Finished => write!(f, "finished"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl std::str::FromStr for EntityStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "running" => Ok(Self::Running),
            "finished" => Ok(Self::Finished),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            _ => Err(format!("Invalid entity status: {s}")),
        }
    }
}
