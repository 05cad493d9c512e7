//! Precondition validation for sequence entities.
//!
//! Items and triggers that depend on live equipment expose [`Validatable`].
//! A failed validation turns into a skip carrying the collected issues.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Validation collaborator contract
pub trait Validatable: Send + Sync {
    /// Re-evaluate preconditions, refreshing the issue list
    fn validate(&self) -> bool;

    /// Human-readable issues found by the last `validate` call
    fn issues(&self) -> Vec<String>;
}

/// Issue list that validatable implementations can embed
#[derive(Debug, Default)]
pub struct IssueList {
    issues: Mutex<Vec<String>>,
}

impl IssueList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored issues; returns true when the new list is empty
    pub fn replace(&self, issues: Vec<String>) -> bool {
        let valid = issues.is_empty();
        *self.issues.lock() = issues;
        valid
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.issues.lock().clone()
    }
}

/// Issues reported by one entity during a tree-wide validation pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub entity_id: Uuid,
    pub entity_name: String,
    pub issues: Vec<String>,
}

/// Message carried by the skip signal raised for a failed validation
pub fn skip_reason(issues: &[String]) -> String {
    if issues.is_empty() {
        "Validation failed".to_string()
    } else {
        issues.join(", ")
    }
}
