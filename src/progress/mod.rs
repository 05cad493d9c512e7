//! # Progress Reporting
//!
//! The progress sink is the only object shared across concurrently running
//! branches of a sequence. Reporters must therefore be `Send + Sync` and treat
//! reports as an append-only stream.

pub mod publisher;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use publisher::{ProgressPublisher, PublishedProgress};

/// A single status line reported by a running entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationStatus {
    /// Who is reporting; filled in by parallel branches when left empty
    pub source: String,
    pub status: String,
    pub progress: Option<f64>,
    pub max_progress: Option<f64>,
}

impl ApplicationStatus {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_progress(mut self, progress: f64, max_progress: f64) -> Self {
        self.progress = Some(progress);
        self.max_progress = Some(max_progress);
        self
    }

    /// The "clear the last status line" update emitted when a node finishes
    pub fn is_empty(&self) -> bool {
        self.status.is_empty() && self.progress.is_none()
    }
}

/// Sink for progress updates
pub trait ProgressReporter: Send + Sync {
    fn report(&self, status: ApplicationStatus);
}

pub type ProgressSink = Arc<dyn ProgressReporter>;

/// Discards every report
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressReporter for NullProgress {
    fn report(&self, _status: ApplicationStatus) {}
}

impl NullProgress {
    pub fn sink() -> ProgressSink {
        Arc::new(Self)
    }
}

/// Tags every report that carries no source with a fixed one.
///
/// Used by the parallel strategy so concurrent status lines stay attributable
/// to the branch that produced them.
pub struct SourcedProgress {
    source: String,
    inner: ProgressSink,
}

impl SourcedProgress {
    pub fn new(source: impl Into<String>, inner: ProgressSink) -> Self {
        Self {
            source: source.into(),
            inner,
        }
    }

    pub fn sink(source: impl Into<String>, inner: ProgressSink) -> ProgressSink {
        Arc::new(Self::new(source, inner))
    }
}

impl ProgressReporter for SourcedProgress {
    fn report(&self, mut status: ApplicationStatus) {
        if status.source.is_empty() {
            status.source = self.source.clone();
        }
        self.inner.report(status);
    }
}

/// Keeps every report in memory, in arrival order
#[derive(Debug, Default)]
pub struct CollectingProgress {
    reports: Mutex<Vec<ApplicationStatus>>,
}

impl CollectingProgress {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self) -> Vec<ApplicationStatus> {
        self.reports.lock().clone()
    }

    /// Reports with a non-empty status line
    pub fn status_lines(&self) -> Vec<ApplicationStatus> {
        self.reports
            .lock()
            .iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect()
    }
}

impl ProgressReporter for CollectingProgress {
    fn report(&self, status: ApplicationStatus) {
        self.reports.lock().push(status);
    }
}
