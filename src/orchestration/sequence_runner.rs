use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ConfigManager, EngineConfig};
use crate::error::{SequenceError, SequenceResult};
use crate::logging::init_structured_logging;
use crate::progress::{ProgressPublisher, ProgressSink, PublishedProgress};
use crate::sequence::{RunningItem, SequenceContainer, SequenceEntity};
use crate::state_machine::EntityStatus;
use crate::validation::ValidationIssue;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    /// The run was cancelled; calling `run` again resumes it
    Cancelled,
    Aborted { entity: String, reason: String },
}

/// Number of leaf items per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub created: usize,
    pub running: usize,
    pub finished: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StatusCounts {
    /// Count the leaves below `container`, trigger runners excluded
    pub fn collect(container: &SequenceContainer) -> Self {
        let mut counts = Self::default();
        counts.add_leaves(container);
        counts
    }

    fn add_leaves(&mut self, container: &SequenceContainer) {
        for item in container.items() {
            match item.as_container() {
                Some(inner) => self.add_leaves(inner),
                None => self.record(item.status()),
            }
        }
    }

    fn record(&mut self, status: EntityStatus) {
        match status {
            EntityStatus::Created => self.created += 1,
            EntityStatus::Running => self.running += 1,
            EntityStatus::Finished => self.finished += 1,
            EntityStatus::Failed => self.failed += 1,
            EntityStatus::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.running + self.finished + self.failed + self.skipped
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub root_status: EntityStatus,
    pub root_iterations: u32,
    pub counts: StatusCounts,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

pub struct SequenceRunner {
    root: Arc<SequenceContainer>,
    config: Arc<ConfigManager>,
    publisher: ProgressPublisher,
    run_token: Mutex<Option<CancellationToken>>,
}

impl SequenceRunner {
    pub fn new(root: Arc<SequenceContainer>, config: Arc<ConfigManager>) -> Self {
        let engine = config.config();
        init_structured_logging(&engine.logging);
        root.set_default_error_behavior(engine.error_behavior);
        let publisher = ProgressPublisher::new(engine.progress_channel_capacity);

        Self {
            root,
            config,
            publisher,
            run_token: Mutex::new(None),
        }
    }

    /// Runner with the built-in default configuration
    pub fn with_defaults(root: Arc<SequenceContainer>) -> SequenceResult<Self> {
        let config = ConfigManager::from_config(EngineConfig::default())?;
        Ok(Self::new(root, config))
    }

    pub fn root(&self) -> &Arc<SequenceContainer> {
        &self.root
    }

    pub fn config(&self) -> &EngineConfig {
        self.config.config()
    }

    /// Receive every progress report published during runs
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedProgress> {
        self.publisher.subscribe()
    }

    /// Validate every validatable item and trigger in the tree
    pub fn validate(&self) -> Vec<ValidationIssue> {
        self.root.validate_all()
    }

    pub fn is_running(&self) -> bool {
        self.run_token.lock().is_some()
    }

    pub fn running_items(&self) -> Vec<RunningItem> {
        self.root.running_items()
    }

    /// Run the tree until it finishes, is cancelled or aborts.
    ///
    /// After a cancellation the interrupted nodes are back in `Created`, so
    /// calling `run` again resumes where the previous run stopped.
    pub async fn run(&self) -> SequenceResult<RunSummary> {
        let mut active = self.begin_run()?;

        info!(
            root = %self.root.name(),
            environment = %self.config.environment(),
            error_behavior = ?self.config().error_behavior,
            "Starting sequence run"
        );
        let started = Instant::now();
        let sink: ProgressSink = Arc::new(self.publisher.clone());
        let result = self.root.run(&sink, &active.token).await;
        active.settled = true;
        drop(active);

        let outcome = match result {
            Ok(()) => RunOutcome::Completed,
            Err(SequenceError::Cancelled) => RunOutcome::Cancelled,
            Err(SequenceError::Aborted { entity, reason }) => RunOutcome::Aborted { entity, reason },
            Err(other) => return Err(other),
        };

        let summary = RunSummary {
            outcome,
            root_status: self.root.status(),
            root_iterations: self.root.iterations(),
            counts: StatusCounts::collect(&self.root),
            elapsed: started.elapsed(),
        };
        info!(
            root = %self.root.name(),
            outcome = ?summary.outcome,
            finished = summary.counts.finished,
            failed = summary.counts.failed,
            skipped = summary.counts.skipped,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Sequence run ended"
        );
        Ok(summary)
    }

    fn begin_run(&self) -> SequenceResult<ActiveRun<'_>> {
        let mut slot = self.run_token.lock();
        if slot.is_some() {
            return Err(SequenceError::InvalidOperation(format!(
                "sequence '{}' is already running",
                self.root.name()
            )));
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        Ok(ActiveRun {
            runner: self,
            token,
            settled: false,
        })
    }

    /// Request run-wide cancellation. Returns false when nothing is running.
    pub fn cancel(&self) -> bool {
        match self.run_token.lock().as_ref() {
            Some(token) => {
                info!(root = %self.root.name(), "Cancelling sequence run");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Return the whole tree to `Created` so it can run from the start
    pub fn reset(&self) -> SequenceResult<()> {
        if self.is_running() {
            warn!(root = %self.root.name(), "Refusing to reset a running sequence");
            return Err(SequenceError::InvalidOperation(
                "cannot reset a sequence while it is running".to_string(),
            ));
        }
        self.root.reset_progress();
        Ok(())
    }
}

/// Releases the runner's in-flight slot however `run` ends. When the run
/// future is dropped mid-run, the run is cancelled and the nodes it left
/// `Running` go back to `Created`, so the next `run` resumes.
struct ActiveRun<'a> {
    runner: &'a SequenceRunner,
    token: CancellationToken,
    settled: bool,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(
                root = %self.runner.root.name(),
                "Sequence run dropped before it ended, reverting in-flight nodes"
            );
            self.token.cancel();
            self.runner.root.revert_interrupted();
        }
        self.runner.run_token.lock().take();
    }
}
