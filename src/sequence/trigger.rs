//! # Sequence Triggers
//!
//! A trigger pairs a [`TriggerPolicy`] (when to fire) with a trigger runner: a
//! container holding the mini sequence to execute when it fires. Triggers are
//! evaluated between items, cascading from the innermost container to the root.

use async_trait::async_trait;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::container::SequenceContainer;
use super::entity::{EntityCore, EntityMetadata, SequenceEntity};
use crate::error::{SequenceError, SequenceResult};
use crate::logging::{log_entity_transition, log_error};
use crate::progress::{ProgressSink, SourcedProgress};
use crate::state_machine::{EntityEvent, EntityStatus};
use crate::validation::{skip_reason, Validatable, ValidationIssue};

/// Decides when a trigger fires and tracks the state it needs to do so
pub trait TriggerPolicy: Send + Sync {
    fn should_trigger(
        &self,
        previous: Option<&dyn SequenceEntity>,
        next: Option<&dyn SequenceEntity>,
    ) -> bool;

    /// Called once per firing, before the runner executes
    fn on_triggered(&self) {}

    fn block_initialize(&self) {}

    fn block_started(&self) {}

    fn block_finished(&self) {}

    fn block_teardown(&self) {}

    fn reset_progress(&self) {}

    fn clone_policy(&self) -> Box<dyn TriggerPolicy>;

    fn as_validatable(&self) -> Option<&dyn Validatable> {
        None
    }
}

pub struct SequenceTrigger {
    core: EntityCore,
    policy: Box<dyn TriggerPolicy>,
    runner: Arc<SequenceContainer>,
}

impl SequenceTrigger {
    /// Trigger with an empty sequential runner
    pub fn new(metadata: EntityMetadata, policy: impl TriggerPolicy + 'static) -> Self {
        let runner = SequenceContainer::sequential(EntityMetadata::new(format!(
            "{} runner",
            metadata.name
        )));
        Self::with_runner(metadata, Box::new(policy), runner)
    }

    pub fn with_runner(
        metadata: EntityMetadata,
        policy: Box<dyn TriggerPolicy>,
        runner: Arc<SequenceContainer>,
    ) -> Self {
        Self {
            core: EntityCore::new(metadata),
            policy,
            runner,
        }
    }

    pub fn runner(&self) -> &Arc<SequenceContainer> {
        &self.runner
    }

    pub fn policy(&self) -> &dyn TriggerPolicy {
        self.policy.as_ref()
    }

    /// Add an entity to the trigger runner
    pub fn add(&self, item: Arc<dyn SequenceEntity>) -> SequenceResult<()> {
        self.runner.add(item)
    }

    pub fn should_trigger(
        &self,
        previous: Option<&dyn SequenceEntity>,
        next: Option<&dyn SequenceEntity>,
    ) -> bool {
        self.policy.should_trigger(previous, next)
    }

    pub(crate) fn block_initialize(&self) {
        self.policy.block_initialize();
    }

    pub(crate) fn block_started(&self) {
        self.policy.block_started();
    }

    pub(crate) fn block_finished(&self) {
        self.policy.block_finished();
    }

    pub(crate) fn block_teardown(&self) {
        self.policy.block_teardown();
    }

    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        if let Some(validatable) = self.policy.as_validatable() {
            if !validatable.validate() {
                issues.push(ValidationIssue {
                    entity_id: self.core.id,
                    entity_name: self.name().to_string(),
                    issues: validatable.issues(),
                });
            }
        }
        issues.extend(self.runner.validate_all());
        issues
    }

    pub fn clone_trigger(&self) -> SequenceTrigger {
        SequenceTrigger {
            core: self.core.fresh_copy(),
            policy: self.policy.clone_policy(),
            runner: self.runner.clone_container(),
        }
    }

    /// Fire the trigger on behalf of `context`, the container that found it
    /// applicable. Blocks until the runner finishes.
    pub async fn execute(
        &self,
        context: &Arc<SequenceContainer>,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> SequenceResult<()> {
        self.fire(Arc::downgrade(context), progress, cancel).await
    }

    async fn fire(
        &self,
        host: Weak<SequenceContainer>,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> SequenceResult<()> {
        // A trigger fires many times per run, so every firing starts fresh
        self.core.state.try_transition(EntityEvent::Reset);
        self.core.state.try_transition(EntityEvent::Start);

        if let Some(validatable) = self.policy.as_validatable() {
            if !validatable.validate() {
                info!(
                    entity_id = %self.core.id,
                    entity_name = %self.name(),
                    reason = %skip_reason(&validatable.issues()),
                    "Trigger skipped"
                );
                self.core.state.try_transition(EntityEvent::Skip);
                return Ok(());
            }
        }

        self.policy.on_triggered();
        self.runner.reset_progress();
        self.runner.set_trigger_host(host);

        let sink = SourcedProgress::sink(self.name(), progress.clone());
        let local = self.core.begin_local_scope(cancel);
        let result = self.runner.run(&sink, &local).await;
        self.core.end_local_scope();
        self.runner.set_trigger_host(Weak::new());

        let outcome = match result {
            Ok(()) if self.runner.status() == EntityStatus::Failed => {
                self.core
                    .state
                    .try_transition(EntityEvent::fail_with_error("trigger runner failed"));
                Ok(())
            }
            Ok(()) => {
                self.core.state.try_transition(EntityEvent::Complete);
                Ok(())
            }
            Err(SequenceError::Cancelled) if !cancel.is_cancelled() => {
                self.core.state.try_transition(EntityEvent::Skip);
                Ok(())
            }
            Err(err) if err.is_unwinding() => {
                if matches!(err, SequenceError::Cancelled) {
                    self.core.state.try_transition(EntityEvent::Revert);
                } else {
                    self.core
                        .state
                        .try_transition(EntityEvent::fail_with_error(err.to_string()));
                }
                Err(err)
            }
            Err(err) => {
                log_error("sequence_trigger", "fire", &err.to_string(), Some(self.name()));
                self.core
                    .state
                    .try_transition(EntityEvent::fail_with_error(err.to_string()));
                Ok(())
            }
        };

        log_entity_transition("fire", self.core.id, self.name(), self.status(), None);
        outcome
    }
}

#[async_trait]
impl SequenceEntity for SequenceTrigger {
    fn id(&self) -> Uuid {
        self.core.id
    }

    fn metadata(&self) -> &EntityMetadata {
        &self.core.metadata
    }

    fn status(&self) -> EntityStatus {
        self.core.status()
    }

    fn parent(&self) -> Option<Arc<SequenceContainer>> {
        self.core.parent()
    }

    fn attach_new_parent(&self, parent: Weak<SequenceContainer>) {
        self.core.set_parent(parent);
    }

    fn detach(&self) {
        self.core.clear_parent();
    }

    fn estimated_duration(&self) -> Duration {
        self.runner.estimated_duration()
    }

    /// Fire unconditionally on behalf of the owning container
    async fn run(&self, progress: &ProgressSink, cancel: &CancellationToken) -> SequenceResult<()> {
        let host = self
            .core
            .parent()
            .map(|parent| Arc::downgrade(&parent))
            .unwrap_or_default();
        debug!(entity_name = %self.name(), "Running trigger directly");
        self.fire(host, progress, cancel).await
    }

    fn skip(&self) {
        if self.status().is_terminal() {
            return;
        }
        if self.core.state.try_transition(EntityEvent::Skip).is_some() {
            log_entity_transition("skip", self.core.id, self.name(), EntityStatus::Skipped, None);
        }
        self.core.cancel_local();
    }

    fn reset_progress(&self) {
        self.core.state.try_transition(EntityEvent::Reset);
        self.policy.reset_progress();
        self.runner.reset_progress();
    }

    fn revert_interrupted(&self) {
        self.core.revert_interrupted();
        self.runner.revert_interrupted();
        self.runner.set_trigger_host(Weak::new());
    }

    fn clone_entity(&self) -> Arc<dyn SequenceEntity> {
        Arc::new(self.clone_trigger())
    }

    fn as_validatable(&self) -> Option<&dyn Validatable> {
        self.policy.as_validatable()
    }
}

impl std::fmt::Debug for SequenceTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceTrigger")
            .field("id", &self.core.id)
            .field("name", &self.core.metadata.name)
            .field("status", &self.core.status())
            .field("runner", &self.runner)
            .finish()
    }
}
