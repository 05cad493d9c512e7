//! # Sequence Containers
//!
//! A [`SequenceContainer`] is the composite node of the sequence tree. It holds
//! an ordered list of children plus the conditions and triggers attached to it,
//! and delegates the iteration itself to an injected [`ExecutionStrategy`].
//!
//! Children keep only a weak back-reference to the container. The container
//! keeps a weak reference to itself so it can hand that link out when
//! children are attached.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::condition::SequenceCondition;
use super::entity::{EntityCore, EntityMetadata, SequenceEntity};
use super::trigger::SequenceTrigger;
use crate::config::ErrorBehavior;
use crate::error::{SequenceError, SequenceResult};
use crate::execution::{ExecutionStrategy, ParallelStrategy, SequentialStrategy};
use crate::logging::{log_entity_transition, log_error};
use crate::progress::ProgressSink;
use crate::state_machine::{EntityEvent, EntityStatus};
use crate::validation::ValidationIssue;

/// Entry of the root's in-flight registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningItem {
    pub id: Uuid,
    pub name: String,
    pub started_at: DateTime<Utc>,
}

pub struct SequenceContainer {
    core: EntityCore,
    self_ref: Weak<SequenceContainer>,
    items: RwLock<Vec<Arc<dyn SequenceEntity>>>,
    conditions: RwLock<Vec<Arc<dyn SequenceCondition>>>,
    triggers: RwLock<Vec<Arc<SequenceTrigger>>>,
    iterations: AtomicU32,
    strategy: Box<dyn ExecutionStrategy>,
    running_items: DashMap<Uuid, RunningItem>,
    default_error_behavior: RwLock<Option<ErrorBehavior>>,
    /// Container a trigger runner is currently executing on behalf of
    trigger_host: RwLock<Weak<SequenceContainer>>,
}

impl SequenceContainer {
    pub fn new(metadata: EntityMetadata, strategy: Box<dyn ExecutionStrategy>) -> Arc<Self> {
        Self::with_core(EntityCore::new(metadata), strategy)
    }

    /// Children run one after another, looping while conditions allow
    pub fn sequential(metadata: EntityMetadata) -> Arc<Self> {
        Self::new(metadata, Box::new(SequentialStrategy))
    }

    /// Children run concurrently, once
    pub fn parallel(metadata: EntityMetadata) -> Arc<Self> {
        Self::new(metadata, Box::new(ParallelStrategy))
    }

    fn with_core(core: EntityCore, strategy: Box<dyn ExecutionStrategy>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            core,
            self_ref: self_ref.clone(),
            items: RwLock::new(Vec::new()),
            conditions: RwLock::new(Vec::new()),
            triggers: RwLock::new(Vec::new()),
            iterations: AtomicU32::new(0),
            strategy,
            running_items: DashMap::new(),
            default_error_behavior: RwLock::new(None),
            trigger_host: RwLock::new(Weak::new()),
        })
    }

    // ----- children -----

    /// Append a child and attach it to this container
    pub fn add(&self, item: Arc<dyn SequenceEntity>) -> SequenceResult<()> {
        let index = self.items.read().len();
        self.insert(index, item)
    }

    /// Insert a child at `index` (clamped to the end) and attach it
    pub fn insert(&self, index: usize, item: Arc<dyn SequenceEntity>) -> SequenceResult<()> {
        self.check_attachable(item.as_ref())?;

        item.attach_new_parent(self.self_ref.clone());
        let mut items = self.items.write();
        let index = index.min(items.len());
        items.insert(index, item);
        Ok(())
    }

    /// Remove a child by id, clearing its parent link
    pub fn remove(&self, id: Uuid) -> Option<Arc<dyn SequenceEntity>> {
        let removed = {
            let mut items = self.items.write();
            let position = items.iter().position(|item| item.id() == id)?;
            items.remove(position)
        };
        removed.detach();
        Some(removed)
    }

    /// Snapshot of the children in iteration order
    pub fn items(&self) -> Vec<Arc<dyn SequenceEntity>> {
        self.items.read().clone()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    fn check_attachable(&self, item: &dyn SequenceEntity) -> SequenceResult<()> {
        if let Some(current) = item.parent() {
            if current.id() != self.id() {
                return Err(SequenceError::InvalidOperation(format!(
                    "'{}' already belongs to '{}'; detach it first",
                    item.name(),
                    current.name()
                )));
            }
            if self.items.read().iter().any(|child| child.id() == item.id()) {
                return Err(SequenceError::InvalidOperation(format!(
                    "'{}' is already a child of '{}'",
                    item.name(),
                    self.name()
                )));
            }
        }

        // Attaching an ancestor (or ourselves) would create a cycle
        if item.as_container().is_some() {
            let mut cursor = self.self_ref.upgrade();
            while let Some(container) = cursor {
                if container.id() == item.id() {
                    return Err(SequenceError::InvalidOperation(format!(
                        "adding '{}' to '{}' would create a cycle",
                        item.name(),
                        self.name()
                    )));
                }
                cursor = container.parent();
            }
        }

        Ok(())
    }

    // ----- conditions and triggers -----

    pub fn add_condition(&self, condition: impl SequenceCondition + 'static) {
        self.conditions.write().push(Arc::new(condition));
    }

    pub fn conditions(&self) -> Vec<Arc<dyn SequenceCondition>> {
        self.conditions.read().clone()
    }

    pub fn clear_conditions(&self) {
        self.conditions.write().clear();
    }

    pub fn add_trigger(&self, trigger: SequenceTrigger) -> Arc<SequenceTrigger> {
        trigger.attach_new_parent(self.self_ref.clone());
        let trigger = Arc::new(trigger);
        self.triggers.write().push(trigger.clone());
        trigger
    }

    pub fn remove_trigger(&self, id: Uuid) -> Option<Arc<SequenceTrigger>> {
        let removed = {
            let mut triggers = self.triggers.write();
            let position = triggers.iter().position(|t| t.id() == id)?;
            triggers.remove(position)
        };
        removed.detach();
        Some(removed)
    }

    pub fn triggers(&self) -> Vec<Arc<SequenceTrigger>> {
        self.triggers.read().clone()
    }

    // ----- iteration state -----

    /// Number of completed blocks in the current run
    pub fn iterations(&self) -> u32 {
        self.iterations.load(Ordering::Acquire)
    }

    pub(crate) fn reset_iterations(&self) {
        self.iterations.store(0, Ordering::Release);
    }

    pub(crate) fn increment_iterations(&self) -> u32 {
        self.iterations.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// First child still waiting to run
    pub(crate) fn next_pending(&self) -> Option<Arc<dyn SequenceEntity>> {
        self.items
            .read()
            .iter()
            .find(|item| item.status() == EntityStatus::Created)
            .cloned()
    }

    /// Whether this container, and every ancestor, allows running `next`.
    ///
    /// Without conditions a container allows exactly one block; with
    /// conditions every one of them must agree.
    pub fn can_continue(
        &self,
        previous: Option<&dyn SequenceEntity>,
        next: Option<&dyn SequenceEntity>,
    ) -> bool {
        let conditions = self.conditions();
        let local = if conditions.is_empty() {
            self.iterations() < 1
        } else {
            conditions
                .iter()
                .all(|condition| condition.check(previous, next))
        };

        local
            && self
                .parent()
                .map_or(true, |parent| parent.can_continue(previous, next))
    }

    // ----- block hooks -----

    /// Containers from this one up to the root
    fn lineage(&self) -> Vec<Arc<SequenceContainer>> {
        let mut lineage = Vec::new();
        let mut cursor = self.self_ref.upgrade();
        while let Some(container) = cursor {
            cursor = container.parent();
            lineage.push(container);
        }
        lineage
    }

    /// Triggers attached here and on every ancestor, innermost first
    fn lineage_triggers(&self) -> Vec<Arc<SequenceTrigger>> {
        self.lineage()
            .iter()
            .flat_map(|container| container.triggers())
            .collect()
    }

    pub(crate) fn initialize_block(&self) {
        self.conditions().iter().for_each(|c| c.block_initialize());
        self.lineage_triggers()
            .iter()
            .for_each(|t| t.block_initialize());
    }

    pub(crate) fn start_block(&self) {
        self.conditions().iter().for_each(|c| c.block_started());
        self.lineage_triggers().iter().for_each(|t| t.block_started());
    }

    pub(crate) fn finish_block(&self) {
        self.conditions().iter().for_each(|c| c.block_finished());
        self.lineage_triggers().iter().for_each(|t| t.block_finished());
    }

    pub(crate) fn teardown_block(&self) {
        self.conditions().iter().for_each(|c| c.block_teardown());
        self.lineage_triggers().iter().for_each(|t| t.block_teardown());
    }

    /// Fire every applicable trigger from this container up to the root
    pub(crate) async fn run_triggers(
        &self,
        previous: Option<&dyn SequenceEntity>,
        next: &dyn SequenceEntity,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> SequenceResult<()> {
        for container in self.lineage() {
            for trigger in container.triggers() {
                if trigger.should_trigger(previous, Some(next)) {
                    debug!(
                        trigger = %trigger.name(),
                        container = %container.name(),
                        next = %next.name(),
                        "Trigger fired"
                    );
                    trigger.execute(&container, progress, cancel).await?;
                }
            }
        }
        Ok(())
    }

    /// Reset every child so the next block runs them again
    pub(crate) fn reset_children(&self) {
        for item in self.items() {
            item.reset_progress();
        }
    }

    /// Mark every child that never ran as skipped
    pub(crate) fn skip_remaining(&self) {
        for item in self.items() {
            if item.status() == EntityStatus::Created {
                item.skip();
            }
        }
    }

    // ----- run registry -----

    /// Walk parents (and trigger hosts) up to the container owning the run
    pub fn registry_root(self: &Arc<Self>) -> Arc<SequenceContainer> {
        let mut current = Arc::clone(self);
        loop {
            let next = current
                .parent()
                .or_else(|| current.trigger_host.read().upgrade());
            match next {
                Some(next) => current = next,
                None => return current,
            }
        }
    }

    pub fn add_running_item(&self, id: Uuid, name: &str) {
        self.running_items.insert(
            id,
            RunningItem {
                id,
                name: name.to_string(),
                started_at: Utc::now(),
            },
        );
    }

    pub fn remove_running_item(&self, id: Uuid) {
        self.running_items.remove(&id);
    }

    /// Items currently in flight anywhere below this (root) container
    pub fn running_items(&self) -> Vec<RunningItem> {
        let mut items: Vec<RunningItem> = self
            .running_items
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        items.sort_by_key(|item| item.started_at);
        items
    }

    pub(crate) fn set_trigger_host(&self, host: Weak<SequenceContainer>) {
        *self.trigger_host.write() = host;
    }

    pub fn set_default_error_behavior(&self, behavior: ErrorBehavior) {
        *self.default_error_behavior.write() = Some(behavior);
    }

    pub fn default_error_behavior(&self) -> Option<ErrorBehavior> {
        *self.default_error_behavior.read()
    }

    // ----- validation and cloning -----

    /// Run every validatable node below this container
    pub fn validate_all(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for item in self.items() {
            if let Some(container) = item.as_container() {
                issues.extend(container.validate_all());
            } else if let Some(validatable) = item.as_validatable() {
                if !validatable.validate() {
                    issues.push(ValidationIssue {
                        entity_id: item.id(),
                        entity_name: item.name().to_string(),
                        issues: validatable.issues(),
                    });
                }
            }
        }
        for trigger in self.triggers() {
            issues.extend(trigger.validate());
        }
        issues
    }

    /// Structural deep copy with fresh identities and pristine state
    pub fn clone_container(&self) -> Arc<SequenceContainer> {
        let copy = Self::with_core(self.core.fresh_copy(), self.strategy.clone_strategy());
        *copy.default_error_behavior.write() = self.default_error_behavior();

        for item in self.items() {
            let child = item.clone_entity();
            child.attach_new_parent(copy.self_ref.clone());
            copy.items.write().push(child);
        }
        for condition in self.conditions() {
            copy.conditions.write().push(Arc::from(condition.clone_condition()));
        }
        for trigger in self.triggers() {
            copy.add_trigger(trigger.clone_trigger());
        }
        copy
    }
}

#[async_trait]
impl SequenceEntity for SequenceContainer {
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
        self.items()
            .iter()
            .map(|item| item.estimated_duration())
            .sum()
    }

    async fn run(&self, progress: &ProgressSink, cancel: &CancellationToken) -> SequenceResult<()> {
        if self.core.state.try_transition(EntityEvent::Start).is_none() {
            debug!(
                entity_id = %self.core.id,
                entity_name = %self.name(),
                status = %self.status(),
                "Container is not in created state, nothing to run"
            );
            return Ok(());
        }
        info!(
            entity_id = %self.core.id,
            entity_name = %self.name(),
            strategy = self.strategy.name(),
            items = self.len(),
            "Running container"
        );

        let local = self.core.begin_local_scope(cancel);
        let result = self.strategy.execute(self, progress, &local).await;
        self.core.end_local_scope();

        let outcome = match result {
            Ok(()) => {
                self.core.state.try_transition(EntityEvent::Complete);
                Ok(())
            }
            Err(SequenceError::Cancelled) if !cancel.is_cancelled() => {
                // Only our own scope was cancelled: this container was skipped
                self.core.state.try_transition(EntityEvent::Skip);
                self.skip_remaining();
                Ok(())
            }
            Err(SequenceError::Cancelled) => {
                self.core.state.try_transition(EntityEvent::Revert);
                Err(SequenceError::Cancelled)
            }
            Err(err @ SequenceError::Aborted { .. }) => {
                self.core
                    .state
                    .try_transition(EntityEvent::fail_with_error(err.to_string()));
                Err(err)
            }
            Err(err) => {
                log_error("sequence_container", "run", &err.to_string(), Some(self.name()));
                self.core
                    .state
                    .try_transition(EntityEvent::fail_with_error(err.to_string()));
                Ok(())
            }
        };

        log_entity_transition("finish", self.core.id, self.name(), self.status(), None);
        outcome
    }

    fn skip(&self) {
        if self.status().is_terminal() {
            return;
        }
        if self.core.state.try_transition(EntityEvent::Skip).is_some() {
            log_entity_transition("skip", self.core.id, self.name(), EntityStatus::Skipped, None);
        }
        self.core.cancel_local();
        for item in self.items() {
            if !item.status().is_terminal() {
                item.skip();
            }
        }
    }

    fn reset_progress(&self) {
        self.core.state.try_transition(EntityEvent::Reset);
        self.reset_iterations();
        self.reset_children();
        self.conditions().iter().for_each(|c| c.reset_progress());
        self.triggers().iter().for_each(|t| t.reset_progress());
    }

    fn revert_interrupted(&self) {
        if self.core.revert_interrupted() {
            debug!(entity_name = %self.name(), "Reverted interrupted container");
        }
        self.running_items.clear();
        self.items().iter().for_each(|item| item.revert_interrupted());
        self.triggers().iter().for_each(|t| t.revert_interrupted());
    }

    fn clone_entity(&self) -> Arc<dyn SequenceEntity> {
        self.clone_container()
    }

    fn as_container(&self) -> Option<&SequenceContainer> {
        Some(self)
    }
}

impl std::fmt::Debug for SequenceContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceContainer")
            .field("id", &self.core.id)
            .field("name", &self.core.metadata.name)
            .field("status", &self.core.status())
            .field("strategy", &self.strategy.name())
            .field("items", &self.len())
            .field("iterations", &self.iterations())
            .finish()
    }
}
