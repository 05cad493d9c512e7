//! Base capability set shared by items, containers and triggers.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::container::SequenceContainer;
use crate::error::SequenceResult;
use crate::progress::ProgressSink;
use crate::state_machine::{EntityEvent, EntityStateMachine, EntityStatus};
use crate::validation::Validatable;

/// Descriptive metadata; opaque to the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub name: String,
    pub category: String,
    pub description: String,
}

impl EntityMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A runnable node of the sequence tree
#[async_trait]
pub trait SequenceEntity: Send + Sync {
    fn id(&self) -> Uuid;

    fn metadata(&self) -> &EntityMetadata;

    fn name(&self) -> &str {
        &self.metadata().name
    }

    fn status(&self) -> EntityStatus;

    /// The enclosing container, if it is still alive
    fn parent(&self) -> Option<Arc<SequenceContainer>>;

    /// Point the back-reference at a new container. Never takes ownership.
    fn attach_new_parent(&self, parent: Weak<SequenceContainer>);

    fn detach(&self);

    /// Scheduling hint for triggers; the scheduler itself ignores it
    fn estimated_duration(&self) -> Duration {
        Duration::ZERO
    }

    /// Run the node. Only run-wide cancellation and aborts come back as errors.
    async fn run(&self, progress: &ProgressSink, cancel: &CancellationToken) -> SequenceResult<()>;

    /// Mark the node skipped and interrupt it if it is in flight, without
    /// touching the run-wide cancellation token.
    fn skip(&self);

    /// Return the node (and, for containers, all descendants) to `Created`
    fn reset_progress(&self);

    /// Put nodes left `Running` by a run whose future was dropped back to
    /// `Created`. Finished work is kept.
    fn revert_interrupted(&self);

    /// Deep copy with fresh identity, `Created` status and no parent
    fn clone_entity(&self) -> Arc<dyn SequenceEntity>;

    fn as_container(&self) -> Option<&SequenceContainer> {
        None
    }

    fn as_validatable(&self) -> Option<&dyn Validatable> {
        None
    }
}

/// Identity, status, parent link and local cancellation scope of one node
#[derive(Debug)]
pub(crate) struct EntityCore {
    pub(crate) id: Uuid,
    pub(crate) metadata: EntityMetadata,
    pub(crate) state: EntityStateMachine,
    parent: RwLock<Weak<SequenceContainer>>,
    local_cancel: Mutex<Option<CancellationToken>>,
}

impl EntityCore {
    pub(crate) fn new(metadata: EntityMetadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            metadata,
            state: EntityStateMachine::new(),
            parent: RwLock::new(Weak::new()),
            local_cancel: Mutex::new(None),
        }
    }

    /// Same metadata, new identity, pristine state
    pub(crate) fn fresh_copy(&self) -> Self {
        Self::new(self.metadata.clone())
    }

    pub(crate) fn status(&self) -> EntityStatus {
        self.state.current_state()
    }

    pub(crate) fn parent(&self) -> Option<Arc<SequenceContainer>> {
        self.parent.read().upgrade()
    }

    pub(crate) fn set_parent(&self, parent: Weak<SequenceContainer>) {
        *self.parent.write() = parent;
    }

    pub(crate) fn clear_parent(&self) {
        *self.parent.write() = Weak::new();
    }

    /// The container owning the run registry this node reports to
    pub(crate) fn registry_root(&self) -> Option<Arc<SequenceContainer>> {
        self.parent().map(|parent| parent.registry_root())
    }

    /// Derive the node-local token from the inbound one and remember it so
    /// `skip` can reach it.
    pub(crate) fn begin_local_scope(&self, inbound: &CancellationToken) -> CancellationToken {
        let local = inbound.child_token();
        *self.local_cancel.lock() = Some(local.clone());
        local
    }

    pub(crate) fn end_local_scope(&self) {
        self.local_cancel.lock().take();
    }

    pub(crate) fn revert_interrupted(&self) -> bool {
        self.end_local_scope();
        self.state.try_transition(EntityEvent::Revert).is_some()
    }

    /// Cancel the node-local token, if the node is in flight
    pub(crate) fn cancel_local(&self) -> bool {
        match self.local_cancel.lock().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}
