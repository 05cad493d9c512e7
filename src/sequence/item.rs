//! # Sequence Items
//!
//! A [`SequenceItem`] is a leaf of the sequence tree. It owns the status state
//! machine and the cancellation scope; the actual work is delegated to a
//! user-supplied [`SequenceAction`].

use async_trait::async_trait;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::container::SequenceContainer;
use super::entity::{EntityCore, EntityMetadata, SequenceEntity};
use crate::config::ErrorBehavior;
use crate::error::{ActionError, ActionResult, SequenceError, SequenceResult};
use crate::logging::{log_entity_transition, log_error};
use crate::progress::{ApplicationStatus, ProgressSink};
use crate::state_machine::{EntityEvent, EntityStatus};
use crate::validation::{skip_reason, Validatable};

/// Action collaborator implemented by the surrounding application
#[async_trait]
pub trait SequenceAction: Send + Sync {
    /// Do the work. The token is the item's local token: it fires both on a
    /// run-wide cancel and on a local skip.
    async fn execute(&self, progress: &ProgressSink, cancel: &CancellationToken) -> ActionResult<()>;

    /// Copy of the action's configuration with none of its runtime state
    fn clone_action(&self) -> Box<dyn SequenceAction>;

    fn estimated_duration(&self) -> Duration {
        Duration::ZERO
    }

    fn as_validatable(&self) -> Option<&dyn Validatable> {
        None
    }
}

pub struct SequenceItem {
    core: EntityCore,
    action: Box<dyn SequenceAction>,
    error_behavior: Option<ErrorBehavior>,
}

impl SequenceItem {
    pub fn new(metadata: EntityMetadata, action: impl SequenceAction + 'static) -> Self {
        Self::from_boxed(metadata, Box::new(action))
    }

    pub fn from_boxed(metadata: EntityMetadata, action: Box<dyn SequenceAction>) -> Self {
        Self {
            core: EntityCore::new(metadata),
            action,
            error_behavior: None,
        }
    }

    /// Override the failure policy inherited from the run configuration
    pub fn with_error_behavior(mut self, behavior: ErrorBehavior) -> Self {
        self.error_behavior = Some(behavior);
        self
    }

    pub fn into_entity(self) -> Arc<dyn SequenceEntity> {
        Arc::new(self)
    }

    pub fn action(&self) -> &dyn SequenceAction {
        self.action.as_ref()
    }

    /// Own setting, else the root container's default, else `Continue`
    pub fn effective_error_behavior(&self) -> ErrorBehavior {
        self.error_behavior
            .or_else(|| {
                self.core
                    .registry_root()
                    .and_then(|root| root.default_error_behavior())
            })
            .unwrap_or_default()
    }

    async fn execute_once(
        &self,
        progress: &ProgressSink,
        local: &CancellationToken,
    ) -> ActionResult<()> {
        tokio::select! {
            biased;
            _ = local.cancelled() => Err(ActionError::Cancelled),
            result = self.action.execute(progress, local) => result,
        }
    }

    async fn execute_with_policy(
        &self,
        progress: &ProgressSink,
        local: &CancellationToken,
        behavior: ErrorBehavior,
    ) -> ActionResult<()> {
        if let Some(validatable) = self.action.as_validatable() {
            if !validatable.validate() {
                return Err(ActionError::skipped(skip_reason(&validatable.issues())));
            }
        }

        let retries = match behavior {
            ErrorBehavior::Retry { attempts } => attempts,
            _ => 0,
        };

        let mut attempt = 0;
        loop {
            match self.execute_once(progress, local).await {
                Err(ActionError::Failed(err)) if attempt < retries && !local.is_cancelled() => {
                    attempt += 1;
                    warn!(
                        entity_id = %self.core.id,
                        entity_name = %self.name(),
                        attempt,
                        max_attempts = retries,
                        error = %err,
                        "Item action failed, retrying"
                    );
                }
                outcome => return outcome,
            }
        }
    }

    /// Map the action outcome onto a terminal status
    fn settle(
        &self,
        outcome: ActionResult<()>,
        inbound: &CancellationToken,
        behavior: ErrorBehavior,
    ) -> SequenceResult<()> {
        match outcome {
            Ok(()) => {
                self.core.state.try_transition(EntityEvent::Complete);
                Ok(())
            }
            Err(ActionError::Skipped { reason }) => {
                info!(
                    entity_id = %self.core.id,
                    entity_name = %self.name(),
                    reason = %reason,
                    "Item skipped"
                );
                self.core.state.try_transition(EntityEvent::Skip);
                Ok(())
            }
            Err(ActionError::Cancelled) if inbound.is_cancelled() => {
                // Back to Created so a resumed run attempts it again
                self.core.state.try_transition(EntityEvent::Revert);
                Err(SequenceError::Cancelled)
            }
            Err(ActionError::Cancelled) => {
                self.core.state.try_transition(EntityEvent::Skip);
                Ok(())
            }
            Err(ActionError::Failed(err)) => {
                let reason = format!("{err:#}");
                log_error("sequence_item", "run", &reason, Some(self.name()));
                self.core
                    .state
                    .try_transition(EntityEvent::fail_with_error(reason.clone()));
                match behavior {
                    ErrorBehavior::AbortRun => Err(SequenceError::aborted(self.name(), reason)),
                    _ => Ok(()),
                }
            }
        }
    }
}

#[async_trait]
impl SequenceEntity for SequenceItem {
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
        self.action.estimated_duration()
    }

    async fn run(&self, progress: &ProgressSink, cancel: &CancellationToken) -> SequenceResult<()> {
        if self.core.state.try_transition(EntityEvent::Start).is_none() {
            debug!(
                entity_id = %self.core.id,
                entity_name = %self.name(),
                status = %self.status(),
                "Item is not in created state, nothing to run"
            );
            return Ok(());
        }
        log_entity_transition("start", self.core.id, self.name(), EntityStatus::Running, None);

        let local = self.core.begin_local_scope(cancel);

        let root = self.core.registry_root();
        if let Some(root) = &root {
            root.add_running_item(self.core.id, self.name());
        }
        progress.report(ApplicationStatus::new(self.name()));

        // A skip can land before the local token existed to carry it
        let result = if self.status() == EntityStatus::Running {
            let behavior = self.effective_error_behavior();
            let outcome = self.execute_with_policy(progress, &local, behavior).await;
            self.settle(outcome, cancel, behavior)
        } else {
            debug!(
                entity_id = %self.core.id,
                entity_name = %self.name(),
                "Item skipped before its action started"
            );
            Ok(())
        };

        if let Some(root) = &root {
            root.remove_running_item(self.core.id);
        }
        progress.report(ApplicationStatus::default());
        self.core.end_local_scope();

        log_entity_transition("finish", self.core.id, self.name(), self.status(), None);
        result
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
    }

    fn revert_interrupted(&self) {
        self.core.revert_interrupted();
    }

    fn clone_entity(&self) -> Arc<dyn SequenceEntity> {
        Arc::new(SequenceItem {
            core: self.core.fresh_copy(),
            action: self.action.clone_action(),
            error_behavior: self.error_behavior,
        })
    }

    fn as_validatable(&self) -> Option<&dyn Validatable> {
        self.action.as_validatable()
    }
}

impl std::fmt::Debug for SequenceItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceItem")
            .field("id", &self.core.id)
            .field("name", &self.core.metadata.name)
            .field("status", &self.core.status())
            .field("error_behavior", &self.error_behavior)
            .finish()
    }
}
