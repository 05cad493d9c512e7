use parking_lot::RwLock;

use super::{
    errors::{StateMachineError, StateMachineResult},
    events::EntityEvent,
    states::EntityStatus,
};

/// Status cell for a single sequence entity.
///
/// Transitions are computed and applied under one write lock, so a concurrent
/// `skip` and the owning `run` can never interleave half-way through a
/// transition. The lock is never held across an await point.
#[derive(Debug, Default)]
pub struct EntityStateMachine {
    state: RwLock<EntityStatus>,
}

impl EntityStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current status
    pub fn current_state(&self) -> EntityStatus {
        *self.state.read()
    }

    /// Attempt to apply an event, returning the new status
    pub fn transition(&self, event: EntityEvent) -> StateMachineResult<EntityStatus> {
        let mut state = self.state.write();
        let target = Self::determine_target_state(*state, &event)?;
        tracing::trace!(
            from = %*state,
            to = %target,
            event = event.event_type(),
            "Entity status transition"
        );
        *state = target;
        Ok(target)
    }

    /// Apply an event only when it is valid from the current status.
    ///
    /// Returns `None` (and leaves the status untouched) otherwise.
    pub fn try_transition(&self, event: EntityEvent) -> Option<EntityStatus> {
        self.transition(event).ok()
    }

    /// Determine the target status based on current status and event
    pub fn determine_target_state(
        current_state: EntityStatus,
        event: &EntityEvent,
    ) -> StateMachineResult<EntityStatus> {
        let target = match (current_state, event) {
            (EntityStatus::Created, EntityEvent::Start) => EntityStatus::Running,

            (EntityStatus::Running, EntityEvent::Complete) => EntityStatus::Finished,

            (EntityStatus::Running, EntityEvent::Fail(_)) => EntityStatus::Failed,

            // Skips may be forced before the node ever started
            (EntityStatus::Created, EntityEvent::Skip) => EntityStatus::Skipped,
            (EntityStatus::Running, EntityEvent::Skip) => EntityStatus::Skipped,
            // An external skip that landed first wins over the run's own outcome
            (EntityStatus::Skipped, EntityEvent::Skip) => EntityStatus::Skipped,

            (EntityStatus::Running, EntityEvent::Revert) => EntityStatus::Created,

            (_, EntityEvent::Reset) => EntityStatus::Created,

            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    /// Check if the entity is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.current_state().is_terminal()
    }
}
