use super::entity::SequenceEntity;

/// Loop predicate bound to a container
///
/// Counters a condition keeps persist across the container's loop iterations,
/// and across a cancelled run that is later resumed. Only `reset_progress`
/// clears them.
///
/// `block_initialize` fires every time the container enters `run`, including
/// when it resumes after a cancellation.
pub trait SequenceCondition: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Whether the owning container may keep going before `next`
    fn check(
        &self,
        previous: Option<&dyn SequenceEntity>,
        next: Option<&dyn SequenceEntity>,
    ) -> bool;

    fn block_initialize(&self) {}

    fn block_started(&self) {}

    fn block_finished(&self) {}

    fn block_teardown(&self) {}

    fn reset_progress(&self) {}

    /// Same configuration, fresh counters
    fn clone_condition(&self) -> Box<dyn SequenceCondition>;
}
