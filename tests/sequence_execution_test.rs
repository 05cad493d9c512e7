mod common;

use common::*;
use sequencer_core::config::ErrorBehavior;
use sequencer_core::error::SequenceError;
use sequencer_core::progress::{CollectingProgress, NullProgress, ProgressSink};
use sequencer_core::sequence::{
    EntityMetadata, LoopCondition, SequenceContainer, SequenceEntity, SequenceItem,
};
use sequencer_core::state_machine::EntityStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

fn sequential(name: &str) -> Arc<SequenceContainer> {
    SequenceContainer::sequential(EntityMetadata::new(name))
}

async fn run(container: &Arc<SequenceContainer>) -> Result<(), SequenceError> {
    container
        .run(&NullProgress::sink(), &CancellationToken::new())
        .await
}

#[tokio::test]
async fn test_run_after_terminal_status_is_noop() {
    let log = ExecutionLog::new();
    let root = sequential("Target");
    root.add(recording_item("Expose", &log)).unwrap();

    run(&root).await.unwrap();
    assert_eq!(root.status(), EntityStatus::Finished);

    run(&root).await.unwrap();
    assert_eq!(log.count("Expose"), 1);
    assert_eq!(root.status(), EntityStatus::Finished);
}

#[tokio::test]
async fn test_zero_conditions_run_exactly_one_block() {
    let log = ExecutionLog::new();
    let root = sequential("Target");
    root.add(recording_item("Slew", &log)).unwrap();
    root.add(recording_item("Expose", &log)).unwrap();

    run(&root).await.unwrap();

    assert_eq!(root.iterations(), 1);
    assert_eq!(log.entries(), vec!["Slew", "Expose"]);
}

#[tokio::test]
async fn test_loop_condition_repeats_n_times() {
    let log = ExecutionLog::new();
    let root = sequential("Target");
    root.add(recording_item("Expose", &log)).unwrap();
    root.add_condition(LoopCondition::new(5));

    run(&root).await.unwrap();

    assert_eq!(root.iterations(), 5);
    assert_eq!(log.count("Expose"), 5);
    assert_eq!(root.items()[0].status(), EntityStatus::Finished);
}

#[tokio::test]
async fn test_nested_loops_respect_outer_condition() {
    let log = ExecutionLog::new();
    let outer = sequential("Outer");
    let inner = sequential("Inner");
    inner.add(recording_item("Expose", &log)).unwrap();
    inner.add_condition(LoopCondition::new(3));
    outer.add(inner.clone()).unwrap();
    outer.add_condition(LoopCondition::new(2));

    run(&outer).await.unwrap();

    assert_eq!(outer.iterations(), 2);
    assert_eq!(inner.iterations(), 3);
    assert_eq!(log.count("Expose"), 6);
}

#[tokio::test]
async fn test_global_cancellation_leaves_run_resumable() {
    let log = ExecutionLog::new();
    let started = Arc::new(Notify::new());
    let root = sequential("Target");
    let first = recording_item("First", &log);
    let second = blocking_item(
        "Second",
        BlockingAction::forever("Second", log.clone(), started.clone()),
    );
    let third = recording_item("Third", &log);
    root.add(first.clone()).unwrap();
    root.add(second.clone()).unwrap();
    root.add(third.clone()).unwrap();

    let token = CancellationToken::new();
    let handle = {
        let root = root.clone();
        let token = token.clone();
        tokio::spawn(async move { root.run(&NullProgress::sink(), &token).await })
    };

    started.notified().await;
    assert_eq!(second.status(), EntityStatus::Running);
    token.cancel();

    let result = handle.await.unwrap();
    assert_eq!(result, Err(SequenceError::Cancelled));
    assert_eq!(first.status(), EntityStatus::Finished);
    assert_eq!(second.status(), EntityStatus::Created);
    assert_eq!(third.status(), EntityStatus::Created);
    assert_eq!(root.status(), EntityStatus::Created);
}

#[tokio::test]
async fn test_resume_keeps_loop_progress() {
    let log = ExecutionLog::new();
    let started = Arc::new(Notify::new());
    let root = sequential("Target");
    root.add(recording_item("Expose", &log)).unwrap();
    let wait = action_item(
        "Wait",
        BlockOnCall::new("Wait", log.clone(), started.clone(), 2),
    );
    root.add(wait.clone()).unwrap();
    root.add_condition(LoopCondition::new(3));

    let token = CancellationToken::new();
    let handle = {
        let root = root.clone();
        let token = token.clone();
        tokio::spawn(async move { root.run(&NullProgress::sink(), &token).await })
    };

    // Wait blocks during the second block
    started.notified().await;
    token.cancel();
    assert_eq!(handle.await.unwrap(), Err(SequenceError::Cancelled));
    assert_eq!(log.count("Expose"), 2);
    assert_eq!(root.iterations(), 1);
    assert_eq!(wait.status(), EntityStatus::Created);

    run(&root).await.unwrap();

    assert_eq!(root.iterations(), 3);
    assert_eq!(log.count("Expose"), 3);
    assert_eq!(log.count("Wait"), 3);
    assert_eq!(root.status(), EntityStatus::Finished);
}

#[tokio::test]
async fn test_local_skip_does_not_stop_siblings() {
    let log = ExecutionLog::new();
    let started = Arc::new(Notify::new());
    let root = sequential("Target");
    let waiting = blocking_item(
        "Wait for dawn",
        BlockingAction::forever("Wait for dawn", log.clone(), started.clone()),
    );
    root.add(waiting.clone()).unwrap();
    root.add(recording_item("Park", &log)).unwrap();

    let token = CancellationToken::new();
    let handle = {
        let root = root.clone();
        let token = token.clone();
        tokio::spawn(async move { root.run(&NullProgress::sink(), &token).await })
    };

    started.notified().await;
    waiting.skip();

    handle.await.unwrap().unwrap();
    assert!(!token.is_cancelled());
    assert_eq!(waiting.status(), EntityStatus::Skipped);
    assert_eq!(log.entries(), vec!["Park"]);
    assert_eq!(root.status(), EntityStatus::Finished);
}

#[tokio::test]
async fn test_failed_validation_skips_item() {
    let log = ExecutionLog::new();
    let root = sequential("Target");
    let camera = SequenceItem::new(
        EntityMetadata::new("Expose"),
        UnavailableEquipment::new(vec!["Camera not connected".to_string()], log.clone()),
    )
    .into_entity();
    root.add(camera.clone()).unwrap();
    root.add(recording_item("Park", &log)).unwrap();

    let issues = root.validate_all();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].issues, vec!["Camera not connected".to_string()]);

    run(&root).await.unwrap();
    assert_eq!(camera.status(), EntityStatus::Skipped);
    assert_eq!(log.entries(), vec!["Park"]);
}

#[tokio::test]
async fn test_failure_is_absorbed_by_default() {
    let log = ExecutionLog::new();
    let root = sequential("Target");
    let broken = SequenceItem::new(EntityMetadata::new("Focus"), FailingAction::new("focuser offline"))
        .into_entity();
    root.add(broken.clone()).unwrap();
    root.add(recording_item("Expose", &log)).unwrap();

    run(&root).await.unwrap();

    assert_eq!(broken.status(), EntityStatus::Failed);
    assert_eq!(log.entries(), vec!["Expose"]);
    assert_eq!(root.status(), EntityStatus::Finished);
}

#[tokio::test]
async fn test_abort_run_unwinds_every_level() {
    let log = ExecutionLog::new();
    let root = sequential("Target");
    let inner = sequential("Inner");
    inner
        .add(
            SequenceItem::new(EntityMetadata::new("Guide"), FailingAction::new("guider lost star"))
                .with_error_behavior(ErrorBehavior::AbortRun)
                .into_entity(),
        )
        .unwrap();
    let after = recording_item("After", &log);
    inner.add(after.clone()).unwrap();
    root.add(inner.clone()).unwrap();
    root.add(recording_item("Park", &log)).unwrap();

    let result = run(&root).await;

    assert!(matches!(result, Err(SequenceError::Aborted { ref entity, .. }) if entity == "Guide"));
    assert_eq!(inner.status(), EntityStatus::Failed);
    assert_eq!(root.status(), EntityStatus::Failed);
    assert_eq!(after.status(), EntityStatus::Created);
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_remaining_items_skipped_when_condition_stops_block() {
    let log = ExecutionLog::new();
    let outer = sequential("Outer");
    let inner = sequential("Inner");
    inner.add(recording_item("A", &log)).unwrap();
    outer.add(inner.clone()).unwrap();
    let tail = recording_item("Tail", &log);
    outer.add(tail.clone()).unwrap();
    // A zero-repeat loop never starts a block
    outer.add_condition(LoopCondition::new(0));

    run(&outer).await.unwrap();

    assert_eq!(inner.status(), EntityStatus::Skipped);
    assert_eq!(tail.status(), EntityStatus::Skipped);
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_parallel_failure_and_success_both_complete() {
    let log = ExecutionLog::new();
    let root = SequenceContainer::parallel(EntityMetadata::new("Prepare"));
    let broken = SequenceItem::new(EntityMetadata::new("Cool"), FailingAction::new("cooler fault"))
        .into_entity();
    let working = recording_item("Slew", &log);
    root.add(broken.clone()).unwrap();
    root.add(working.clone()).unwrap();

    let progress = CollectingProgress::new();
    let sink: ProgressSink = progress.clone();
    root.run(&sink, &CancellationToken::new()).await.unwrap();

    assert_eq!(broken.status(), EntityStatus::Failed);
    assert_eq!(working.status(), EntityStatus::Finished);
    assert_eq!(root.status(), EntityStatus::Finished);
    assert!(progress
        .status_lines()
        .iter()
        .any(|status| status.source == "Slew" && status.status == "Slew running"));
}

#[tokio::test]
async fn test_parallel_abort_cancels_siblings() {
    let log = ExecutionLog::new();
    let started = Arc::new(Notify::new());
    let root = SequenceContainer::parallel(EntityMetadata::new("Prepare"));
    let waiting = blocking_item(
        "Wait",
        BlockingAction::forever("Wait", log.clone(), started.clone()),
    );
    root.add(waiting.clone()).unwrap();
    root.add(
        SequenceItem::new(EntityMetadata::new("Cool"), FailingAction::new("cooler fault"))
            .with_error_behavior(ErrorBehavior::AbortRun)
            .into_entity(),
    )
    .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), run(&root))
        .await
        .unwrap();

    assert!(matches!(result, Err(SequenceError::Aborted { .. })));
    assert_eq!(waiting.status(), EntityStatus::Created);
    assert_eq!(root.status(), EntityStatus::Failed);
}

#[tokio::test]
async fn test_clone_is_independent() {
    let log = ExecutionLog::new();
    let root = sequential("Target");
    let inner = sequential("Inner");
    inner.add(recording_item("Expose", &log)).unwrap();
    inner.add_condition(LoopCondition::new(2));
    root.add(inner.clone()).unwrap();
    root.add(recording_item("Park", &log)).unwrap();
    run(&root).await.unwrap();

    let copy = root.clone_container();

    assert_ne!(copy.id(), root.id());
    assert!(copy.parent().is_none());
    assert_eq!(copy.status(), EntityStatus::Created);
    assert_eq!(copy.len(), 2);
    assert_eq!(copy.conditions().len(), root.conditions().len());
    for (cloned, original) in copy.items().iter().zip(root.items()) {
        assert_ne!(cloned.id(), original.id());
        assert_eq!(cloned.name(), original.name());
        assert_eq!(cloned.status(), EntityStatus::Created);
        assert_eq!(cloned.parent().unwrap().id(), copy.id());
    }
    let cloned_inner = copy.items()[0].clone();
    let cloned_inner = cloned_inner.as_container().unwrap();
    assert_eq!(cloned_inner.conditions().len(), 1);
    assert_eq!(cloned_inner.items()[0].parent().unwrap().id(), cloned_inner.id());

    // Running the copy leaves the original untouched
    copy.run(&NullProgress::sink(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(log.count("Expose"), 4);
    assert_eq!(root.status(), EntityStatus::Finished);
}
