//! Shared actions and builders for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use sequencer_core::error::{ActionError, ActionResult};
use sequencer_core::progress::{ApplicationStatus, ProgressSink};
use sequencer_core::sequence::{
    EntityMetadata, HistoryCounter, SequenceAction, SequenceCondition, SequenceEntity,
    SequenceItem, TriggerPolicy,
};
use sequencer_core::validation::{IssueList, Validatable};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Ordered record of what ran, shared between actions
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().iter().filter(|e| *e == entry).count()
    }
}

/// Records its label and succeeds
pub struct RecordingAction {
    pub label: String,
    pub log: ExecutionLog,
}

#[async_trait]
impl SequenceAction for RecordingAction {
    async fn execute(&self, progress: &ProgressSink, _: &CancellationToken) -> ActionResult<()> {
        progress.report(ApplicationStatus::new(format!("{} running", self.label)));
        self.log.push(self.label.clone());
        Ok(())
    }

    fn clone_action(&self) -> Box<dyn SequenceAction> {
        Box::new(RecordingAction {
            label: self.label.clone(),
            log: self.log.clone(),
        })
    }
}

/// Records its label and grows an exposure history
pub struct ExposureAction {
    pub log: ExecutionLog,
    pub history: HistoryCounter,
}

#[async_trait]
impl SequenceAction for ExposureAction {
    async fn execute(&self, _: &ProgressSink, _: &CancellationToken) -> ActionResult<()> {
        self.log.push("Expose");
        self.history.record();
        Ok(())
    }

    fn clone_action(&self) -> Box<dyn SequenceAction> {
        Box::new(ExposureAction {
            log: self.log.clone(),
            history: self.history.clone(),
        })
    }
}

/// Always fails with an ordinary error
pub struct FailingAction {
    pub message: String,
    pub attempts: Arc<AtomicU32>,
}

impl FailingAction {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait]
impl SequenceAction for FailingAction {
    async fn execute(&self, _: &ProgressSink, _: &CancellationToken) -> ActionResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ActionError::failed(self.message.clone()))
    }

    fn clone_action(&self) -> Box<dyn SequenceAction> {
        Box::new(FailingAction::new(self.message.clone()))
    }
}

/// Waits for cancellation the first `blocks` times it runs, then records and
/// succeeds. `started` is notified every time it begins waiting.
pub struct BlockingAction {
    pub label: String,
    pub log: ExecutionLog,
    pub started: Arc<Notify>,
    remaining_blocks: AtomicU32,
}

impl BlockingAction {
    pub fn once(label: impl Into<String>, log: ExecutionLog, started: Arc<Notify>) -> Self {
        Self::blocking(label, log, started, 1)
    }

    pub fn forever(label: impl Into<String>, log: ExecutionLog, started: Arc<Notify>) -> Self {
        Self::blocking(label, log, started, u32::MAX)
    }

    fn blocking(label: impl Into<String>, log: ExecutionLog, started: Arc<Notify>, blocks: u32) -> Self {
        Self {
            label: label.into(),
            log,
            started,
            remaining_blocks: AtomicU32::new(blocks),
        }
    }
}

#[async_trait]
impl SequenceAction for BlockingAction {
    async fn execute(&self, _: &ProgressSink, cancel: &CancellationToken) -> ActionResult<()> {
        let remaining = self.remaining_blocks.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_blocks.store(remaining - 1, Ordering::SeqCst);
            self.started.notify_one();
            cancel.cancelled().await;
            return Err(ActionError::Cancelled);
        }
        self.log.push(self.label.clone());
        Ok(())
    }

    fn clone_action(&self) -> Box<dyn SequenceAction> {
        Box::new(BlockingAction::blocking(
            self.label.clone(),
            self.log.clone(),
            self.started.clone(),
            self.remaining_blocks.load(Ordering::SeqCst),
        ))
    }
}

/// Records its label and succeeds, except on call number `block_on` where it
/// waits for cancellation instead
pub struct BlockOnCall {
    pub label: String,
    pub log: ExecutionLog,
    pub started: Arc<Notify>,
    block_on: u32,
    calls: AtomicU32,
}

impl BlockOnCall {
    pub fn new(label: impl Into<String>, log: ExecutionLog, started: Arc<Notify>, block_on: u32) -> Self {
        Self {
            label: label.into(),
            log,
            started,
            block_on,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl SequenceAction for BlockOnCall {
    async fn execute(&self, _: &ProgressSink, cancel: &CancellationToken) -> ActionResult<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.block_on {
            self.started.notify_one();
            cancel.cancelled().await;
            return Err(ActionError::Cancelled);
        }
        self.log.push(self.label.clone());
        Ok(())
    }

    fn clone_action(&self) -> Box<dyn SequenceAction> {
        Box::new(BlockOnCall::new(
            self.label.clone(),
            self.log.clone(),
            self.started.clone(),
            self.block_on,
        ))
    }
}

/// Loop condition allowing `blocks` blocks that logs every hook as
/// `"<tag>:<hook>"`
pub struct RecordingCondition {
    pub tag: String,
    pub log: ExecutionLog,
    blocks: u32,
    finished: AtomicU32,
}

impl RecordingCondition {
    pub fn new(tag: impl Into<String>, log: ExecutionLog, blocks: u32) -> Self {
        Self {
            tag: tag.into(),
            log,
            blocks,
            finished: AtomicU32::new(0),
        }
    }

    fn record(&self, hook: &str) {
        self.log.push(format!("{}:{hook}", self.tag));
    }
}

impl SequenceCondition for RecordingCondition {
    fn name(&self) -> &str {
        &self.tag
    }

    fn check(&self, _: Option<&dyn SequenceEntity>, _: Option<&dyn SequenceEntity>) -> bool {
        self.finished.load(Ordering::SeqCst) < self.blocks
    }

    fn block_initialize(&self) {
        self.record("initialize");
    }

    fn block_started(&self) {
        self.record("started");
    }

    fn block_finished(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
        self.record("finished");
    }

    fn block_teardown(&self) {
        self.record("teardown");
    }

    fn reset_progress(&self) {
        self.finished.store(0, Ordering::SeqCst);
    }

    fn clone_condition(&self) -> Box<dyn SequenceCondition> {
        Box::new(RecordingCondition::new(self.tag.clone(), self.log.clone(), self.blocks))
    }
}

/// Never fires; logs every block hook it receives as `"<tag>:<hook>"`
pub struct RecordingPolicy {
    pub tag: String,
    pub log: ExecutionLog,
}

impl RecordingPolicy {
    pub fn new(tag: impl Into<String>, log: ExecutionLog) -> Self {
        Self {
            tag: tag.into(),
            log,
        }
    }

    fn record(&self, hook: &str) {
        self.log.push(format!("{}:{hook}", self.tag));
    }
}

impl TriggerPolicy for RecordingPolicy {
    fn should_trigger(&self, _: Option<&dyn SequenceEntity>, _: Option<&dyn SequenceEntity>) -> bool {
        false
    }

    fn block_initialize(&self) {
        self.record("initialize");
    }

    fn block_started(&self) {
        self.record("started");
    }

    fn block_finished(&self) {
        self.record("finished");
    }

    fn block_teardown(&self) {
        self.record("teardown");
    }

    fn clone_policy(&self) -> Box<dyn TriggerPolicy> {
        Box::new(RecordingPolicy::new(self.tag.clone(), self.log.clone()))
    }
}

/// Action whose preconditions fail with a fixed issue list
pub struct UnavailableEquipment {
    pub issues: Vec<String>,
    pub log: ExecutionLog,
    found: IssueList,
}

impl UnavailableEquipment {
    pub fn new(issues: Vec<String>, log: ExecutionLog) -> Self {
        Self {
            issues,
            log,
            found: IssueList::new(),
        }
    }
}

impl Validatable for UnavailableEquipment {
    fn validate(&self) -> bool {
        self.found.replace(self.issues.clone())
    }

    fn issues(&self) -> Vec<String> {
        self.found.snapshot()
    }
}

#[async_trait]
impl SequenceAction for UnavailableEquipment {
    async fn execute(&self, _: &ProgressSink, _: &CancellationToken) -> ActionResult<()> {
        self.log.push("unreachable");
        Ok(())
    }

    fn clone_action(&self) -> Box<dyn SequenceAction> {
        Box::new(UnavailableEquipment::new(self.issues.clone(), self.log.clone()))
    }

    fn as_validatable(&self) -> Option<&dyn Validatable> {
        Some(self)
    }
}

/// Fires before any item with the given name
pub struct BeforeItemNamed(pub String);

impl TriggerPolicy for BeforeItemNamed {
    fn should_trigger(
        &self,
        _: Option<&dyn SequenceEntity>,
        next: Option<&dyn SequenceEntity>,
    ) -> bool {
        next.is_some_and(|item| item.name() == self.0)
    }

    fn clone_policy(&self) -> Box<dyn TriggerPolicy> {
        Box::new(BeforeItemNamed(self.0.clone()))
    }
}

pub fn recording_item(label: &str, log: &ExecutionLog) -> Arc<dyn SequenceEntity> {
    SequenceItem::new(
        EntityMetadata::new(label),
        RecordingAction {
            label: label.to_string(),
            log: log.clone(),
        },
    )
    .into_entity()
}

pub fn blocking_item(label: &str, action: BlockingAction) -> Arc<dyn SequenceEntity> {
    SequenceItem::new(EntityMetadata::new(label), action).into_entity()
}

pub fn action_item(label: &str, action: impl SequenceAction + 'static) -> Arc<dyn SequenceEntity> {
    SequenceItem::new(EntityMetadata::new(label), action).into_entity()
}
