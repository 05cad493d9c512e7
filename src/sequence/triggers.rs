//! Built-in trigger policies.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::entity::SequenceEntity;
use super::trigger::TriggerPolicy;

/// Source of a monotonically growing count, e.g. the exposure history
pub trait CountSource: Send + Sync {
    fn count(&self) -> usize;
}

/// Shared counter usable as a [`CountSource`]
#[derive(Debug, Clone, Default)]
pub struct HistoryCounter {
    count: Arc<AtomicUsize>,
}

impl HistoryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more entry, returning the new count
    pub fn record(&self) -> usize {
        self.count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn set(&self, count: usize) {
        self.count.store(count, Ordering::Release);
    }
}

impl CountSource for HistoryCounter {
    fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

/// Fire every `every` new entries of a count source
///
/// Fires when the count is a positive multiple of `every` and has grown since
/// the last firing.
pub struct AfterCountTrigger {
    every: usize,
    source: Arc<dyn CountSource>,
    last_triggered: AtomicUsize,
}

impl AfterCountTrigger {
    pub fn new(every: usize, source: Arc<dyn CountSource>) -> Self {
        Self {
            every,
            source,
            last_triggered: AtomicUsize::new(0),
        }
    }

    pub fn every(&self) -> usize {
        self.every
    }

    /// Count observed at the last firing
    pub fn last_triggered(&self) -> usize {
        self.last_triggered.load(Ordering::Acquire)
    }
}

impl TriggerPolicy for AfterCountTrigger {
    fn should_trigger(
        &self,
        _: Option<&dyn SequenceEntity>,
        _: Option<&dyn SequenceEntity>,
    ) -> bool {
        if self.every == 0 {
            return false;
        }
        let count = self.source.count();
        count > 0 && count % self.every == 0 && count > self.last_triggered()
    }

    fn on_triggered(&self) {
        self.last_triggered
            .store(self.source.count(), Ordering::Release);
    }

    fn clone_policy(&self) -> Box<dyn TriggerPolicy> {
        Box::new(Self::new(self.every, self.source.clone()))
    }
}

/// Fire once `interval` has passed since the last firing
///
/// The clock starts the first time a block begins. The next item's estimated
/// duration counts as already elapsed, so the trigger fires before an item
/// that would otherwise overrun the interval.
#[derive(Debug)]
pub struct IntervalTrigger {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl IntervalTrigger {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl TriggerPolicy for IntervalTrigger {
    fn should_trigger(
        &self,
        _: Option<&dyn SequenceEntity>,
        next: Option<&dyn SequenceEntity>,
    ) -> bool {
        let Some(last) = *self.last.lock() else {
            return false;
        };
        let upcoming = next.map_or(Duration::ZERO, |item| item.estimated_duration());
        last.elapsed() + upcoming >= self.interval
    }

    fn on_triggered(&self) {
        *self.last.lock() = Some(Instant::now());
    }

    fn block_initialize(&self) {
        let mut last = self.last.lock();
        if last.is_none() {
            *last = Some(Instant::now());
        }
    }

    fn reset_progress(&self) {
        *self.last.lock() = None;
    }

    fn clone_policy(&self) -> Box<dyn TriggerPolicy> {
        Box::new(Self::new(self.interval))
    }
}
