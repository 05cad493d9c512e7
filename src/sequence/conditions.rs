//! Built-in loop conditions.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use super::condition::SequenceCondition;
use super::entity::SequenceEntity;

/// Repeat the owning block a fixed number of times
#[derive(Debug)]
pub struct LoopCondition {
    iterations: u32,
    completed: AtomicU32,
}

impl LoopCondition {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations,
            completed: AtomicU32::new(0),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn completed(&self) -> u32 {
        self.completed.load(Ordering::Acquire)
    }
}

impl SequenceCondition for LoopCondition {
    fn name(&self) -> &str {
        "loop"
    }

    fn check(&self, _: Option<&dyn SequenceEntity>, _: Option<&dyn SequenceEntity>) -> bool {
        self.completed() < self.iterations
    }

    fn block_finished(&self) {
        self.completed.fetch_add(1, Ordering::AcqRel);
    }

    fn reset_progress(&self) {
        self.completed.store(0, Ordering::Release);
    }

    fn clone_condition(&self) -> Box<dyn SequenceCondition> {
        Box::new(Self::new(self.iterations))
    }
}

/// Keep looping until a wall-clock deadline
#[derive(Debug, Clone)]
pub struct TimeCondition {
    deadline: DateTime<Utc>,
}

impl TimeCondition {
    pub fn new(deadline: DateTime<Utc>) -> Self {
        Self { deadline }
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    /// Time left until the deadline, zero once it has passed
    pub fn remaining(&self) -> Duration {
        (self.deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

impl SequenceCondition for TimeCondition {
    fn name(&self) -> &str {
        "time"
    }

    fn check(&self, _: Option<&dyn SequenceEntity>, next: Option<&dyn SequenceEntity>) -> bool {
        // Don't start something that would overrun the deadline
        let needed = next.map_or(Duration::ZERO, |item| item.estimated_duration());
        let remaining = self.remaining();
        !remaining.is_zero() && needed <= remaining
    }

    fn clone_condition(&self) -> Box<dyn SequenceCondition> {
        Box::new(self.clone())
    }
}

/// Keep looping for a span measured from the first start of the container's run
#[derive(Debug)]
pub struct TimeSpanCondition {
    span: Duration,
    started: Mutex<Option<Instant>>,
}

impl TimeSpanCondition {
    pub fn new(span: Duration) -> Self {
        Self {
            span,
            started: Mutex::new(None),
        }
    }

    pub fn span(&self) -> Duration {
        self.span
    }

    pub fn elapsed(&self) -> Duration {
        self.started
            .lock()
            .map_or(Duration::ZERO, |started| started.elapsed())
    }
}

impl SequenceCondition for TimeSpanCondition {
    fn name(&self) -> &str {
        "time_span"
    }

    fn check(&self, _: Option<&dyn SequenceEntity>, _: Option<&dyn SequenceEntity>) -> bool {
        self.elapsed() < self.span
    }

    fn block_initialize(&self) {
        // A resumed run keeps the original start
        self.started.lock().get_or_insert_with(Instant::now);
    }

    fn reset_progress(&self) {
        *self.started.lock() = None;
    }

    fn clone_condition(&self) -> Box<dyn SequenceCondition> {
        Box::new(Self::new(self.span))
    }
}
