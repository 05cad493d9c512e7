//! # Sequence Tree
//!
//! The runnable nodes of a sequence: leaf [`SequenceItem`]s wrapping user
//! actions, composite [`SequenceContainer`]s, loop [`SequenceCondition`]s and
//! event-driven [`SequenceTrigger`]s.
//!
//! Every node shares the [`SequenceEntity`] capability set. Children hold only
//! a weak reference to their container, so the tree is owned top-down.

pub mod condition;
pub mod conditions;
pub mod container;
pub mod entity;
pub mod item;
pub mod trigger;
pub mod triggers;

pub use condition::SequenceCondition;
pub use conditions::{LoopCondition, TimeCondition, TimeSpanCondition};
pub use container::{RunningItem, SequenceContainer};
pub use entity::{EntityMetadata, SequenceEntity};
pub use item::{SequenceAction, SequenceItem};
pub use trigger::{SequenceTrigger, TriggerPolicy};
pub use triggers::{AfterCountTrigger, CountSource, HistoryCounter, IntervalTrigger};
