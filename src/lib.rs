#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Sequencer Core
//!
//! Hierarchical sequence execution engine for observation plans.
//!
//! ## Overview
//!
//! A sequence is a tree of runnable nodes. Leaf [`SequenceItem`]s wrap
//! application actions ("switch filter", "expose", "wait for dawn");
//! [`SequenceContainer`]s group them, loop over them while their conditions
//! allow, and fire [`SequenceTrigger`]s ("dither every N exposures") between
//! items.
//!
//! ## Key Features
//!
//! - **Typed lifecycle**: every node owns an [`EntityStateMachine`]
//! - **Pluggable iteration**: sequential or parallel [`ExecutionStrategy`] per container
//! - **Cascading triggers**: evaluated from the innermost container up to the root before each item
//! - **Two-level cancellation**: skipping one step never aborts the run, and a
//!   cancelled run resumes where it stopped
//! - **Configurable failure policy**: continue, retry or abort the run
//!
//! ## Module Organization
//!
//! - [`sequence`] - Items, containers, conditions and triggers
//! - [`execution`] - Sequential and parallel strategies
//! - [`orchestration`] - The [`SequenceRunner`] run façade
//! - [`state_machine`] - Entity status lifecycle
//! - [`progress`] - Progress reporting and broadcast publishing
//! - [`config`] - Layered engine configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use sequencer_core::error::ActionResult;
//! use sequencer_core::progress::ProgressSink;
//! use sequencer_core::sequence::{EntityMetadata, LoopCondition, SequenceAction, SequenceContainer, SequenceItem};
//! use sequencer_core::SequenceRunner;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Expose;
//!
//! #[async_trait]
//! impl SequenceAction for Expose {
//!     async fn execute(&self, _: &ProgressSink, _: &CancellationToken) -> ActionResult<()> {
//!         Ok(())
//!     }
//!
//!     fn clone_action(&self) -> Box<dyn SequenceAction> {
//!         Box::new(Expose)
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let root = SequenceContainer::sequential(EntityMetadata::new("Target"));
//! root.add(SequenceItem::new(EntityMetadata::new("Expose"), Expose).into_entity())?;
//! root.add_condition(LoopCondition::new(10));
//!
//! let runner = SequenceRunner::with_defaults(root)?;
//! let summary = runner.run().await?;
//! println!("{:?}", summary.outcome);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod execution;
pub mod logging;
pub mod orchestration;
pub mod progress;
pub mod sequence;
pub mod state_machine;
pub mod validation;

pub use config::{ConfigManager, EngineConfig, ErrorBehavior, LoggingConfig};
pub use error::{ActionError, ActionResult, SequenceError, SequenceResult};
pub use execution::{ExecutionStrategy, ParallelStrategy, SequentialStrategy};
pub use orchestration::{RunOutcome, RunSummary, SequenceRunner, StatusCounts};
pub use progress::{ApplicationStatus, ProgressReporter, ProgressSink};
pub use sequence::{
    EntityMetadata, SequenceAction, SequenceCondition, SequenceContainer, SequenceEntity,
    SequenceItem, SequenceTrigger, TriggerPolicy,
};
pub use state_machine::{EntityEvent, EntityStateMachine, EntityStatus};
pub use validation::{Validatable, ValidationIssue};
