//! # Run Orchestration
//!
//! [`SequenceRunner`] owns a root container for the lifetime of a run: it
//! installs the configured error policy, publishes progress to subscribers,
//! holds the run-wide cancellation token and summarizes the outcome.

pub mod sequence_runner;

pub use sequence_runner::{RunOutcome, RunSummary, SequenceRunner, StatusCounts};
