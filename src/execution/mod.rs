//! # Execution Strategies
//!
//! A container never iterates its children itself. It hands itself to the
//! [`ExecutionStrategy`] chosen at construction, which decides order,
//! concurrency and looping.

pub mod parallel;
pub mod sequential;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::SequenceResult;
use crate::progress::ProgressSink;
use crate::sequence::SequenceContainer;

pub use parallel::ParallelStrategy;
pub use sequential::SequentialStrategy;

/// Iteration discipline of a container
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Drive the container's children to completion. `cancel` is the
    /// container's local token.
    async fn execute(
        &self,
        context: &SequenceContainer,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> SequenceResult<()>;

    fn clone_strategy(&self) -> Box<dyn ExecutionStrategy>;
}

/// Runs `block_teardown` on drop, so it happens on every exit path
pub(crate) struct BlockTeardown<'a> {
    context: &'a SequenceContainer,
}

impl<'a> BlockTeardown<'a> {
    pub(crate) fn new(context: &'a SequenceContainer) -> Self {
        Self { context }
    }
}

impl Drop for BlockTeardown<'_> {
    fn drop(&mut self) {
        self.context.teardown_block();
    }
}
