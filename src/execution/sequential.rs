use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{BlockTeardown, ExecutionStrategy};
use crate::error::{SequenceError, SequenceResult};
use crate::progress::ProgressSink;
use crate::sequence::{SequenceContainer, SequenceEntity};

/// Run children one at a time in order, repeating the block while the
/// container and all of its ancestors allow it
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialStrategy;

#[async_trait]
impl ExecutionStrategy for SequentialStrategy {
    fn name(&self) -> &'static str {
        "sequential"
    }

    async fn execute(
        &self,
        context: &SequenceContainer,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> SequenceResult<()> {
        context.initialize_block();
        let _teardown = BlockTeardown::new(context);

        let mut previous: Option<Arc<dyn SequenceEntity>> = None;

        loop {
            let Some(next) = context.next_pending() else {
                break;
            };
            if !context.can_continue(previous.as_deref(), Some(next.as_ref())) {
                break;
            }

            debug!(
                container = %context.name(),
                iteration = context.iterations(),
                "Starting block"
            );
            context.start_block();

            let mut pending = None;
            while let Some(next) = context.next_pending() {
                if !context.can_continue(previous.as_deref(), Some(next.as_ref())) {
                    pending = Some(next);
                    break;
                }
                if cancel.is_cancelled() {
                    return Err(SequenceError::Cancelled);
                }

                context
                    .run_triggers(previous.as_deref(), next.as_ref(), progress, cancel)
                    .await?;
                next.run(progress, cancel).await?;
                previous = Some(next);
            }

            context.finish_block();
            let iteration = context.increment_iterations();
            debug!(container = %context.name(), iteration, "Block finished");

            if context.can_continue(previous.as_deref(), pending.as_deref()) {
                context.reset_children();
            }
            tokio::task::yield_now().await;
        }

        context.skip_remaining();
        Ok(())
    }

    fn clone_strategy(&self) -> Box<dyn ExecutionStrategy> {
        Box::new(*self)
    }
}
