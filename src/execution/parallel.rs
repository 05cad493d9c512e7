use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{BlockTeardown, ExecutionStrategy};
use crate::error::{SequenceError, SequenceResult};
use crate::logging::log_error;
use crate::progress::{ProgressSink, SourcedProgress};
use crate::sequence::{SequenceContainer, SequenceEntity};

/// Start every child at once and wait for all of them
///
/// Each child runs in its own task. A failed child never stops its
/// siblings. Only an abort cancels the remaining branches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelStrategy;

#[async_trait]
impl ExecutionStrategy for ParallelStrategy {
    fn name(&self) -> &'static str {
        "parallel"
    }

    async fn execute(
        &self,
        context: &SequenceContainer,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> SequenceResult<()> {
        context.initialize_block();
        let _teardown = BlockTeardown::new(context);

        if cancel.is_cancelled() {
            return Err(SequenceError::Cancelled);
        }
        context.start_block();

        let children = context.items();
        let branches = cancel.child_token();
        // Branches live in their own tasks; make sure they stop with us
        let _stop_branches = branches.clone().drop_guard();
        debug!(
            container = %context.name(),
            branches = children.len(),
            "Starting parallel block"
        );

        let mut in_flight = FuturesUnordered::new();
        for child in children {
            let sink = SourcedProgress::sink(child.name(), progress.clone());
            let branch = branches.clone();
            in_flight.push(tokio::spawn(async move {
                let result = child.run(&sink, &branch).await;
                (child, result)
            }));
        }

        let mut failure: Option<SequenceError> = None;
        while let Some(joined) = in_flight.next().await {
            let (child, result) = match joined {
                Ok(branch) => branch,
                Err(err) => {
                    log_error(
                        "parallel_strategy",
                        "join_branch",
                        &err.to_string(),
                        Some(context.name()),
                    );
                    continue;
                }
            };
            let Err(err) = result else {
                continue;
            };
            if matches!(err, SequenceError::Aborted { .. }) {
                warn!(
                    container = %context.name(),
                    child = %child.name(),
                    error = %err,
                    "Parallel branch aborted the run, cancelling siblings"
                );
                branches.cancel();
            }
            // An abort explains the cancellations it causes, so it wins
            failure = match failure {
                Some(existing @ SequenceError::Aborted { .. }) => Some(existing),
                _ => Some(err),
            };
        }

        if let Some(err) = failure {
            return Err(err);
        }

        context.finish_block();
        context.increment_iterations();
        Ok(())
    }

    fn clone_strategy(&self) -> Box<dyn ExecutionStrategy> {
        Box::new(*self)
    }
}
