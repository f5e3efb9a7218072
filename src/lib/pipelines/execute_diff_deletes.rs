//! Removes the triples an upstream differencing step marked invalid. The
//! removal files are streamed in bounded batches, every batch deleted from
//! the target graph under the whole-operation retry. The rollback
//! restores the deleted triples.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::errors::HarveyError;
use crate::graph::{BatchSink, DEFAULT_LINE_BUFFER};
use crate::pipelines::{drive_with_rollback, PipelineContext, RetryContext};
use crate::rdf::Triple;
use crate::tasks::{Container, Task};

pub async fn run(ctx: &PipelineContext, task: &Task, cancel: &CancellationToken) {
    drive_with_rollback(
        ctx,
        task,
        "diff-deletes",
        || execute(ctx, task, cancel),
        || rollback_deletes(ctx, task, cancel),
    )
    .await
}

async fn execute(
    ctx: &PipelineContext,
    task: &Task,
    cancel: &CancellationToken,
) -> Result<(), HarveyError> {
    let retry = RetryContext::from_config(&ctx.config);
    retry
        .run(|| execute_diff_deletes(ctx, task, cancel))
        .await?;

    let container = Container::fresh();
    ctx.repository
        .append_task_result_graph(task, &container, &ctx.config.target_graph)
        .await?;
    Ok(())
}

/// One whole pass over the removal files, deleting batch by batch.
/// Shared with the publishing pipeline's with-deletes mode.
pub(crate) async fn execute_diff_deletes(
    ctx: &PipelineContext,
    task: &Task,
    cancel: &CancellationToken,
) -> Result<(), HarveyError> {
    let mut sink = DeleteSink { ctx, cancel };
    ctx.graph
        .get_deleted_triples_in_file_and_apply_by_batch(task, cancel, DEFAULT_LINE_BUFFER, &mut sink)
        .await
}

/// Re-inserts the removal triples, one whole-operation retry loop of its
/// own. Shared with the publishing pipeline's rollback.
pub(crate) async fn rollback_deletes(
    ctx: &PipelineContext,
    task: &Task,
    cancel: &CancellationToken,
) -> Result<(), HarveyError> {
    let retry = RetryContext::from_config(&ctx.config);
    retry
        .run(|| async {
            let mut sink = RestoreSink { ctx, cancel };
            ctx.graph
                .get_deleted_triples_in_file_and_apply_by_batch(
                    task,
                    cancel,
                    DEFAULT_LINE_BUFFER,
                    &mut sink,
                )
                .await
        })
        .await
}

struct DeleteSink<'a> {
    ctx: &'a PipelineContext,
    cancel: &'a CancellationToken,
}

#[async_trait]
impl BatchSink for DeleteSink<'_> {
    async fn apply(&mut self, batch: Vec<Triple>, _derived_from: &str) -> Result<(), HarveyError> {
        self.ctx
            .graph
            .delete_triples_from_graph(
                &self.ctx.config.target_graph,
                &batch,
                self.ctx.config.batch_size,
                false,
                self.cancel,
            )
            .await
    }
}

struct RestoreSink<'a> {
    ctx: &'a PipelineContext,
    cancel: &'a CancellationToken,
}

#[async_trait]
impl BatchSink for RestoreSink<'_> {
    async fn apply(&mut self, batch: Vec<Triple>, _derived_from: &str) -> Result<(), HarveyError> {
        self.ctx
            .graph
            .write_triples_to_graph(
                &self.ctx.config.target_graph,
                &batch,
                self.ctx.config.batch_size,
                self.cancel,
            )
            .await
    }
}
