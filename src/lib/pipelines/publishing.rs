//! Publishes a task's input triples to the target graph, optionally after
//! executing the diff-deletes. Forward work and rollback each run under
//! their own bounded retry; once the forward retries exhaust, the inserts
//! are compensated away and, in with-deletes mode, the deleted triples
//! restored.

use tokio_util::sync::CancellationToken;

use crate::errors::HarveyError;
use crate::pipelines::execute_diff_deletes::{execute_diff_deletes, rollback_deletes};
use crate::pipelines::{drive_with_rollback, PipelineContext, RetryContext};
use crate::tasks::{Container, Task};

pub async fn run(
    ctx: &PipelineContext,
    task: &Task,
    cancel: &CancellationToken,
    with_deletes: bool,
) {
    drive_with_rollback(
        ctx,
        task,
        "publishing",
        || execute(ctx, task, cancel, with_deletes),
        || rollback(ctx, task, cancel, with_deletes),
    )
    .await
}

async fn execute(
    ctx: &PipelineContext,
    task: &Task,
    cancel: &CancellationToken,
    with_deletes: bool,
) -> Result<(), HarveyError> {
    if with_deletes {
        let retry = RetryContext::from_config(&ctx.config);
        retry
            .run(|| execute_diff_deletes(ctx, task, cancel))
            .await?;
    }

    let retry = RetryContext::from_config(&ctx.config);
    retry.run(|| publish_triples(ctx, task, cancel)).await?;

    let container = Container::fresh();
    ctx.repository
        .append_task_result_graph(task, &container, &ctx.config.target_graph)
        .await?;
    Ok(())
}

/// One whole forward pass: re-read the input, write it to the target
/// graph. Re-reading inside the unit keeps every attempt self-contained.
async fn publish_triples(
    ctx: &PipelineContext,
    task: &Task,
    cancel: &CancellationToken,
) -> Result<(), HarveyError> {
    let triples = ctx.graph.get_triples(task, cancel).await?;
    ctx.graph
        .write_triples_to_graph(
            &ctx.config.target_graph,
            &triples,
            ctx.config.batch_size,
            cancel,
        )
        .await
}

async fn rollback(
    ctx: &PipelineContext,
    task: &Task,
    cancel: &CancellationToken,
    with_deletes: bool,
) -> Result<(), HarveyError> {
    let retry = RetryContext::from_config(&ctx.config);
    retry.run(|| rollback_inserts(ctx, task, cancel)).await?;
    if with_deletes {
        rollback_deletes(ctx, task, cancel).await?;
    }
    Ok(())
}

/// Deletes whatever of the input reached the target graph, skipping
/// statements that resist.
async fn rollback_inserts(
    ctx: &PipelineContext,
    task: &Task,
    cancel: &CancellationToken,
) -> Result<(), HarveyError> {
    let triples = ctx.graph.get_triples(task, cancel).await?;
    ctx.graph
        .delete_triples_from_graph(
            &ctx.config.target_graph,
            &triples,
            ctx.config.batch_size,
            true,
            cancel,
        )
        .await
}
