//! Complements harvested resources with `mu:uuid` identifiers. Additive
//! and convergent across re-runs, so no rollback is defined.

use tokio_util::sync::CancellationToken;

use crate::errors::HarveyError;
use crate::pipelines::{drive, PipelineContext};
use crate::rdf::triples_to_ntriples;
use crate::tasks::{Container, Task};

pub async fn run(ctx: &PipelineContext, task: &Task, cancel: &CancellationToken) {
    drive(ctx, task, "add-uuids", || execute(ctx, task, cancel)).await
}

async fn execute(
    ctx: &PipelineContext,
    task: &Task,
    cancel: &CancellationToken,
) -> Result<(), HarveyError> {
    let triples = ctx.graph.get_triples(task, cancel).await?;
    let complemented = ctx.uuids.add_uuids(&triples).await?;
    log::debug!(
        "complemented {} input triples to {} for task <{}>",
        triples.len(),
        complemented.len(),
        task.uri
    );
    let content = triples_to_ntriples(&complemented);

    let written = ctx
        .files
        .write_ttl_file(&task.graph, &content, "complemented-triples.ttl", None)
        .await?;
    let file_container = Container::for_task(task);
    ctx.repository
        .append_task_result_file(task, &file_container, &written.logical_uri)
        .await?;

    let graph_container = Container::fresh();
    ctx.repository
        .append_task_result_graph(task, &graph_container, &file_container.uri)
        .await?;
    Ok(())
}
