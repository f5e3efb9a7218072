//! Copies a task's input triples into the target graph. Moving data
//! between graphs goes through batched inserts because the store rejects
//! single statements of unbounded size. On failure the inserted triples
//! are compensated away again.

use tokio_util::sync::CancellationToken;

use crate::errors::HarveyError;
use crate::pipelines::{drive_with_rollback, PipelineContext};
use crate::tasks::{Container, Task};

pub async fn run(ctx: &PipelineContext, task: &Task, cancel: &CancellationToken) {
    drive_with_rollback(
        ctx,
        task,
        "importing",
        || execute(ctx, task, cancel),
        || rollback(ctx, task, cancel),
    )
    .await
}

async fn execute(
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
        .await?;

    let container = Container::fresh();
    ctx.repository
        .append_task_result_graph(task, &container, &ctx.config.target_graph)
        .await?;
    Ok(())
}

/// Best-effort compensation: whatever of the input made it into the
/// target graph is deleted again, skipping statements that resist.
async fn rollback(
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::testing::{context_with, status_sequence};
    use crate::sparql::mock::{select_response, uri_binding, MockSparqlClient};
    use crate::tasks::Operation;
    use crate::vocab;
    use std::io::Write;
    use std::sync::Arc;

    fn write_input(dir: &std::path::Path) {
        let mut input = std::fs::File::create(dir.join("input.ttl")).unwrap();
        writeln!(
            input,
            "<http://x.example/thing> <http://x.example/p> \"v\" ."
        )
        .unwrap();
    }

    fn file_response() -> serde_json::Value {
        select_response(&[&[
            ("path", uri_binding("share://input.ttl")),
            ("file", uri_binding("http://a.example/files/input")),
        ]])
    }

    #[tokio::test]
    async fn input_lands_in_the_target_graph() {
        let dir = tempfile::tempdir().unwrap();
        write_input(dir.path());
        let client = Arc::new(
            MockSparqlClient::new().respond("nie:dataSource", file_response()),
        );
        let ctx = context_with(client.clone(), dir.path().to_path_buf());
        let task = Task::stub(Operation::Importing);
        let cancel = CancellationToken::new();

        run(&ctx, &task, &cancel).await;

        let updates = client.recorded_updates();
        assert_eq!(
            status_sequence(&updates),
            vec![vocab::STATUS_BUSY, vocab::STATUS_SUCCESS]
        );
        assert!(updates.iter().any(|u| {
            u.starts_with("INSERT DATA")
                && u.contains("http://a.example/graphs/target")
                && u.contains("<http://x.example/thing>")
        }));
        assert!(updates
            .iter()
            .any(|u| u.contains("task:hasGraph") && u.contains("http://a.example/graphs/target")));
    }

    #[tokio::test]
    async fn a_failed_import_is_rolled_back_with_deletes() {
        let dir = tempfile::tempdir().unwrap();
        write_input(dir.path());
        let client = Arc::new(
            MockSparqlClient::new()
                .respond("nie:dataSource", file_response())
                .fail_updates_when(|stmt| stmt.starts_with("INSERT DATA")),
        );
        let ctx = context_with(client.clone(), dir.path().to_path_buf());
        let task = Task::stub(Operation::Importing);
        let cancel = CancellationToken::new();

        run(&ctx, &task, &cancel).await;

        let updates = client.recorded_updates();
        assert_eq!(
            status_sequence(&updates),
            vec![vocab::STATUS_BUSY, vocab::STATUS_FAILED]
        );
        // The compensation issued deletes against the target graph.
        assert!(updates.iter().any(|u| {
            u.starts_with("DELETE DATA") && u.contains("http://a.example/graphs/target")
        }));
        assert!(updates.iter().any(|u| u.contains("oslc:message")));
    }
}
