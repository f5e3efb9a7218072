//! Routes loaded tasks to their pipelines. One run lock serializes every
//! trigger path (delta notifications, startup resume, manual retries), so
//! two tasks never run concurrently.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::errors::HarveyError;
use crate::pipelines::{
    add_harvesting_tag, add_uuids, add_vendor_tag, execute_diff_deletes, importing, mirroring,
    publishing, PipelineContext,
};
use crate::tasks::{Operation, Task};

pub struct Dispatcher {
    ctx: PipelineContext,
    run_lock: Mutex<()>,
    timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(ctx: PipelineContext) -> Dispatcher {
        let timeout = ctx.config.task_timeout();
        Dispatcher {
            ctx,
            run_lock: Mutex::new(()),
            timeout,
        }
    }

    /// Resolves a notified or forced URI and runs the matching pipeline.
    /// URIs that are not tasks are skipped silently; store errors are
    /// logged and never escape to the caller.
    pub async fn dispatch_uri(&self, uri: &str) {
        if let Err(e) = self.try_dispatch(uri).await {
            log::error!("dispatch of <{uri}> failed: {e}");
        }
    }

    async fn try_dispatch(&self, uri: &str) -> Result<(), HarveyError> {
        if !self.ctx.repository.is_task(uri).await? {
            log::debug!("<{uri}> is not a task, awaiting the next notification");
            return Ok(());
        }
        match self.ctx.repository.load_task(uri).await? {
            Some(task) => self.dispatch_task(&task).await,
            None => log::debug!("task <{uri}> could not be loaded, skipping"),
        }
        Ok(())
    }

    /// Runs the task's pipeline under the shared run lock. With a
    /// configured timeout the pipeline races a timer; on expiry the
    /// cancellation token fires and the run unwinds at its next
    /// checkpoint, recording the failure without any rollback.
    pub async fn dispatch_task(&self, task: &Task) {
        if let Operation::Unsupported(operation) = &task.operation {
            log::warn!(
                "no pipeline registered for operation <{operation}> of task <{}>, skipping",
                task.uri
            );
            return;
        }

        let _guard = self.run_lock.lock().await;
        log::info!("starting {:?} for task <{}>", task.operation, task.uri);

        let cancel = CancellationToken::new();
        match self.timeout {
            None => self.route(task, &cancel).await,
            Some(limit) => {
                let pipeline = self.route(task, &cancel);
                tokio::pin!(pipeline);
                tokio::select! {
                    () = &mut pipeline => {}
                    () = tokio::time::sleep(limit) => {
                        log::warn!("task <{}> exceeded {limit:?}, cancelling", task.uri);
                        cancel.cancel();
                        // A call already inside the store cannot be
                        // interrupted; the pipeline exits at the next
                        // checkpoint and records the failure itself.
                        pipeline.await;
                    }
                }
            }
        }
    }

    async fn route(&self, task: &Task, cancel: &CancellationToken) {
        match &task.operation {
            Operation::Mirroring => mirroring::run(&self.ctx, task, cancel).await,
            Operation::AddUuids => add_uuids::run(&self.ctx, task, cancel).await,
            Operation::AddHarvestingTag => {
                add_harvesting_tag::run(&self.ctx, task, cancel).await
            }
            Operation::AddVendorTag => add_vendor_tag::run(&self.ctx, task, cancel).await,
            Operation::Importing => importing::run(&self.ctx, task, cancel).await,
            Operation::Publish => publishing::run(&self.ctx, task, cancel, false).await,
            Operation::PublishWithDeletes => {
                publishing::run(&self.ctx, task, cancel, true).await
            }
            Operation::ExecuteDiffDeletes => {
                execute_diff_deletes::run(&self.ctx, task, cancel).await
            }
            Operation::Unsupported(operation) => {
                log::warn!(
                    "no pipeline registered for operation <{operation}> of task <{}>, skipping",
                    task.uri
                );
            }
        }
    }

    /// Feeds every task still busy or scheduled through the regular
    /// dispatch path. Called at startup and from the manual resume
    /// endpoint.
    pub async fn resume_unfinished(&self) {
        match self.ctx.repository.get_unfinished_tasks().await {
            Ok(tasks) => {
                log::info!("found {} unfinished tasks to resume", tasks.len());
                for uri in tasks {
                    self.dispatch_uri(&uri).await;
                }
            }
            Err(e) => log::error!("could not enumerate unfinished tasks: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::pipelines::testing::status_sequence;
    use crate::sparql::mock::{
        literal_binding, select_response, uri_binding, MockSparqlClient,
    };
    use crate::vocab;
    use std::io::Write;
    use std::sync::Arc;

    fn dispatcher_with(client: Arc<MockSparqlClient>, config: Config) -> Dispatcher {
        Dispatcher::new(PipelineContext::new(
            Arc::new(config),
            client.clone(),
            client,
        ))
    }

    fn test_config(share_folder: std::path::PathBuf) -> Config {
        Config {
            share_folder,
            sleep_time: 0,
            retry_wait_interval: 0,
            max_retries: 3,
            target_graph: "http://a.example/graphs/target".to_string(),
            ..Config::default()
        }
    }

    fn scalar_row(status: &str, operation: &str) -> serde_json::Value {
        select_response(&[&[
            ("graph", uri_binding("http://a.example/graphs/tasks")),
            ("id", literal_binding("4c2b3fde-0001-4c6e-9e7a-000000000001")),
            ("job", uri_binding("http://a.example/jobs/1")),
            ("created", literal_binding("2026-01-05T09:00:00.000Z")),
            ("modified", literal_binding("2026-01-05T09:05:00.000Z")),
            ("status", uri_binding(status)),
            ("index", literal_binding("0")),
            ("operation", uri_binding(operation)),
        ]])
    }

    #[tokio::test]
    async fn unrelated_uris_are_skipped_silently() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(MockSparqlClient::new());
        let dispatcher = dispatcher_with(client.clone(), test_config(dir.path().to_path_buf()));

        dispatcher.dispatch_uri("http://a.example/not-a-task").await;

        assert!(client.recorded_updates().is_empty());
        assert_eq!(client.recorded_queries().len(), 1);
    }

    #[tokio::test]
    async fn unknown_operations_leave_the_status_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(
            MockSparqlClient::new()
                .respond_bool("ASK", true)
                .respond(
                    "SELECT DISTINCT ?graph",
                    scalar_row(vocab::STATUS_SCHEDULED, "http://a.example/op/frobnicate"),
                ),
        );
        let dispatcher = dispatcher_with(client.clone(), test_config(dir.path().to_path_buf()));

        dispatcher.dispatch_uri("http://a.example/tasks/1").await;

        assert!(client.recorded_updates().is_empty());
    }

    #[tokio::test]
    async fn force_retrying_a_failed_task_keeps_prior_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = std::fs::File::create(dir.path().join("input.ttl")).unwrap();
        writeln!(
            input,
            "<http://x.example/thing> <http://x.example/p> \"v\" ."
        )
        .unwrap();
        let client = Arc::new(
            MockSparqlClient::new()
                .respond_bool("ASK", true)
                .respond(
                    "SELECT DISTINCT ?graph",
                    scalar_row(vocab::STATUS_FAILED, vocab::OP_MIRRORING),
                )
                .respond(
                    "nie:dataSource",
                    select_response(&[&[
                        ("path", uri_binding("share://input.ttl")),
                        ("file", uri_binding("http://a.example/files/input")),
                    ]]),
                ),
        );
        let dispatcher = dispatcher_with(client.clone(), test_config(dir.path().to_path_buf()));

        dispatcher.dispatch_uri("http://a.example/tasks/1").await;

        let updates = client.recorded_updates();
        assert_eq!(
            status_sequence(&updates),
            vec![vocab::STATUS_BUSY, vocab::STATUS_SUCCESS]
        );
        // Nothing detached the previously accumulated Error entities and
        // this run succeeded, so no new one was appended either.
        assert!(!updates.iter().any(|u| u.contains("task:error")));
    }

    #[tokio::test]
    async fn a_timed_out_run_is_failed_without_rollback() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = std::fs::File::create(dir.path().join("input.ttl")).unwrap();
        writeln!(
            input,
            "<http://x.example/thing> <http://x.example/p> \"v\" ."
        )
        .unwrap();
        let client = Arc::new(
            MockSparqlClient::new()
                .respond(
                    "nie:dataSource",
                    select_response(&[&[
                        ("path", uri_binding("share://input.ttl")),
                        ("file", uri_binding("http://a.example/files/input")),
                    ]]),
                )
                .with_query_delay(Duration::from_millis(50)),
        );
        let config = Config {
            // A hair over three milliseconds; the delayed store call
            // outlives it comfortably.
            task_timeout_hours: 1e-6,
            ..test_config(dir.path().to_path_buf())
        };
        let dispatcher = dispatcher_with(client.clone(), config);
        let task = Task::stub(Operation::Importing);

        dispatcher.dispatch_task(&task).await;

        let updates = client.recorded_updates();
        assert_eq!(
            status_sequence(&updates),
            vec![vocab::STATUS_BUSY, vocab::STATUS_FAILED]
        );
        // No rollback: nothing was deleted from the target graph.
        assert!(!updates.iter().any(|u| u.starts_with("DELETE DATA")));
        assert!(updates.iter().any(|u| u.contains("cancelled")));
    }

    #[tokio::test]
    async fn resume_feeds_every_unfinished_task_through_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(
            MockSparqlClient::new().respond(
                "VALUES ?status",
                select_response(&[
                    &[("task", uri_binding("http://a.example/tasks/1"))],
                    &[("task", uri_binding("http://a.example/tasks/2"))],
                ]),
            ),
        );
        let dispatcher = dispatcher_with(client.clone(), test_config(dir.path().to_path_buf()));

        dispatcher.resume_unfinished().await;

        // One unfinished-tasks query plus one is-task probe per result.
        let queries = client.recorded_queries();
        let probes = queries.iter().filter(|q| q.trim_start().starts_with("ASK")).count();
        assert_eq!(probes, 2);
    }

    #[test]
    fn a_zero_timeout_builds_no_timer() {
        let config = Config::default();
        assert_eq!(config.task_timeout_hours, 0.0);
        let client = Arc::new(MockSparqlClient::new());
        let dispatcher = dispatcher_with(client, test_config(std::path::PathBuf::from("/share")));
        assert!(dispatcher.timeout.is_none());
    }
}
