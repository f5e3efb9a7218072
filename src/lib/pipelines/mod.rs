//! The pipeline set. Every pipeline follows the same four-phase contract:
//! mark busy, transform, mark success; on error run the compensating
//! rollback where one is defined, append an Error entity and mark failed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::canon::{UriMirror, UuidAssigner};
use crate::errors::HarveyError;
use crate::files::FileEngine;
use crate::graph::GraphEngine;
use crate::sparql::SparqlClient;
use crate::tasks::{Task, TaskRepository, TaskStatus};

pub mod add_harvesting_tag;
pub mod add_uuids;
pub mod add_vendor_tag;
pub mod execute_diff_deletes;
pub mod importing;
pub mod mirroring;
pub mod publishing;

/// Everything a pipeline needs, wired once at startup.
pub struct PipelineContext {
    pub config: Arc<Config>,
    pub repository: TaskRepository,
    pub graph: GraphEngine,
    pub files: FileEngine,
    pub mirror: UriMirror,
    pub uuids: UuidAssigner,
}

impl PipelineContext {
    pub fn new(
        config: Arc<Config>,
        client: Arc<dyn SparqlClient>,
        batch_client: Arc<dyn SparqlClient>,
    ) -> PipelineContext {
        PipelineContext {
            repository: TaskRepository::new(client.clone()),
            graph: GraphEngine::new(
                client.clone(),
                batch_client,
                config.share_folder.clone(),
                config.sleep_time(),
            ),
            files: FileEngine::new(client.clone(), config.share_folder.clone()),
            mirror: UriMirror::new(client.clone(), config.clone()),
            uuids: UuidAssigner::new(client),
            config,
        }
    }
}

/// Bounded fixed-interval retry for a whole unit of work. Forward
/// operations and their rollbacks each get their own context; nothing is
/// counted on shared state.
#[derive(Clone, Copy, Debug)]
pub struct RetryContext {
    max_attempts: u32,
    interval: Duration,
}

impl RetryContext {
    pub fn new(max_attempts: u32, interval: Duration) -> RetryContext {
        RetryContext {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    pub fn from_config(config: &Config) -> RetryContext {
        RetryContext::new(config.max_retries, config.retry_wait_interval())
    }

    /// Runs the unit up to `max_attempts` times, sleeping the fixed
    /// interval between attempts. Cancellation is never retried.
    pub async fn run<F, Fut>(&self, mut unit: F) -> Result<(), HarveyError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), HarveyError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match unit().await {
                Ok(()) => return Ok(()),
                Err(HarveyError::Cancelled) => return Err(HarveyError::Cancelled),
                Err(e) if attempt >= self.max_attempts => {
                    return Err(HarveyError::RetryExhausted {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    log::warn!(
                        "attempt {attempt}/{} failed, retrying in {:?}: {e}",
                        self.max_attempts,
                        self.interval
                    );
                    tokio::time::sleep(self.interval).await;
                }
            }
        }
    }
}

/// Lifecycle driver for pipelines without a compensating action.
pub(crate) async fn drive<Fwd, FwdFut>(
    ctx: &PipelineContext,
    task: &Task,
    name: &str,
    forward: Fwd,
) where
    Fwd: FnOnce() -> FwdFut,
    FwdFut: Future<Output = Result<(), HarveyError>>,
{
    if !mark_busy(ctx, task, name).await {
        return;
    }
    match forward().await {
        Ok(()) => mark_success(ctx, task, name).await,
        Err(e) => {
            log::error!("{name} failed for task <{}>: {e}", task.uri);
            record_failure(ctx, task, &e).await;
        }
    }
}

/// Lifecycle driver for pipelines with a compensating action. The
/// rollback is best effort: its own failure is logged and nothing more,
/// there is no tertiary recovery. After cancellation the rollback is
/// skipped entirely, since the store state mid-abort is unknown.
pub(crate) async fn drive_with_rollback<Fwd, FwdFut, Rb, RbFut>(
    ctx: &PipelineContext,
    task: &Task,
    name: &str,
    forward: Fwd,
    rollback: Rb,
) where
    Fwd: FnOnce() -> FwdFut,
    FwdFut: Future<Output = Result<(), HarveyError>>,
    Rb: FnOnce() -> RbFut,
    RbFut: Future<Output = Result<(), HarveyError>>,
{
    if !mark_busy(ctx, task, name).await {
        return;
    }
    match forward().await {
        Ok(()) => mark_success(ctx, task, name).await,
        Err(e) => {
            log::error!("{name} failed for task <{}>: {e}", task.uri);
            if matches!(e, HarveyError::Cancelled) {
                log::warn!(
                    "skipping rollback for task <{}> after cancellation",
                    task.uri
                );
            } else if let Err(rollback_error) = rollback().await {
                log::error!(
                    "rollback of {name} failed for task <{}>: {rollback_error}",
                    task.uri
                );
            }
            record_failure(ctx, task, &e).await;
        }
    }
}

async fn mark_busy(ctx: &PipelineContext, task: &Task, name: &str) -> bool {
    match ctx
        .repository
        .update_task_status(task, TaskStatus::Busy)
        .await
    {
        Ok(()) => true,
        Err(e) => {
            log::error!("could not mark task <{}> busy for {name}: {e}", task.uri);
            false
        }
    }
}

async fn mark_success(ctx: &PipelineContext, task: &Task, name: &str) {
    if let Err(e) = ctx
        .repository
        .update_task_status(task, TaskStatus::Success)
        .await
    {
        log::error!(
            "could not mark task <{}> successful after {name}: {e}",
            task.uri
        );
    }
}

async fn record_failure(ctx: &PipelineContext, task: &Task, cause: &HarveyError) {
    if let Err(e) = ctx
        .repository
        .append_task_error(task, &cause.to_string())
        .await
    {
        log::error!("could not append error to task <{}>: {e}", task.uri);
    }
    if let Err(e) = ctx
        .repository
        .update_task_status(task, TaskStatus::Failed)
        .await
    {
        log::error!("could not mark task <{}> failed: {e}", task.uri);
    }
}
