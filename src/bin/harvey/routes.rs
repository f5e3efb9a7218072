use std::sync::Arc;

use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{get, post, State};
use serde::Deserialize;

use harveylib::dispatcher::Dispatcher;
use harveylib::vocab;

use crate::errors::AppError;

#[derive(Debug, Deserialize)]
pub struct Changeset {
    #[serde(default)]
    inserts: Vec<DeltaTriple>,
}

#[derive(Debug, Deserialize)]
pub struct DeltaTriple {
    subject: DeltaTerm,
    predicate: DeltaTerm,
    object: DeltaTerm,
}

#[derive(Debug, Deserialize)]
pub struct DeltaTerm {
    value: String,
}

#[derive(Debug, Deserialize)]
pub struct ForceRetry {
    uri: Option<String>,
}

#[get("/")]
pub fn index() -> &'static str {
    "Hello, you have reached harvey."
}

/// The delta notifier does not care about the outcome. Acknowledge right
/// away and feed the interesting subjects to the dispatcher in the
/// background.
#[post("/delta", format = "json", data = "<changesets>")]
pub fn delta(changesets: Json<Vec<Changeset>>, dispatcher: &State<Arc<Dispatcher>>) -> Status {
    let subjects = scheduled_subjects(changesets.into_inner());
    if subjects.is_empty() {
        log::debug!("delta contained no tasks of interest, awaiting the next batch");
        return Status::NoContent;
    }
    let dispatcher = dispatcher.inner().clone();
    rocket::tokio::spawn(async move {
        for subject in subjects {
            dispatcher.dispatch_uri(&subject).await;
        }
    });
    Status::Ok
}

/// Subjects of inserts that flip a status to scheduled.
fn scheduled_subjects(changesets: Vec<Changeset>) -> Vec<String> {
    changesets
        .into_iter()
        .flat_map(|changeset| changeset.inserts)
        .filter(|insert| insert.predicate.value == vocab::ADMS_STATUS)
        .filter(|insert| insert.object.value == vocab::STATUS_SCHEDULED)
        .map(|insert| insert.subject.value)
        .collect()
}

#[post("/find-and-start-unfinished-tasks")]
pub fn find_and_start_unfinished_tasks(dispatcher: &State<Arc<Dispatcher>>) -> Status {
    let dispatcher = dispatcher.inner().clone();
    rocket::tokio::spawn(async move { dispatcher.resume_unfinished().await });
    Status::Accepted
}

#[post("/force-retry-task", format = "json", data = "<body>")]
pub fn force_retry_task(
    body: Json<ForceRetry>,
    dispatcher: &State<Arc<Dispatcher>>,
) -> Result<Status, AppError> {
    let uri = body
        .into_inner()
        .uri
        .ok_or(AppError::HttpError(Status::BadRequest))?;
    let dispatcher = dispatcher.inner().clone();
    rocket::tokio::spawn(async move { dispatcher.dispatch_uri(&uri).await });
    Ok(Status::Accepted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(subject: &str, predicate: &str, object: &str) -> DeltaTriple {
        DeltaTriple {
            subject: DeltaTerm {
                value: subject.to_string(),
            },
            predicate: DeltaTerm {
                value: predicate.to_string(),
            },
            object: DeltaTerm {
                value: object.to_string(),
            },
        }
    }

    #[test]
    fn only_scheduled_status_inserts_are_interesting() {
        let changesets = vec![
            Changeset {
                inserts: vec![
                    insert(
                        "http://a.example/tasks/1",
                        vocab::ADMS_STATUS,
                        vocab::STATUS_SCHEDULED,
                    ),
                    insert(
                        "http://a.example/tasks/2",
                        vocab::ADMS_STATUS,
                        vocab::STATUS_BUSY,
                    ),
                    insert(
                        "http://a.example/other",
                        "http://purl.org/dc/terms/modified",
                        vocab::STATUS_SCHEDULED,
                    ),
                ],
            },
            Changeset { inserts: vec![] },
        ];

        assert_eq!(
            scheduled_subjects(changesets),
            vec!["http://a.example/tasks/1"]
        );
    }
}
