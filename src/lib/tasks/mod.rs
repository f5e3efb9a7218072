use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::vocab;

pub mod repository;

pub use repository::TaskRepository;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Scheduled,
    Busy,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let uri = match self {
            TaskStatus::Scheduled => vocab::STATUS_SCHEDULED,
            TaskStatus::Busy => vocab::STATUS_BUSY,
            TaskStatus::Success => vocab::STATUS_SUCCESS,
            TaskStatus::Failed => vocab::STATUS_FAILED,
        };
        write!(f, "{uri}")
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = &'static str;

    fn try_from(uri: &str) -> Result<Self, Self::Error> {
        match uri {
            vocab::STATUS_SCHEDULED => Ok(TaskStatus::Scheduled),
            vocab::STATUS_BUSY => Ok(TaskStatus::Busy),
            vocab::STATUS_SUCCESS => Ok(TaskStatus::Success),
            vocab::STATUS_FAILED => Ok(TaskStatus::Failed),
            _ => Err("Could not deserialize to TaskStatus"),
        }
    }
}

/// The closed set of pipeline operations. Operation URIs outside this set
/// map to `Unsupported` and are skipped by the dispatcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Mirroring,
    AddUuids,
    AddHarvestingTag,
    AddVendorTag,
    Importing,
    Publish,
    PublishWithDeletes,
    ExecuteDiffDeletes,
    Unsupported(String),
}

impl Operation {
    pub fn from_uri(uri: &str) -> Operation {
        match uri {
            vocab::OP_MIRRORING => Operation::Mirroring,
            vocab::OP_ADD_UUIDS => Operation::AddUuids,
            vocab::OP_ADD_HARVESTING_TAG => Operation::AddHarvestingTag,
            vocab::OP_ADD_VENDOR_TAG => Operation::AddVendorTag,
            vocab::OP_IMPORTING => Operation::Importing,
            vocab::OP_PUBLISH => Operation::Publish,
            vocab::OP_PUBLISH_WITH_DELETES => Operation::PublishWithDeletes,
            vocab::OP_EXECUTE_DIFF_DELETES => Operation::ExecuteDiffDeletes,
            other => Operation::Unsupported(other.to_string()),
        }
    }

    pub fn known_operation_uris() -> &'static [&'static str] {
        &[
            vocab::OP_MIRRORING,
            vocab::OP_ADD_UUIDS,
            vocab::OP_ADD_HARVESTING_TAG,
            vocab::OP_ADD_VENDOR_TAG,
            vocab::OP_IMPORTING,
            vocab::OP_PUBLISH,
            vocab::OP_PUBLISH_WITH_DELETES,
            vocab::OP_EXECUTE_DIFF_DELETES,
        ]
    }
}

/// A persisted work item. Loaded from the store on dispatch; this service
/// only ever mutates its status, error link and results containers.
#[derive(Clone, Debug, PartialEq)]
pub struct Task {
    pub uri: String,
    /// Named graph holding the task record; every mutation stays in here.
    pub graph: String,
    pub id: String,
    pub job: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub status: TaskStatus,
    pub index: String,
    pub operation: Operation,
    pub error: Option<String>,
    pub parent_tasks: Vec<String>,
    pub input_containers: Vec<String>,
    pub results_containers: Vec<String>,
}

/// A results container under construction: UUID plus URI.
#[derive(Clone, Debug, PartialEq)]
pub struct Container {
    pub id: String,
    pub uri: String,
}

impl Container {
    /// Fresh container with a URI derived from its own UUID.
    pub fn fresh() -> Container {
        let id = Uuid::new_v4().to_string();
        let uri = format!("{}{}", vocab::DATA_CONTAINER_URI_PREFIX, id);
        Container { id, uri }
    }

    /// File containers reuse the task UUID in their URI so repeated runs of
    /// the same task converge on one container.
    pub fn for_task(task: &Task) -> Container {
        Container {
            id: Uuid::new_v4().to_string(),
            uri: format!("{}{}", vocab::DATA_CONTAINER_URI_PREFIX, task.id),
        }
    }
}

#[cfg(test)]
impl Task {
    pub(crate) fn stub(operation: Operation) -> Task {
        Task {
            uri: "http://a.example/tasks/1".to_string(),
            graph: "http://a.example/graphs/tasks".to_string(),
            id: "4c2b3fde-0001-4c6e-9e7a-000000000001".to_string(),
            job: "http://a.example/jobs/1".to_string(),
            created: Utc::now(),
            modified: Utc::now(),
            status: TaskStatus::Scheduled,
            index: "0".to_string(),
            operation,
            error: None,
            parent_tasks: vec![],
            input_containers: vec!["http://a.example/containers/in".to_string()],
            results_containers: vec![],
        }
    }
}
