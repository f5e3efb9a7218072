use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::errors::HarveyError;
use crate::rdf::Term;
use crate::sparql::{ask, escape_string, escape_uri, select, SparqlClient};
use crate::tasks::{Container, Operation, Task, TaskStatus};
use crate::vocab;

const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";

/// Loads and mutates Task and Error entities. All mutations stay inside the
/// task's own named graph.
#[derive(Clone)]
pub struct TaskRepository {
    client: Arc<dyn SparqlClient>,
}

impl TaskRepository {
    pub fn new(client: Arc<dyn SparqlClient>) -> TaskRepository {
        TaskRepository { client }
    }

    /// Type-check only. Notifications carry plenty of URIs that are not
    /// tasks; those simply answer `false`.
    pub async fn is_task(&self, uri: &str) -> Result<bool, HarveyError> {
        let stmt = format!(
            "ASK {{ {} a {} . }}",
            escape_uri(uri),
            escape_uri(vocab::TASK_TYPE)
        );
        ask(self.client.as_ref(), &stmt).await
    }

    /// Fetches the scalar fields plus the three multi-valued relations.
    /// Tasks missing a required field come back as `None`.
    pub async fn load_task(&self, uri: &str) -> Result<Option<Task>, HarveyError> {
        let task_ref = escape_uri(uri);
        let stmt = format!(
            "{prefixes}
  SELECT DISTINCT ?graph ?id ?job ?created ?modified ?status ?index ?operation ?error WHERE {{
    GRAPH ?graph {{
      {task_ref}
        a task:Task ;
        dct:isPartOf ?job ;
        mu:uuid ?id ;
        dct:created ?created ;
        dct:modified ?modified ;
        adms:status ?status ;
        task:index ?index ;
        task:operation ?operation .
      OPTIONAL {{ {task_ref} task:error ?error . }}
    }}
  }}
  LIMIT 1",
            prefixes = vocab::SPARQL_PREFIXES,
        );
        let bindings = select(self.client.as_ref(), &stmt).await?;
        let Some(row) = bindings.into_iter().next() else {
            return Ok(None);
        };

        let required = (
            uri_value(&row, "graph"),
            literal_value(&row, "id"),
            uri_value(&row, "job"),
            datetime_value(&row, "created"),
            datetime_value(&row, "modified"),
            uri_value(&row, "status").and_then(|s| TaskStatus::try_from(s.as_str()).ok()),
            literal_value(&row, "index"),
            uri_value(&row, "operation"),
        );
        let (
            Some(graph),
            Some(id),
            Some(job),
            Some(created),
            Some(modified),
            Some(status),
            Some(index),
            Some(operation),
        ) = required
        else {
            log::debug!("task <{uri}> is missing required fields, ignoring");
            return Ok(None);
        };

        let parent_tasks = self.related(uri, "cogs:dependsOn").await?;
        let results_containers = self.related(uri, "task:resultsContainer").await?;
        let input_containers = self.related(uri, "task:inputContainer").await?;

        Ok(Some(Task {
            uri: uri.to_string(),
            graph,
            id,
            job,
            created,
            modified,
            status,
            index,
            operation: Operation::from_uri(&operation),
            error: uri_value(&row, "error"),
            parent_tasks,
            input_containers,
            results_containers,
        }))
    }

    async fn related(&self, uri: &str, predicate: &str) -> Result<Vec<String>, HarveyError> {
        let stmt = format!(
            "{prefixes}
  SELECT DISTINCT ?related WHERE {{
    GRAPH ?g {{
      {task_ref} {predicate} ?related .
    }}
  }}",
            prefixes = vocab::SPARQL_PREFIXES,
            task_ref = escape_uri(uri),
        );
        let bindings = select(self.client.as_ref(), &stmt).await?;
        Ok(bindings
            .into_iter()
            .filter_map(|row| uri_value(&row, "related"))
            .collect())
    }

    /// Replaces status and modification timestamp in one statement. The old
    /// status is matched with a variable; this works from any prior status.
    pub async fn update_task_status(
        &self,
        task: &Task,
        status: TaskStatus,
    ) -> Result<(), HarveyError> {
        let stmt = format!(
            "{prefixes}
  DELETE {{
    GRAPH ?g {{
      ?subject adms:status ?status .
      ?subject dct:modified ?modified .
    }}
  }}
  INSERT {{
    GRAPH ?g {{
      ?subject adms:status {new_status} .
      ?subject dct:modified {now} .
    }}
  }}
  WHERE {{
    GRAPH ?g {{
      BIND({task_ref} as ?subject)
      ?subject adms:status ?status .
      OPTIONAL {{ ?subject dct:modified ?modified . }}
    }}
  }}",
            prefixes = vocab::SPARQL_PREFIXES,
            new_status = escape_uri(&status.to_string()),
            now = now_literal(),
            task_ref = escape_uri(&task.uri),
        );
        self.client.update(&stmt).await
    }

    /// Creates a fresh Error entity and links it to the task. Earlier
    /// errors stay attached; history is never overwritten.
    pub async fn append_task_error(
        &self,
        task: &Task,
        message: &str,
    ) -> Result<(), HarveyError> {
        let id = Uuid::new_v4().to_string();
        let error_uri = format!("{}{}", vocab::ERROR_URI_PREFIX, id);
        let stmt = format!(
            "{prefixes}
  INSERT DATA {{
    GRAPH {graph} {{
      {error_ref}
        a {error_type} ;
        mu:uuid {id} ;
        oslc:message {message} .
      {task_ref} task:error {error_ref} .
    }}
  }}",
            prefixes = vocab::SPARQL_PREFIXES,
            graph = escape_uri(&task.graph),
            error_ref = escape_uri(&error_uri),
            error_type = escape_uri(vocab::ERROR_TYPE),
            id = escape_string(&id),
            message = escape_string(message),
            task_ref = escape_uri(&task.uri),
        );
        self.client.update(&stmt).await
    }

    /// Links a results container pointing at a logical file. Called once
    /// per source partition, so a task can accumulate several of these.
    pub async fn append_task_result_file(
        &self,
        task: &Task,
        container: &Container,
        logical_file_uri: &str,
    ) -> Result<(), HarveyError> {
        self.append_task_result(task, container, "task:hasFile", logical_file_uri)
            .await
    }

    /// Links a results container pointing at a graph.
    pub async fn append_task_result_graph(
        &self,
        task: &Task,
        container: &Container,
        graph_uri: &str,
    ) -> Result<(), HarveyError> {
        self.append_task_result(task, container, "task:hasGraph", graph_uri)
            .await
    }

    async fn append_task_result(
        &self,
        task: &Task,
        container: &Container,
        predicate: &str,
        payload_uri: &str,
    ) -> Result<(), HarveyError> {
        let stmt = format!(
            "{prefixes}
  INSERT DATA {{
    GRAPH {graph} {{
      {container_ref}
        a nfo:DataContainer ;
        mu:uuid {container_id} ;
        {predicate} {payload} .
      {task_ref} task:resultsContainer {container_ref} .
    }}
  }}",
            prefixes = vocab::SPARQL_PREFIXES,
            graph = escape_uri(&task.graph),
            container_ref = escape_uri(&container.uri),
            container_id = escape_string(&container.id),
            payload = escape_uri(payload_uri),
            task_ref = escape_uri(&task.uri),
        );
        self.client.update(&stmt).await
    }

    /// Every task with a known operation still sitting in busy or
    /// scheduled. Used at startup and on manual resume to pick up work
    /// interrupted mid-flight.
    pub async fn get_unfinished_tasks(&self) -> Result<Vec<String>, HarveyError> {
        let operations = Operation::known_operation_uris()
            .iter()
            .map(|op| escape_uri(op))
            .collect::<Vec<_>>()
            .join(" ");
        let stmt = format!(
            "{prefixes}
  SELECT DISTINCT ?task WHERE {{
    GRAPH ?g {{
      ?task
        a task:Task ;
        adms:status ?status ;
        task:operation ?operation .
      VALUES ?status {{ {busy} {scheduled} }}
      VALUES ?operation {{ {operations} }}
    }}
  }}",
            prefixes = vocab::SPARQL_PREFIXES,
            busy = escape_uri(vocab::STATUS_BUSY),
            scheduled = escape_uri(vocab::STATUS_SCHEDULED),
        );
        let bindings = select(self.client.as_ref(), &stmt).await?;
        Ok(bindings
            .into_iter()
            .filter_map(|row| uri_value(&row, "task"))
            .collect())
    }

    /// One-hop lookup to the vendor associated with the task's owning job.
    pub async fn get_vendor(&self, task: &Task) -> Result<Option<String>, HarveyError> {
        let stmt = format!(
            "{prefixes}
  SELECT DISTINCT ?vendor WHERE {{
    GRAPH ?g {{
      {job_ref} prov:wasAssociatedWith ?vendor .
    }}
  }}
  LIMIT 1",
            prefixes = vocab::SPARQL_PREFIXES,
            job_ref = escape_uri(&task.job),
        );
        let bindings = select(self.client.as_ref(), &stmt).await?;
        Ok(bindings
            .into_iter()
            .next()
            .and_then(|row| uri_value(&row, "vendor")))
    }
}

fn uri_value(row: &HashMap<String, Term>, var: &str) -> Option<String> {
    match row.get(var) {
        Some(Term::Uri(uri)) => Some(uri.clone()),
        _ => None,
    }
}

fn literal_value(row: &HashMap<String, Term>, var: &str) -> Option<String> {
    match row.get(var) {
        Some(Term::Literal { value, .. }) => Some(value.clone()),
        _ => None,
    }
}

fn datetime_value(row: &HashMap<String, Term>, var: &str) -> Option<DateTime<Utc>> {
    literal_value(row, var)
        .and_then(|value| DateTime::parse_from_rfc3339(&value).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn now_literal() -> String {
    Term::typed_literal(
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        XSD_DATE_TIME,
    )
    .to_string()
}
