//! Moves triples between files, working memory and the remote store.
//! Reads are paginated, writes and deletes are batched with a halving
//! retry, and file input is streamed in bounded line buffers so files
//! larger than RAM stay processable.

use std::cmp;
use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;

use crate::errors::HarveyError;
use crate::rdf::{parse_ntriples_line, Term, Triple};
use crate::sparql::{escape_uri, select, SparqlClient};
use crate::tasks::Task;
use crate::vocab;

pub const DEFAULT_PAGE_SIZE: usize = 200;
pub const DEFAULT_LINE_BUFFER: usize = 2000;

/// Receives one buffered batch at a time, together with the source the
/// batch was derived from. Batches arrive strictly sequentially.
#[async_trait]
pub trait BatchSink: Send {
    async fn apply(&mut self, batch: Vec<Triple>, derived_from: &str) -> Result<(), HarveyError>;
}

#[derive(Copy, Clone, Debug)]
enum UpdateVerb {
    Insert,
    Delete,
}

impl Display for UpdateVerb {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            UpdateVerb::Insert => write!(f, "INSERT"),
            UpdateVerb::Delete => write!(f, "DELETE"),
        }
    }
}

#[derive(Clone, Debug)]
struct FileSource {
    physical_uri: String,
    logical_uri: String,
    derived_from: Option<String>,
}

impl FileSource {
    /// Batches are grouped per harvested source; files without recorded
    /// provenance fall back to their own identity.
    fn group_key(&self) -> String {
        self.derived_from
            .clone()
            .unwrap_or_else(|| self.logical_uri.clone())
    }
}

pub struct GraphEngine {
    client: Arc<dyn SparqlClient>,
    /// Batched writes and deletes go here; may point at a beefier endpoint
    /// than the one serving lookups.
    batch_client: Arc<dyn SparqlClient>,
    share_folder: PathBuf,
    sleep_time: Duration,
}

impl GraphEngine {
    pub fn new(
        client: Arc<dyn SparqlClient>,
        batch_client: Arc<dyn SparqlClient>,
        share_folder: PathBuf,
        sleep_time: Duration,
    ) -> GraphEngine {
        GraphEngine {
            client,
            batch_client,
            share_folder,
            sleep_time,
        }
    }

    /// Input triples for a task. The file artifact of an earlier stage is
    /// the fast path; any failure there falls back to reading the input
    /// container's graph page by page.
    pub async fn get_triples(
        &self,
        task: &Task,
        cancel: &CancellationToken,
    ) -> Result<Vec<Triple>, HarveyError> {
        match self.get_triples_in_file(task, cancel).await {
            Ok(triples) => Ok(triples),
            Err(HarveyError::Cancelled) => Err(HarveyError::Cancelled),
            Err(e) => {
                log::error!(
                    "file retrieval failed for task <{}>, trying from graph: {e}",
                    task.uri
                );
                self.get_triples_in_graph(task, DEFAULT_PAGE_SIZE, cancel)
                    .await
            }
        }
    }

    /// Counts first, then walks the graph with stably-ordered LIMIT/OFFSET
    /// pages. Unbounded SELECTs over large graphs get rejected upstream.
    pub async fn get_triples_in_graph(
        &self,
        task: &Task,
        page_size: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Triple>, HarveyError> {
        let graph = self.resolve_input_graph(task).await?;
        let graph_ref = escape_uri(&graph);

        let count_stmt = format!(
            "SELECT (COUNT(?s) as ?count) WHERE {{
    GRAPH {graph_ref} {{
      ?s ?p ?o .
    }}
  }}"
        );
        let bindings = select(self.client.as_ref(), &count_stmt).await?;
        let count: usize = bindings
            .first()
            .and_then(|row| match row.get("count") {
                Some(Term::Literal { value, .. }) => value.parse().ok(),
                _ => None,
            })
            .ok_or_else(|| HarveyError::UnexpectedResponse(count_stmt.clone()))?;

        let pages = count.div_ceil(page_size);
        let mut triples = Vec::with_capacity(count);
        for page in 0..pages {
            if cancel.is_cancelled() {
                return Err(HarveyError::Cancelled);
            }
            let offset = page * page_size;
            let page_stmt = format!(
                "SELECT DISTINCT ?s ?p ?o WHERE {{
    GRAPH {graph_ref} {{
      ?s ?p ?o .
    }}
  }}
  ORDER BY ?s ?p ?o
  LIMIT {page_size}
  OFFSET {offset}"
            );
            let rows = select(self.client.as_ref(), &page_stmt).await?;
            for row in rows {
                let (Some(s), Some(p), Some(o)) = (row.get("s"), row.get("p"), row.get("o"))
                else {
                    continue;
                };
                triples.push(Triple::new(s.clone(), p.clone(), o.clone()));
            }
        }
        Ok(triples)
    }

    /// Loads the whole file artifact of the input container into memory.
    pub async fn get_triples_in_file(
        &self,
        task: &Task,
        cancel: &CancellationToken,
    ) -> Result<Vec<Triple>, HarveyError> {
        let sources = self.input_file_sources(task, false).await?;
        if sources.is_empty() {
            return Err(HarveyError::NoInputFile(task.uri.clone()));
        }
        let mut triples = Vec::new();
        for source in &sources {
            self.read_file(source, cancel, &mut triples).await?;
        }
        Ok(triples)
    }

    /// Streams the input files grouped per harvested source, flushing the
    /// sink every `batch_size` statements plus once for the trailing
    /// partial buffer of each group.
    pub async fn get_triples_in_file_and_apply_by_batch(
        &self,
        task: &Task,
        cancel: &CancellationToken,
        batch_size: usize,
        sink: &mut dyn BatchSink,
    ) -> Result<(), HarveyError> {
        let sources = self.input_file_sources(task, false).await?;
        self.apply_by_batch(task, sources, cancel, batch_size, sink)
            .await
    }

    /// Same streaming, over the removal files of the input container.
    pub async fn get_deleted_triples_in_file_and_apply_by_batch(
        &self,
        task: &Task,
        cancel: &CancellationToken,
        batch_size: usize,
        sink: &mut dyn BatchSink,
    ) -> Result<(), HarveyError> {
        let sources = self.input_file_sources(task, true).await?;
        self.apply_by_batch(task, sources, cancel, batch_size, sink)
            .await
    }

    async fn apply_by_batch(
        &self,
        task: &Task,
        sources: Vec<FileSource>,
        cancel: &CancellationToken,
        batch_size: usize,
        sink: &mut dyn BatchSink,
    ) -> Result<(), HarveyError> {
        if sources.is_empty() {
            return Err(HarveyError::NoInputFile(task.uri.clone()));
        }

        // Group per source, first seen first served.
        let mut groups: Vec<(String, Vec<FileSource>)> = Vec::new();
        for source in sources {
            let key = source.group_key();
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, group)) => group.push(source),
                None => groups.push((key, vec![source])),
            }
        }

        for (derived_from, group) in groups {
            let mut buffer: Vec<Triple> = Vec::with_capacity(batch_size);
            for source in &group {
                if cancel.is_cancelled() {
                    return Err(HarveyError::Cancelled);
                }
                let path = self.physical_path(&source.physical_uri);
                let file = tokio::fs::File::open(&path).await?;
                let mut lines = FramedRead::new(file, LinesCodec::new());
                while let Some(line) = lines.next().await {
                    if let Some(triple) = parse_ntriples_line(&line?)? {
                        buffer.push(triple);
                    }
                    if buffer.len() >= batch_size {
                        if cancel.is_cancelled() {
                            return Err(HarveyError::Cancelled);
                        }
                        sink.apply(std::mem::take(&mut buffer), &derived_from).await?;
                    }
                }
            }
            if !buffer.is_empty() {
                sink.apply(buffer, &derived_from).await?;
            }
        }
        Ok(())
    }

    async fn read_file(
        &self,
        source: &FileSource,
        cancel: &CancellationToken,
        into: &mut Vec<Triple>,
    ) -> Result<(), HarveyError> {
        if cancel.is_cancelled() {
            return Err(HarveyError::Cancelled);
        }
        let path = self.physical_path(&source.physical_uri);
        let file = tokio::fs::File::open(&path).await?;
        let mut lines = FramedRead::new(file, LinesCodec::new());
        while let Some(line) = lines.next().await {
            if let Some(triple) = parse_ntriples_line(&line?)? {
                into.push(triple);
            }
        }
        Ok(())
    }

    fn physical_path(&self, physical_uri: &str) -> PathBuf {
        let name = physical_uri
            .strip_prefix("share://")
            .unwrap_or(physical_uri);
        self.share_folder.join(name)
    }

    async fn resolve_input_graph(&self, task: &Task) -> Result<String, HarveyError> {
        let stmt = format!(
            "{prefixes}
  SELECT DISTINCT ?graph WHERE {{
    GRAPH ?g {{
      BIND({task_ref} as ?task)
      ?task task:inputContainer ?container .
      ?container task:hasGraph ?graph .
    }}
  }}
  LIMIT 1",
            prefixes = vocab::SPARQL_PREFIXES,
            task_ref = escape_uri(&task.uri),
        );
        let bindings = select(self.client.as_ref(), &stmt).await?;
        bindings
            .first()
            .and_then(|row| match row.get("graph") {
                Some(Term::Uri(uri)) => Some(uri.clone()),
                _ => None,
            })
            .ok_or_else(|| HarveyError::NoInputGraph(task.uri.clone()))
    }

    async fn input_file_sources(
        &self,
        task: &Task,
        removals: bool,
    ) -> Result<Vec<FileSource>, HarveyError> {
        let name_filter = if removals {
            format!("FILTER(STR(?name) = \"{}\")", vocab::REMOVALS_FILE_NAME)
        } else {
            format!("FILTER(STR(?name) != \"{}\")", vocab::REMOVALS_FILE_NAME)
        };
        let stmt = format!(
            "{prefixes}
  SELECT DISTINCT ?path ?file ?derivedFrom WHERE {{
    GRAPH ?g {{
      BIND({task_ref} as ?task)
      ?task task:inputContainer ?container .
      ?container task:hasGraph ?graph .
      ?graph task:hasFile ?file .
      ?file nfo:fileName ?name .
      ?path nie:dataSource ?file .
      OPTIONAL {{ ?file prov:wasDerivedFrom ?derivedFrom . }}
      {name_filter}
    }}
  }}",
            prefixes = vocab::SPARQL_PREFIXES,
            task_ref = escape_uri(&task.uri),
        );
        let bindings = select(self.client.as_ref(), &stmt).await?;
        Ok(bindings
            .into_iter()
            .filter_map(|row| {
                let physical_uri = match row.get("path") {
                    Some(Term::Uri(uri)) => uri.clone(),
                    _ => return None,
                };
                let logical_uri = match row.get("file") {
                    Some(Term::Uri(uri)) => uri.clone(),
                    _ => return None,
                };
                let derived_from = match row.get("derivedFrom") {
                    Some(Term::Uri(uri)) => Some(uri.clone()),
                    _ => None,
                };
                Some(FileSource {
                    physical_uri,
                    logical_uri,
                    derived_from,
                })
            })
            .collect())
    }

    /// Inserts in fixed-size batches. A failing batch is halved and
    /// retried on the failing slice only; whatever is insertable gets
    /// inserted, and the first statement still failing at batch size 1 is
    /// surfaced once the rest has been attempted.
    pub async fn write_triples_to_graph(
        &self,
        graph: &str,
        triples: &[Triple],
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> Result<(), HarveyError> {
        let mut failures = Vec::new();
        self.apply_halving(
            UpdateVerb::Insert,
            graph,
            triples,
            cmp::max(batch_size, 1),
            cancel,
            &mut failures,
        )
        .await?;
        if let Some((triple, source)) = failures.into_iter().next() {
            log::error!("INSERT of a triple failed: {triple}");
            return Err(HarveyError::UninsertableTriple {
                triple: triple.to_string(),
                source: Box::new(source),
            });
        }
        Ok(())
    }

    /// Deletes with the same halving strategy. With `skip_failures` a
    /// statement that still fails at batch size 1 is logged and skipped;
    /// without it, the first undeletable statement is surfaced by name.
    pub async fn delete_triples_from_graph(
        &self,
        graph: &str,
        triples: &[Triple],
        batch_size: usize,
        skip_failures: bool,
        cancel: &CancellationToken,
    ) -> Result<(), HarveyError> {
        let mut failures = Vec::new();
        self.apply_halving(
            UpdateVerb::Delete,
            graph,
            triples,
            cmp::max(batch_size, 1),
            cancel,
            &mut failures,
        )
        .await?;
        if skip_failures {
            for (triple, source) in &failures {
                log::warn!("skipping triple that could not be deleted: {triple} ({source})");
            }
            return Ok(());
        }
        if let Some((triple, source)) = failures.into_iter().next() {
            log::error!("DELETE of a triple failed: {triple}");
            return Err(HarveyError::UndeletableTriple {
                triple: triple.to_string(),
                source: Box::new(source),
            });
        }
        Ok(())
    }

    fn apply_halving<'a>(
        &'a self,
        verb: UpdateVerb,
        graph: &'a str,
        triples: &'a [Triple],
        batch_size: usize,
        cancel: &'a CancellationToken,
        failures: &'a mut Vec<(Triple, HarveyError)>,
    ) -> BoxFuture<'a, Result<(), HarveyError>> {
        Box::pin(async move {
            let pages = triples.len().div_ceil(batch_size);
            for page in 0..pages {
                if cancel.is_cancelled() {
                    return Err(HarveyError::Cancelled);
                }
                let upper = cmp::min((page + 1) * batch_size, triples.len());
                let batch = &triples[page * batch_size..upper];
                let stmt = update_statement(verb, graph, batch);
                match self.batch_client.update(&stmt).await {
                    Ok(()) => {}
                    Err(e) if batch_size > 1 => {
                        let halved = batch_size.div_ceil(2);
                        log::warn!(
                            "{verb} batch of {} triples failed, retrying with batch size {halved}: {e}",
                            batch.len()
                        );
                        tokio::time::sleep(self.sleep_time).await;
                        self.apply_halving(verb, graph, batch, halved, cancel, failures)
                            .await?;
                    }
                    Err(e) => failures.push((batch[0].clone(), e)),
                }
            }
            Ok(())
        })
    }
}

fn update_statement(verb: UpdateVerb, graph: &str, triples: &[Triple]) -> String {
    let body = triples
        .iter()
        .map(|t| format!("      {t}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{verb} DATA {{
    GRAPH {graph} {{
{body}
    }}
  }}",
        graph = escape_uri(graph),
    )
}
