//! Tags every typed subject with the vendor the harvest was run for. The
//! input is streamed per source partition so arbitrarily large files stay
//! processable; each partition becomes its own file artifact carrying its
//! provenance.

use std::path::PathBuf;

use async_trait::async_trait;
use itertools::Itertools;
use tokio_util::sync::CancellationToken;

use crate::errors::HarveyError;
use crate::files::FileEngine;
use crate::graph::{BatchSink, DEFAULT_LINE_BUFFER};
use crate::pipelines::{drive, PipelineContext};
use crate::rdf::{triples_to_ntriples, Term, Triple};
use crate::tasks::{Container, Task};
use crate::vocab;

pub async fn run(ctx: &PipelineContext, task: &Task, cancel: &CancellationToken) {
    drive(ctx, task, "add-vendor-tag", || execute(ctx, task, cancel)).await
}

async fn execute(
    ctx: &PipelineContext,
    task: &Task,
    cancel: &CancellationToken,
) -> Result<(), HarveyError> {
    let vendor = ctx
        .repository
        .get_vendor(task)
        .await?
        .ok_or_else(|| HarveyError::NoVendor(task.uri.clone()))?;

    let mut sink = VendorTagSink {
        files: &ctx.files,
        vendor: Term::uri(vendor),
        partitions: Vec::new(),
    };
    ctx.graph
        .get_triples_in_file_and_apply_by_batch(task, cancel, DEFAULT_LINE_BUFFER, &mut sink)
        .await?;

    let file_container = Container::for_task(task);
    for (derived_from, temp_path) in sink.partitions {
        let written = ctx
            .files
            .promote_temp_file(
                &task.graph,
                &temp_path,
                "complemented-triples.ttl",
                Some(&derived_from),
            )
            .await?;
        ctx.repository
            .append_task_result_file(task, &file_container, &written.logical_uri)
            .await?;
    }

    let graph_container = Container::fresh();
    ctx.repository
        .append_task_result_graph(task, &graph_container, &file_container.uri)
        .await?;
    Ok(())
}

struct VendorTagSink<'a> {
    files: &'a FileEngine,
    vendor: Term,
    /// One temp file per source partition, first seen first served.
    partitions: Vec<(String, PathBuf)>,
}

#[async_trait]
impl BatchSink for VendorTagSink<'_> {
    async fn apply(&mut self, batch: Vec<Triple>, derived_from: &str) -> Result<(), HarveyError> {
        let path = match self
            .partitions
            .iter()
            .find(|(key, _)| key == derived_from)
        {
            Some((_, path)) => path.clone(),
            None => {
                let path = self.files.temp_path("complemented-triples");
                self.files.make_empty_file(&path).await?;
                self.partitions
                    .push((derived_from.to_string(), path.clone()));
                path
            }
        };
        let tagged = add_vendor_tag(batch, &self.vendor);
        self.files
            .append_file(&path, &triples_to_ntriples(&tagged))
            .await
    }
}

/// One `prov:wasAssociatedWith` tag per distinct typed subject in the
/// batch.
fn add_vendor_tag(mut batch: Vec<Triple>, vendor: &Term) -> Vec<Triple> {
    let subjects: Vec<Term> = batch
        .iter()
        .filter(|t| t.predicate.uri_value() == Some(vocab::RDF_TYPE))
        .map(|t| t.subject.clone())
        .unique()
        .collect();
    for subject in subjects {
        batch.push(Triple::new(
            subject,
            Term::uri(vocab::PROV_WAS_ASSOCIATED_WITH),
            vendor.clone(),
        ));
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::testing::{context_with, status_sequence};
    use crate::sparql::mock::{select_response, uri_binding, MockSparqlClient};
    use crate::tasks::Operation;
    use std::io::Write;
    use std::sync::Arc;

    #[tokio::test]
    async fn partitions_become_separate_artifacts_with_provenance() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["one.ttl", "two.ttl"] {
            let mut input = std::fs::File::create(dir.path().join(name)).unwrap();
            writeln!(
                input,
                "<http://x.example/{name}> <{}> <http://x.example/Type> .",
                vocab::RDF_TYPE
            )
            .unwrap();
        }

        let client = Arc::new(
            MockSparqlClient::new()
                .respond(
                    "prov:wasAssociatedWith",
                    select_response(&[&[(
                        "vendor",
                        uri_binding("http://a.example/vendors/acme"),
                    )]]),
                )
                .respond(
                    "nie:dataSource",
                    select_response(&[
                        &[
                            ("path", uri_binding("share://one.ttl")),
                            ("file", uri_binding("http://a.example/files/one")),
                            ("derivedFrom", uri_binding("http://remote.example/page-1")),
                        ],
                        &[
                            ("path", uri_binding("share://two.ttl")),
                            ("file", uri_binding("http://a.example/files/two")),
                            ("derivedFrom", uri_binding("http://remote.example/page-2")),
                        ],
                    ]),
                ),
        );
        let ctx = context_with(client.clone(), dir.path().to_path_buf());
        let task = Task::stub(Operation::AddVendorTag);
        let cancel = CancellationToken::new();

        run(&ctx, &task, &cancel).await;

        let updates = client.recorded_updates();
        assert_eq!(
            status_sequence(&updates),
            vec![crate::vocab::STATUS_BUSY, crate::vocab::STATUS_SUCCESS]
        );

        // One registered file per source partition, each with provenance.
        let registrations: Vec<&String> = updates
            .iter()
            .filter(|u| u.contains("prov:wasDerivedFrom"))
            .collect();
        assert_eq!(registrations.len(), 2);
        assert!(registrations
            .iter()
            .any(|u| u.contains("http://remote.example/page-1")));
        assert!(registrations
            .iter()
            .any(|u| u.contains("http://remote.example/page-2")));

        // Two result-file links on the task, one per partition.
        let result_files = updates
            .iter()
            .filter(|u| u.contains("task:hasFile"))
            .count();
        assert_eq!(result_files, 2);
    }

    #[tokio::test]
    async fn a_missing_vendor_fails_the_task() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(MockSparqlClient::new());
        let ctx = context_with(client.clone(), dir.path().to_path_buf());
        let task = Task::stub(Operation::AddVendorTag);
        let cancel = CancellationToken::new();

        run(&ctx, &task, &cancel).await;

        let updates = client.recorded_updates();
        assert_eq!(
            status_sequence(&updates),
            vec![crate::vocab::STATUS_BUSY, crate::vocab::STATUS_FAILED]
        );
        assert!(updates.iter().any(|u| u.contains("oslc:message")));
    }
}
