//! Tags every typed subject as originating from harvesting. Additive,
//! no rollback.

use itertools::Itertools;
use tokio_util::sync::CancellationToken;

use crate::errors::HarveyError;
use crate::pipelines::{drive, PipelineContext};
use crate::rdf::{triples_to_ntriples, Term, Triple};
use crate::tasks::{Container, Task};
use crate::vocab;

pub async fn run(ctx: &PipelineContext, task: &Task, cancel: &CancellationToken) {
    drive(ctx, task, "add-harvesting-tag", || execute(ctx, task, cancel)).await
}

async fn execute(
    ctx: &PipelineContext,
    task: &Task,
    cancel: &CancellationToken,
) -> Result<(), HarveyError> {
    let triples = ctx.graph.get_triples(task, cancel).await?;
    let complemented = add_harvesting_tag(triples);
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

/// One `prov:wasGeneratedBy` tag per distinct typed subject.
fn add_harvesting_tag(mut triples: Vec<Triple>) -> Vec<Triple> {
    let subjects: Vec<Term> = triples
        .iter()
        .filter(|t| t.predicate.uri_value() == Some(vocab::RDF_TYPE))
        .map(|t| t.subject.clone())
        .unique()
        .collect();
    for subject in subjects {
        triples.push(Triple::new(
            subject,
            Term::uri(vocab::PROV_WAS_GENERATED_BY),
            Term::uri(vocab::HARVESTING_AGENT),
        ));
    }
    triples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_added_once_per_typed_subject() {
        let subject = Term::uri("http://x.example/thing");
        let triples = vec![
            Triple::new(
                subject.clone(),
                Term::uri(vocab::RDF_TYPE),
                Term::uri("http://x.example/TypeA"),
            ),
            Triple::new(
                subject.clone(),
                Term::uri(vocab::RDF_TYPE),
                Term::uri("http://x.example/TypeB"),
            ),
            Triple::new(
                Term::uri("http://x.example/untyped"),
                Term::uri("http://x.example/p"),
                Term::literal("v"),
            ),
        ];

        let complemented = add_harvesting_tag(triples);
        let tags: Vec<&Triple> = complemented
            .iter()
            .filter(|t| t.predicate.uri_value() == Some(vocab::PROV_WAS_GENERATED_BY))
            .collect();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].subject, subject);
        assert_eq!(tags[0].object, Term::uri(vocab::HARVESTING_AGENT));
    }
}
