//! URI canonicalization: mirroring foreign identifiers into the local
//! namespace while recording `owl:sameAs` equivalence, and complementing
//! harvested resources with `mu:uuid` identifiers.

use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;
use uuid::Uuid;

use crate::canon::cache::{BoundedCache, DEFAULT_CACHE_CAPACITY};
use crate::config::Config;
use crate::errors::HarveyError;
use crate::rdf::{Term, Triple};
use crate::sparql::{escape_uri, select, SparqlClient};
use crate::vocab;

pub mod cache;

// Fixed namespaces keep minted identifiers stable across processes, so
// re-runs converge without needing a cache hit or a store lookup.
const MIRROR_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6b, 0x91, 0x4e, 0xd0, 0x5a, 0x2c, 0x4f, 0x0b, 0x8e, 0x17, 0x3d, 0x44, 0x9a, 0xc1, 0x55,
    0x02,
]);
const SUBJECT_UUID_NAMESPACE: Uuid = Uuid::from_bytes([
    0xd4, 0x0f, 0x27, 0x8a, 0x1e, 0x69, 0x45, 0x3c, 0xb2, 0x5d, 0x71, 0x0e, 0x28, 0xf6, 0x93,
    0x7b,
]);

/// Per-run rename state: old URI to replacement, plus the reverse index.
/// Keyed by the exact original URI string.
#[derive(Default)]
pub struct RenameMapping {
    forward: HashMap<String, String>,
    reverse: HashMap<String, String>,
}

impl RenameMapping {
    pub fn new() -> RenameMapping {
        RenameMapping::default()
    }

    pub fn get(&self, old_uri: &str) -> Option<&str> {
        self.forward.get(old_uri).map(String::as_str)
    }

    pub fn original_of(&self, new_uri: &str) -> Option<&str> {
        self.reverse.get(new_uri).map(String::as_str)
    }

    pub fn record(&mut self, old_uri: &str, new_uri: &str) {
        self.forward
            .insert(old_uri.to_string(), new_uri.to_string());
        self.reverse
            .insert(new_uri.to_string(), old_uri.to_string());
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

pub struct UriMirror {
    client: Arc<dyn SparqlClient>,
    config: Arc<Config>,
}

impl UriMirror {
    pub fn new(client: Arc<dyn SparqlClient>, config: Arc<Config>) -> UriMirror {
        UriMirror { client, config }
    }

    /// A URI is renamed when its scheme is on the rename list and its host
    /// is not on the allow-list. Anything unparseable stays untouched.
    fn needs_rename(&self, uri: &str) -> bool {
        let Ok(parsed) = reqwest::Url::parse(uri) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let scheme = format!("{}:", parsed.scheme());
        self.config.protocols_to_rename.contains(&scheme)
            && !self.config.known_domains.iter().any(|domain| domain == host)
    }

    /// Rewrites every foreign subject/object URI and appends exactly one
    /// equivalence triple per distinct rewritten URI. Subject positions
    /// resolve before object positions across the whole batch, so a URI
    /// occurring in both converges on one replacement.
    pub async fn rename_triples(&self, triples: &[Triple]) -> Result<Vec<Triple>, HarveyError> {
        let mut mapping = RenameMapping::new();
        let mut equivalences: Vec<Triple> = Vec::new();

        for triple in triples {
            if let Term::Uri(subject) = &triple.subject {
                self.resolve(subject, &mut mapping, &mut equivalences)
                    .await?;
            }
        }
        for triple in triples {
            if self.is_ignored_predicate(&triple.predicate) {
                continue;
            }
            if let Term::Uri(object) = &triple.object {
                self.resolve(object, &mut mapping, &mut equivalences).await?;
            }
        }

        let mut renamed = Vec::with_capacity(triples.len() + equivalences.len());
        for triple in triples {
            let subject = rewrite(&triple.subject, &mapping);
            let object = if self.is_ignored_predicate(&triple.predicate) {
                triple.object.clone()
            } else {
                rewrite(&triple.object, &mapping)
            };
            renamed.push(Triple::new(subject, triple.predicate.clone(), object));
        }
        renamed.extend(equivalences);
        Ok(renamed)
    }

    fn is_ignored_predicate(&self, predicate: &Term) -> bool {
        match predicate.uri_value() {
            Some(uri) => self
                .config
                .ignored_renaming_predicates
                .iter()
                .any(|ignored| ignored == uri),
            None => false,
        }
    }

    async fn resolve(
        &self,
        uri: &str,
        mapping: &mut RenameMapping,
        equivalences: &mut Vec<Triple>,
    ) -> Result<(), HarveyError> {
        if mapping.get(uri).is_some() || !self.needs_rename(uri) {
            return Ok(());
        }
        // An equivalence already in the store wins; otherwise the
        // replacement is derived from the old URI itself, so repeated runs
        // mint the same name.
        let new_uri = match self.lookup_existing(uri).await? {
            Some(existing) => existing,
            None => format!(
                "{}{}",
                self.config.rename_domain,
                Uuid::new_v5(&MIRROR_NAMESPACE, uri.as_bytes())
            ),
        };
        equivalences.push(Triple::new(
            Term::uri(new_uri.clone()),
            Term::uri(vocab::OWL_SAME_AS),
            Term::uri(uri),
        ));
        mapping.record(uri, &new_uri);
        Ok(())
    }

    async fn lookup_existing(&self, old_uri: &str) -> Result<Option<String>, HarveyError> {
        let stmt = format!(
            "SELECT ?newURI WHERE {{
    ?newURI {same_as} {old} .
  }}
  LIMIT 1",
            same_as = escape_uri(vocab::OWL_SAME_AS),
            old = escape_uri(old_uri),
        );
        let bindings = select(self.client.as_ref(), &stmt).await?;
        Ok(bindings.into_iter().next().and_then(|row| {
            match row.get("newURI") {
                Some(Term::Uri(uri)) => Some(uri.clone()),
                _ => None,
            }
        }))
    }
}

fn rewrite(term: &Term, mapping: &RenameMapping) -> Term {
    match term {
        Term::Uri(uri) => match mapping.get(uri) {
            Some(new_uri) => Term::uri(new_uri),
            None => term.clone(),
        },
        other => other.clone(),
    }
}

pub struct UuidAssigner {
    client: Arc<dyn SparqlClient>,
    cache: BoundedCache,
}

impl UuidAssigner {
    pub fn new(client: Arc<dyn SparqlClient>) -> UuidAssigner {
        UuidAssigner {
            client,
            cache: BoundedCache::new(DEFAULT_CACHE_CAPACITY),
        }
    }

    /// Complements the input with exactly one `mu:uuid` triple per
    /// distinct subject bearing a type assertion.
    pub async fn add_uuids(&self, triples: &[Triple]) -> Result<Vec<Triple>, HarveyError> {
        let subjects: Vec<&Term> = triples
            .iter()
            .filter(|t| t.predicate.uri_value() == Some(vocab::RDF_TYPE))
            .map(|t| &t.subject)
            .unique()
            .collect();

        let mut complemented = triples.to_vec();
        for subject in subjects {
            let Term::Uri(subject_uri) = subject else {
                continue;
            };
            let uuid = self.resolve_uuid(subject_uri).await?;
            complemented.push(Triple::new(
                subject.clone(),
                Term::uri(vocab::MU_UUID),
                Term::literal(uuid),
            ));
        }
        Ok(complemented)
    }

    async fn resolve_uuid(&self, subject: &str) -> Result<String, HarveyError> {
        if let Some(hit) = self.cache.get(subject) {
            return Ok(hit);
        }
        let stmt = format!(
            "SELECT ?uuid WHERE {{
    {subject_ref} {mu_uuid} ?uuid .
  }} LIMIT 1",
            subject_ref = escape_uri(subject),
            mu_uuid = escape_uri(vocab::MU_UUID),
        );
        let bindings = select(self.client.as_ref(), &stmt).await?;
        let stored = bindings.into_iter().next().and_then(|row| {
            match row.get("uuid") {
                Some(Term::Literal { value, .. }) => Some(value.clone()),
                _ => None,
            }
        });
        let uuid = stored.unwrap_or_else(|| {
            Uuid::new_v5(&SUBJECT_UUID_NAMESPACE, subject.as_bytes()).to_string()
        });
        self.cache.insert(subject.to_string(), uuid.clone());
        Ok(uuid)
    }
}
