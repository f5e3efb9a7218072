//! Share-folder file artifacts. File bodies live on disk under a random
//! name; the store carries a logical/physical `nfo:FileDataObject` pair
//! referencing the body through the `share://` URI convention.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::errors::HarveyError;
use crate::rdf::Term;
use crate::sparql::{escape_string, escape_uri, SparqlClient};
use crate::vocab;

const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
const XSD_DATE_TIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";

#[derive(Clone, Debug)]
pub struct WrittenFile {
    pub logical_uri: String,
    pub physical_uri: String,
}

pub struct FileEngine {
    client: Arc<dyn SparqlClient>,
    share_folder: PathBuf,
}

impl FileEngine {
    pub fn new(client: Arc<dyn SparqlClient>, share_folder: PathBuf) -> FileEngine {
        FileEngine {
            client,
            share_folder,
        }
    }

    /// Maps a `share://` URI onto the share folder.
    pub fn physical_path(&self, physical_uri: &str) -> PathBuf {
        let name = physical_uri
            .strip_prefix("share://")
            .unwrap_or(physical_uri);
        self.share_folder.join(name)
    }

    /// Writes content to a fresh file in the share folder and registers the
    /// logical/physical pair in the given graph.
    pub async fn write_ttl_file(
        &self,
        graph: &str,
        content: &str,
        logical_name: &str,
        derived_from: Option<&str>,
    ) -> Result<WrittenFile, HarveyError> {
        let physical_id = Uuid::new_v4().to_string();
        let physical_name = format!("{physical_id}.ttl");
        let path = self.share_folder.join(&physical_name);
        if let Err(e) = fs::write(&path, content).await {
            log::error!("failed to write file {}: {e}", path.display());
            return Err(e.into());
        }
        self.register(graph, &path, &physical_id, &physical_name, logical_name, derived_from)
            .await
    }

    /// Moves an already-written temp file to its final name and registers
    /// it. Used by the streaming pipelines that build partitions
    /// incrementally.
    pub async fn promote_temp_file(
        &self,
        graph: &str,
        temp_path: &Path,
        logical_name: &str,
        derived_from: Option<&str>,
    ) -> Result<WrittenFile, HarveyError> {
        let physical_id = Uuid::new_v4().to_string();
        let physical_name = format!("{physical_id}.ttl");
        let path = self.share_folder.join(&physical_name);
        fs::rename(temp_path, &path).await?;
        self.register(graph, &path, &physical_id, &physical_name, logical_name, derived_from)
            .await
    }

    async fn register(
        &self,
        graph: &str,
        path: &Path,
        physical_id: &str,
        physical_name: &str,
        logical_name: &str,
        derived_from: Option<&str>,
    ) -> Result<WrittenFile, HarveyError> {
        let size = fs::metadata(path).await?.len();
        let logical_id = Uuid::new_v4().to_string();
        let logical_uri = format!("{}{}", vocab::FILE_URI_PREFIX, logical_id);
        let physical_uri = format!("share://{physical_name}");
        let now = now_literal();
        let size = Term::typed_literal(size.to_string(), XSD_INTEGER).to_string();
        let provenance = derived_from
            .map(|source| {
                format!(
                    "      {} prov:wasDerivedFrom {} .\n",
                    escape_uri(&logical_uri),
                    escape_uri(source)
                )
            })
            .unwrap_or_default();

        let stmt = format!(
            "{prefixes}
  INSERT DATA {{
    GRAPH {graph} {{
      {physical_ref}
        a nfo:FileDataObject ;
        nie:dataSource {logical_ref} ;
        mu:uuid {physical_id} ;
        nfo:fileName {physical_name} ;
        dct:creator {creator} ;
        dct:created {now} ;
        dct:modified {now} ;
        dct:format \"text/turtle\" ;
        nfo:fileSize {size} ;
        dbpedia:fileExtension \"ttl\" .
      {logical_ref}
        a nfo:FileDataObject ;
        mu:uuid {logical_id} ;
        nfo:fileName {logical_name} ;
        dct:creator {creator} ;
        dct:created {now} ;
        dct:modified {now} ;
        dct:format \"text/turtle\" ;
        nfo:fileSize {size} ;
        dbpedia:fileExtension \"ttl\" .
{provenance}    }}
  }}",
            prefixes = vocab::SPARQL_PREFIXES,
            graph = escape_uri(graph),
            physical_ref = escape_uri(&physical_uri),
            logical_ref = escape_uri(&logical_uri),
            physical_id = escape_string(physical_id),
            physical_name = escape_string(physical_name),
            creator = escape_uri(vocab::SERVICE_URI),
            logical_id = escape_string(&logical_id),
            logical_name = escape_string(logical_name),
        );
        if let Err(e) = self.client.update(&stmt).await {
            log::error!("failed to register file <{logical_uri}> in the store: {e}");
            return Err(e);
        }
        Ok(WrittenFile {
            logical_uri,
            physical_uri,
        })
    }

    /// Fresh path for a temp partition file inside the share folder.
    pub fn temp_path(&self, prefix: &str) -> PathBuf {
        self.share_folder
            .join(format!("{prefix}-{}.ttl", Uuid::new_v4()))
    }

    pub async fn make_empty_file(&self, path: &Path) -> Result<(), HarveyError> {
        fs::write(path, "").await?;
        Ok(())
    }

    pub async fn append_file(&self, path: &Path, content: &str) -> Result<(), HarveyError> {
        let mut file = fs::OpenOptions::new().append(true).open(path).await?;
        file.write_all(content.as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }
}

fn now_literal() -> String {
    Term::typed_literal(
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        XSD_DATE_TIME,
    )
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparql::mock::MockSparqlClient;

    #[tokio::test]
    async fn written_files_land_on_disk_and_in_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(MockSparqlClient::new());
        let engine = FileEngine::new(client.clone(), dir.path().to_path_buf());

        let written = engine
            .write_ttl_file(
                "http://a.example/graphs/tasks",
                "<http://a.example/s> <http://a.example/p> <http://a.example/o> .",
                "mirrored-triples.ttl",
                None,
            )
            .await
            .unwrap();

        let body = std::fs::read_to_string(engine.physical_path(&written.physical_uri)).unwrap();
        assert!(body.contains("<http://a.example/s>"));

        let updates = client.recorded_updates();
        assert_eq!(updates.len(), 1);
        assert!(updates[0].contains("nfo:FileDataObject"));
        assert!(updates[0].contains("nfo:fileSize"));
        assert!(updates[0].contains(&written.logical_uri));
        assert!(!updates[0].contains("prov:wasDerivedFrom"));
    }

    #[tokio::test]
    async fn provenance_is_recorded_when_known() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(MockSparqlClient::new());
        let engine = FileEngine::new(client.clone(), dir.path().to_path_buf());

        engine
            .write_ttl_file(
                "http://a.example/graphs/tasks",
                "",
                "complemented-triples.ttl",
                Some("http://a.example/files/source"),
            )
            .await
            .unwrap();

        let updates = client.recorded_updates();
        assert!(updates[0].contains("prov:wasDerivedFrom"));
        assert!(updates[0].contains("http://a.example/files/source"));
    }

    #[tokio::test]
    async fn temp_files_promote_by_rename() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(MockSparqlClient::new());
        let engine = FileEngine::new(client.clone(), dir.path().to_path_buf());

        let temp = engine.temp_path("complemented-triples");
        engine.make_empty_file(&temp).await.unwrap();
        engine.append_file(&temp, "line one").await.unwrap();
        engine.append_file(&temp, "line two").await.unwrap();

        let written = engine
            .promote_temp_file(
                "http://a.example/graphs/tasks",
                &temp,
                "complemented-triples.ttl",
                Some("http://a.example/files/source"),
            )
            .await
            .unwrap();

        assert!(!temp.exists());
        let body = std::fs::read_to_string(engine.physical_path(&written.physical_uri)).unwrap();
        assert_eq!(body, "line one\nline two\n");
    }
}
