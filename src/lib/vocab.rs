//! Store vocabulary: the URIs and prefixes the harvesting job model is
//! expressed in. These are shared with the other services operating on the
//! same triple store and must not drift.

pub const TASK_TYPE: &str = "http://redpencil.data.gift/vocabularies/tasks/Task";
pub const ERROR_TYPE: &str = "http://open-services.net/ns/core#Error";

pub const STATUS_SCHEDULED: &str = "http://redpencil.data.gift/id/concept/JobStatus/scheduled";
pub const STATUS_BUSY: &str = "http://redpencil.data.gift/id/concept/JobStatus/busy";
pub const STATUS_SUCCESS: &str = "http://redpencil.data.gift/id/concept/JobStatus/success";
pub const STATUS_FAILED: &str = "http://redpencil.data.gift/id/concept/JobStatus/failed";

pub const OP_MIRRORING: &str = "http://lblod.data.gift/id/jobs/concept/TaskOperation/mirroring";
pub const OP_ADD_UUIDS: &str = "http://lblod.data.gift/id/jobs/concept/TaskOperation/add-uuids";
pub const OP_ADD_HARVESTING_TAG: &str =
    "http://lblod.data.gift/id/jobs/concept/TaskOperation/add-harvesting-tag";
pub const OP_ADD_VENDOR_TAG: &str =
    "http://lblod.data.gift/id/jobs/concept/TaskOperation/add-vendor-tag";
pub const OP_IMPORTING: &str = "http://lblod.data.gift/id/jobs/concept/TaskOperation/importing";
pub const OP_PUBLISH: &str =
    "http://lblod.data.gift/id/jobs/concept/TaskOperation/publishHarvestedTriples";
pub const OP_PUBLISH_WITH_DELETES: &str =
    "http://lblod.data.gift/id/jobs/concept/TaskOperation/publishHarvestedTriplesWithDeletes";
pub const OP_EXECUTE_DIFF_DELETES: &str =
    "http://lblod.data.gift/id/jobs/concept/TaskOperation/executeDiffDeletes";

pub const ERROR_URI_PREFIX: &str = "http://redpencil.data.gift/id/jobs/error/";
pub const DATA_CONTAINER_URI_PREFIX: &str = "http://redpencil.data.gift/id/dataContainers/";
pub const FILE_URI_PREFIX: &str = "http://data.lblod.info/files/";

pub const SERVICE_URI: &str = "http://lblod.data.gift/services/harvesting-import-service";
pub const HARVESTING_AGENT: &str = "http://lblod.data.gift/id/app/lblod-harvesting";

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const ADMS_STATUS: &str = "http://www.w3.org/ns/adms#status";
pub const MU_UUID: &str = "http://mu.semte.ch/vocabularies/core/uuid";
pub const OWL_SAME_AS: &str = "http://www.w3.org/2002/07/owl#sameAs";
pub const PROV_WAS_GENERATED_BY: &str = "http://www.w3.org/ns/prov#wasGeneratedBy";
pub const PROV_WAS_ASSOCIATED_WITH: &str = "http://www.w3.org/ns/prov#wasAssociatedWith";
pub const PROV_WAS_DERIVED_FROM: &str = "http://www.w3.org/ns/prov#wasDerivedFrom";

// Diff files produced by the upstream differencing step carry fixed logical
// names; the removals file is the input of the diff-delete pipelines.
pub const REMOVALS_FILE_NAME: &str = "to-remove-triples.ttl";

pub const SPARQL_PREFIXES: &str = "\
  PREFIX mu: <http://mu.semte.ch/vocabularies/core/>
  PREFIX task: <http://redpencil.data.gift/vocabularies/tasks/>
  PREFIX dct: <http://purl.org/dc/terms/>
  PREFIX prov: <http://www.w3.org/ns/prov#>
  PREFIX nie: <http://www.semanticdesktop.org/ontologies/2007/01/19/nie#>
  PREFIX nfo: <http://www.semanticdesktop.org/ontologies/2007/03/22/nfo#>
  PREFIX ext: <http://mu.semte.ch/vocabularies/ext/>
  PREFIX oslc: <http://open-services.net/ns/core#>
  PREFIX cogs: <http://vocab.deri.ie/cogs#>
  PREFIX adms: <http://www.w3.org/ns/adms#>
  PREFIX dbpedia: <http://dbpedia.org/ontology/>
";

pub const DEFAULT_KNOWN_DOMAINS: &[&str] = &[
    "data.lblod.info",
    "data.vlaanderen.be",
    "mu.semte.ch",
    "data.europa.eu",
    "purl.org",
    "www.ontologydesignpatterns.org",
    "www.w3.org",
    "xmlns.com",
    "www.semanticdesktop.org",
    "schema.org",
    "centrale-vindplaats.lblod.info",
];

pub const DEFAULT_PROTOCOLS_TO_RENAME: &[&str] = &["http:", "https:", "ftp:", "ftps:"];

// Predicates whose objects must keep pointing at the original resource,
// e.g. provenance links back to the harvested source.
pub const DEFAULT_IGNORED_RENAMING_PREDICATES: &[&str] = &[OWL_SAME_AS, PROV_WAS_DERIVED_FROM];
