use std::path::PathBuf;
use std::time::Duration;

use rocket::figment::providers::{Env, Format, Serialized, Toml};
use rocket::figment::Figment;
use rocket::serde::{Deserialize, Serialize};

use crate::vocab;

// Environment options recognized next to the TOML document. Everything
// list-valued (domain allow-list and friends) only lives in the TOML file.
const ENV_OPTIONS: &[&str] = &[
    "SPARQL_ENDPOINT",
    "BATCH_SPARQL_ENDPOINT",
    "TARGET_GRAPH",
    "RENAME_DOMAIN",
    "SLEEP_TIME",
    "BATCH_SIZE",
    "MAX_RETRIES",
    "RETRY_WAIT_INTERVAL",
    "TASK_TIMEOUT_HOURS",
    "SHARE_FOLDER",
];

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub sparql_endpoint: String,
    /// Endpoint for expensive batched writes and deletes. Falls back to the
    /// regular endpoint when unset.
    pub batch_sparql_endpoint: Option<String>,
    pub target_graph: String,
    pub rename_domain: String,
    /// Pause between halving retries of a failed batch, in milliseconds.
    pub sleep_time: u64,
    pub batch_size: usize,
    pub max_retries: u32,
    /// Pause between whole-operation retries, in milliseconds.
    pub retry_wait_interval: u64,
    /// 0 disables the timeout wrapper entirely.
    pub task_timeout_hours: f64,
    pub share_folder: PathBuf,
    pub known_domains: Vec<String>,
    pub protocols_to_rename: Vec<String>,
    pub ignored_renaming_predicates: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sparql_endpoint: "http://database:8890/sparql".to_string(),
            batch_sparql_endpoint: None,
            target_graph: "http://mu.semte.ch/graphs/public".to_string(),
            rename_domain: "http://centrale-vindplaats.lblod.info/id/".to_string(),
            sleep_time: 1000,
            batch_size: 100,
            max_retries: 5,
            retry_wait_interval: 30000,
            task_timeout_hours: 0.0,
            share_folder: PathBuf::from("/share"),
            known_domains: vocab::DEFAULT_KNOWN_DOMAINS
                .iter()
                .map(|d| d.to_string())
                .collect(),
            protocols_to_rename: vocab::DEFAULT_PROTOCOLS_TO_RENAME
                .iter()
                .map(|p| p.to_string())
                .collect(),
            ignored_renaming_predicates: vocab::DEFAULT_IGNORED_RENAMING_PREDICATES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl Config {
    /// Defaults, overlaid with the TOML document and the plain environment
    /// options listed above.
    pub fn load() -> Result<Config, rocket::figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(Env::var_or("HARVEY_CONFIG", "harvey.toml")))
            .merge(Env::raw().only(ENV_OPTIONS))
            .extract()
    }

    pub fn sleep_time(&self) -> Duration {
        Duration::from_millis(self.sleep_time)
    }

    pub fn retry_wait_interval(&self) -> Duration {
        Duration::from_millis(self.retry_wait_interval)
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        if self.task_timeout_hours > 0.0 {
            Some(Duration::from_secs_f64(self.task_timeout_hours * 3600.0))
        } else {
            None
        }
    }
}
