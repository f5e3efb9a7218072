use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::HarveyError;
use crate::sparql::SparqlClient;

type FailurePredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Records every issued statement; answers queries by substring match
/// against canned responses, first match wins. Unmatched SELECTs get an
/// empty result set, unmatched ASKs `false`.
#[derive(Default)]
pub struct MockSparqlClient {
    pub queries: Mutex<Vec<String>>,
    pub updates: Mutex<Vec<String>>,
    responders: Mutex<Vec<(String, Value)>>,
    fail_update_when: Mutex<Option<FailurePredicate>>,
    query_delay: Mutex<Option<std::time::Duration>>,
}

impl MockSparqlClient {
    pub fn new() -> MockSparqlClient {
        MockSparqlClient::default()
    }

    pub fn respond(self, needle: &str, response: Value) -> Self {
        self.responders
            .lock()
            .unwrap()
            .push((needle.to_string(), response));
        self
    }

    pub fn respond_bool(self, needle: &str, value: bool) -> Self {
        self.respond(needle, json!({ "boolean": value }))
    }

    pub fn fail_updates_when<F>(self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        *self.fail_update_when.lock().unwrap() = Some(Box::new(predicate));
        self
    }

    /// Makes every query take a while, for exercising timeouts.
    pub fn with_query_delay(self, delay: std::time::Duration) -> Self {
        *self.query_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn recorded_updates(&self) -> Vec<String> {
        self.updates.lock().unwrap().clone()
    }

    pub fn recorded_queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

/// Builds a SPARQL results JSON document out of rows of (variable, binding)
/// pairs.
pub fn select_response(rows: &[&[(&str, Value)]]) -> Value {
    let bindings: Vec<Value> = rows
        .iter()
        .map(|row| {
            let mut object = serde_json::Map::new();
            for (var, binding) in row.iter() {
                object.insert(var.to_string(), binding.clone());
            }
            Value::Object(object)
        })
        .collect();
    json!({ "head": { "vars": [] }, "results": { "bindings": bindings } })
}

pub fn empty_response() -> Value {
    select_response(&[])
}

pub fn uri_binding(value: &str) -> Value {
    json!({ "type": "uri", "value": value })
}

pub fn literal_binding(value: &str) -> Value {
    json!({ "type": "literal", "value": value })
}

#[async_trait]
impl SparqlClient for MockSparqlClient {
    async fn query(&self, stmt: &str) -> Result<Value, HarveyError> {
        let delay = *self.query_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.queries.lock().unwrap().push(stmt.to_string());
        let responders = self.responders.lock().unwrap();
        for (needle, response) in responders.iter() {
            if stmt.contains(needle.as_str()) {
                return Ok(response.clone());
            }
        }
        if stmt.trim_start().starts_with("ASK") {
            return Ok(json!({ "boolean": false }));
        }
        Ok(empty_response())
    }

    async fn update(&self, stmt: &str) -> Result<(), HarveyError> {
        if let Some(predicate) = self.fail_update_when.lock().unwrap().as_ref() {
            if predicate(stmt) {
                return Err(HarveyError::Store {
                    status: 500,
                    body: "mock update failure".to_string(),
                });
            }
        }
        self.updates.lock().unwrap().push(stmt.to_string());
        Ok(())
    }
}
