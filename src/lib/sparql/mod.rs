use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::HarveyError;
use crate::rdf::Term;

pub mod client;
#[cfg(test)]
pub mod mock;

pub use client::HttpSparqlClient;

/// The query/update capability of the remote triple store. The store itself
/// serializes its own conflicting writes; this interface takes no locks.
#[async_trait]
pub trait SparqlClient: Send + Sync {
    /// SELECT/ASK. Returns the raw SPARQL results JSON.
    async fn query(&self, stmt: &str) -> Result<Value, HarveyError>;

    /// INSERT/DELETE/other side-effecting statements.
    async fn update(&self, stmt: &str) -> Result<(), HarveyError>;
}

pub type Bindings = Vec<HashMap<String, Term>>;

pub fn parse_bindings(response: &Value) -> Result<Bindings, HarveyError> {
    let rows = response["results"]["bindings"]
        .as_array()
        .ok_or_else(|| HarveyError::UnexpectedResponse(response.to_string()))?;
    let mut bindings = Vec::with_capacity(rows.len());
    for row in rows {
        let object = row
            .as_object()
            .ok_or_else(|| HarveyError::UnexpectedResponse(row.to_string()))?;
        let mut parsed = HashMap::with_capacity(object.len());
        for (var, binding) in object {
            parsed.insert(var.clone(), Term::from_binding(binding)?);
        }
        bindings.push(parsed);
    }
    Ok(bindings)
}

pub fn parse_boolean(response: &Value) -> Result<bool, HarveyError> {
    response["boolean"]
        .as_bool()
        .ok_or_else(|| HarveyError::UnexpectedResponse(response.to_string()))
}

pub async fn select(client: &dyn SparqlClient, stmt: &str) -> Result<Bindings, HarveyError> {
    let response = client.query(stmt).await?;
    parse_bindings(&response)
}

pub async fn ask(client: &dyn SparqlClient, stmt: &str) -> Result<bool, HarveyError> {
    let response = client.query(stmt).await?;
    parse_boolean(&response)
}

pub fn escape_uri(uri: &str) -> String {
    format!("<{}>", uri.replace('>', "%3E"))
}

pub fn escape_string(value: &str) -> String {
    format!("\"{}\"", crate::rdf::escape_literal(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_parse_into_terms() {
        let response = serde_json::json!({
            "head": { "vars": ["s", "count"] },
            "results": { "bindings": [
                {
                    "s": { "type": "uri", "value": "http://a.example/s" },
                    "count": {
                        "type": "typed-literal",
                        "value": "42",
                        "datatype": "http://www.w3.org/2001/XMLSchema#integer"
                    }
                }
            ]}
        });
        let bindings = parse_bindings(&response).unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0]["s"], Term::uri("http://a.example/s"));
    }

    #[test]
    fn booleans_parse() {
        assert!(parse_boolean(&serde_json::json!({"boolean": true})).unwrap());
        assert!(parse_boolean(&serde_json::json!({"results": {}})).is_err());
    }

    #[test]
    fn string_escaping_quotes() {
        assert_eq!(escape_string("a \"b\""), "\"a \\\"b\\\"\"");
    }
}
