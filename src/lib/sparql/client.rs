use async_trait::async_trait;
use serde_json::Value;

use crate::errors::HarveyError;
use crate::sparql::SparqlClient;

/// SPARQL-over-HTTP client against a mu-semtech stack. All statements run
/// with elevated privileges; the surrounding authorization layer trusts the
/// `mu-auth-sudo` header from internal services.
pub struct HttpSparqlClient {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpSparqlClient {
    pub fn new<S: Into<String>>(endpoint: S) -> HttpSparqlClient {
        HttpSparqlClient {
            http_client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    async fn post(&self, field: &'static str, stmt: &str) -> Result<reqwest::Response, HarveyError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .header("Accept", "application/sparql-results+json")
            .header("mu-auth-sudo", "true")
            .form(&[(field, stmt)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HarveyError::Store {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl SparqlClient for HttpSparqlClient {
    async fn query(&self, stmt: &str) -> Result<Value, HarveyError> {
        log::trace!("query: {stmt}");
        let response = self.post("query", stmt).await?;
        Ok(response.json().await?)
    }

    async fn update(&self, stmt: &str) -> Result<(), HarveyError> {
        log::trace!("update: {stmt}");
        self.post("update", stmt).await?;
        Ok(())
    }
}
