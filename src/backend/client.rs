use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::{BackendError, SearchBackend};
use crate::config::ElasticsearchConfig;

/// HTTP client for an Elasticsearch-compatible REST endpoint
#[derive(Debug, Clone)]
pub struct ElasticClient {
    http_client: reqwest::Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl ElasticClient {
    pub fn new(config: &ElasticsearchConfig) -> Result<Self, BackendError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::Setup(e.to_string()))?;

        let credentials = match (&config.username, &config.password) {
            (Some(user), password) => Some((user.clone(), password.clone().unwrap_or_default())),
            (None, _) => None,
        };

        Ok(Self {
            http_client,
            base_url: config.url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.http_client.post(url);
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, Some(password)),
            None => request,
        }
    }

    async fn send_json(&self, url: &str, body: &Value) -> Result<Value, BackendError> {
        let response = self
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(BackendError::RemoteError(format!("{}: {}", status, error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::Deserialization(e.to_string()))
    }
}

#[async_trait]
impl SearchBackend for ElasticClient {
    async fn search(&self, index: &str, body: &Value) -> Result<Vec<Value>, BackendError> {
        let url = format!("{}/{}/_search", self.base_url, index);
        tracing::debug!(index = %index, "Running search");
        let response = self.send_json(&url, body).await?;
        extract_hits(&response)
    }

    async fn index_document(&self, index: &str, document: &Value) -> Result<(), BackendError> {
        let url = format!("{}/{}/_doc", self.base_url, index);
        let response = self.send_json(&url, document).await?;
        let id = response.get("_id").and_then(|id| id.as_str()).unwrap_or("?");
        tracing::debug!(index = %index, id = %id, "Document indexed");
        Ok(())
    }
}

/// Pull `hits.hits[]._source` out of a search response
pub fn extract_hits(response: &Value) -> Result<Vec<Value>, BackendError> {
    let hits = response
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::Deserialization("response has no hits.hits array".into()))?;

    hits.iter()
        .map(|hit| {
            hit.get("_source")
                .cloned()
                .ok_or_else(|| BackendError::Deserialization("hit has no _source".into()))
        })
        .collect()
}
