//! HTTP client for the remote decision authority.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use groveos_types::GroveError;

use crate::collab::DecisionService;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct DecisionReply {
    #[serde(default)]
    response: String,
}

/// Talks to the coordinator's `/make_decision` endpoint.
pub struct CoordinatorClient {
    http: reqwest::Client,
    base_url: String,
}

impl CoordinatorClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, GroveError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GroveError::Collaborator(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl DecisionService for CoordinatorClient {
    async fn ask(&self, query: &str) -> Result<String, GroveError> {
        let url = format!("{}/make_decision", self.base_url.trim_end_matches('/'));
        debug!(%url, "querying decision authority");
        let reply: DecisionReply = self
            .http
            .post(&url)
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(|e| GroveError::Collaborator(format!("decision request: {e}")))?
            .error_for_status()
            .map_err(|e| GroveError::Collaborator(format!("decision request: {e}")))?
            .json()
            .await
            .map_err(|e| GroveError::Collaborator(format!("decision reply decode: {e}")))?;
        Ok(reply.response)
    }
}
