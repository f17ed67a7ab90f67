//! HTTP client for the remote analysis service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::domain::capabilities::RemoteAnalysis;
use crate::domain::errors::RemoteServiceError;
use crate::infra::config::Remote;

const STORE_PATH: &str = "/api/store";
const SIMPLIFY_PATH: &str = "/api/simplify";
const INDEX_PATH: &str = "/api/index";
const QUERY_PATH: &str = "/api/query";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryBody {
    answer: String,
}

/// JSON-over-HTTP implementation of [`RemoteAnalysis`]. Requests are never retried.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| RemoteServiceError::Network(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn from_config(config: &Remote) -> Result<Self, RemoteServiceError> {
        Self::new(config.base_url(), config.timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, RemoteServiceError> {
        let url = self.url(path);
        tracing::debug!(%url, "posting to remote analysis service");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|err| RemoteServiceError::Network(err.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| RemoteServiceError::Network(err.to_string()))?;

        if !status.is_success() {
            return Err(map_error(status, &text));
        }

        serde_json::from_str(&text).map_err(|err| RemoteServiceError::InvalidResponse(err.to_string()))
    }
}

fn map_error(status: StatusCode, text: &str) -> RemoteServiceError {
    let message = serde_json::from_str::<ErrorBody>(text)
        .ok()
        .and_then(|body| body.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    RemoteServiceError::Status {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl RemoteAnalysis for RemoteClient {
    async fn store(&self, document: &Value) -> Result<Value, RemoteServiceError> {
        self.post(STORE_PATH, document).await
    }

    async fn simplify(&self, record: &Value) -> Result<Value, RemoteServiceError> {
        self.post(SIMPLIFY_PATH, record).await
    }

    async fn build_index(&self, elements: &[Value]) -> Result<Value, RemoteServiceError> {
        self.post(INDEX_PATH, &json!({ "elements": elements })).await
    }

    async fn query(&self, question: &str, top_k: usize) -> Result<String, RemoteServiceError> {
        let body = self
            .post(QUERY_PATH, &json!({ "query": question, "top_k": top_k }))
            .await?;
        serde_json::from_value::<QueryBody>(body)
            .map(|body| body.answer)
            .map_err(|err| RemoteServiceError::InvalidResponse(err.to_string()))
    }
}
