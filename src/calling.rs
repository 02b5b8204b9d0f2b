use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::model::{BatchRequest, SimulationRequest};

const DEFAULT_API_BASE: &str = "https://api.elevenlabs.io/";
const BATCH_SUBMIT_PATH: &str = "v1/convai/batch-calling/submit";
pub const API_KEY_HEADER: &str = "xi-api-key";
/// Batch id reported when a successful response carries no `id`.
pub const MISSING_BATCH_ID: &str = "N/A";

#[derive(Debug, Error)]
pub enum CallingError {
    #[error("remote rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

#[async_trait]
pub trait BatchCallingService: Send + Sync {
    /// Submit one batch and return the remote batch id.
    async fn submit_batch(&self, request: &BatchRequest) -> Result<String, CallingError>;

    async fn simulate_conversation(
        &self,
        agent_id: &str,
        request: &SimulationRequest,
    ) -> Result<Value, CallingError>;
}

#[derive(Clone)]
pub struct BatchCallingClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl fmt::Debug for BatchCallingClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchCallingClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl BatchCallingClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self, CallingError> {
        let base_url = parse_base_url(DEFAULT_API_BASE)?;
        Self::with_base_url(api_key, base_url, timeout)
    }

    pub fn with_base_url(
        api_key: String,
        base_url: Url,
        timeout: Duration,
    ) -> Result<Self, CallingError> {
        let http = Client::builder()
            .user_agent("meditation-caller/0.1")
            .timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, CallingError> {
        let base_url = parse_base_url(&cfg.api.base_url)?;
        Self::with_base_url(
            cfg.api.api_key.clone(),
            base_url,
            Duration::from_secs(cfg.api.timeout_seconds),
        )
    }

    pub fn build_request<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Request, CallingError> {
        let endpoint = self
            .base_url
            .join(path)
            .map_err(|err| CallingError::InvalidEndpoint(format!("{path}: {err}")))?;
        let request = self
            .http
            .post(endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .build()?;
        Ok(request)
    }

    /// Send a request and return the JSON body, or `Value::Null` when a
    /// successful response body is not JSON.
    async fn execute(&self, request: reqwest::Request) -> Result<Value, CallingError> {
        debug!(url = %request.url(), "sending calling API request");
        let res = self.http.execute(request).await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(CallingError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let text = res.text().await?;
        match serde_json::from_str(&text) {
            Ok(value) => Ok(value),
            Err(err) => {
                warn!(%err, body = %text, "calling API returned a non-JSON success body");
                Ok(Value::Null)
            }
        }
    }

    pub async fn submit_batch(&self, request: &BatchRequest) -> Result<String, CallingError> {
        let http_request = self.build_request(BATCH_SUBMIT_PATH, request)?;
        let body = self.execute(http_request).await?;
        Ok(batch_id_from(&body))
    }

    pub async fn simulate_conversation(
        &self,
        agent_id: &str,
        request: &SimulationRequest,
    ) -> Result<Value, CallingError> {
        let path = simulation_path(agent_id)?;
        let http_request = self.build_request(&path, request)?;
        self.execute(http_request).await
    }
}

#[async_trait]
impl BatchCallingService for BatchCallingClient {
    async fn submit_batch(&self, request: &BatchRequest) -> Result<String, CallingError> {
        BatchCallingClient::submit_batch(self, request).await
    }

    async fn simulate_conversation(
        &self,
        agent_id: &str,
        request: &SimulationRequest,
    ) -> Result<Value, CallingError> {
        BatchCallingClient::simulate_conversation(self, agent_id, request).await
    }
}

/// `id` of a submission response; string ids are used as-is, other non-null
/// values are rendered as JSON.
pub fn batch_id_from(body: &Value) -> String {
    match body.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Null) | None => MISSING_BATCH_ID.to_string(),
        Some(other) => other.to_string(),
    }
}

fn simulation_path(agent_id: &str) -> Result<String, CallingError> {
    let id = agent_id.trim();
    if id.is_empty() || id.contains(|c: char| matches!(c, '/' | '?' | '#')) {
        return Err(CallingError::InvalidEndpoint(format!(
            "agent id {agent_id:?} cannot be used in a path"
        )));
    }
    Ok(format!("v1/convai/agents/{id}/simulate-conversation"))
}

fn parse_base_url(raw: &str) -> Result<Url, CallingError> {
    // Url::join drops the last segment unless the base ends with a slash.
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|err| CallingError::InvalidEndpoint(format!("{raw}: {err}")))
}
