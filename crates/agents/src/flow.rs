use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

pub const MIN_FLOW_TIMEOUT: Duration = Duration::from_secs(45);
pub const MAX_FLOW_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_ERROR_BODY_CHARS: usize = 512;

/// An external AI flow that answers a prompt with a JSON envelope.
pub trait AiFlow: Send + Sync {
    fn run(&self, input: &str) -> impl Future<Output = Result<Value, FlowError>> + Send;
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("ai flow url is not configured")]
    NotConfigured,
    #[error("ai flow returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("ai flow request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("ai flow response was not JSON: {0}")]
    Decode(#[source] reqwest::Error),
}

impl FlowError {
    /// Only HTTP error statuses are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Status { .. })
    }
}

#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub url: String,
    pub token: String,
    pub org_id: String,
    pub timeout: Duration,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            org_id: String::new(),
            timeout: MIN_FLOW_TIMEOUT,
        }
    }
}

impl FlowConfig {
    pub fn clamp_timeout(timeout: Duration) -> Duration {
        timeout.clamp(MIN_FLOW_TIMEOUT, MAX_FLOW_TIMEOUT)
    }

    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

/// Langflow "run" endpoint client.
#[derive(Debug, Clone)]
pub struct LangflowClient {
    http: Client,
    config: FlowConfig,
}

impl LangflowClient {
    pub fn new(mut config: FlowConfig) -> Result<Self> {
        config.timeout = FlowConfig::clamp_timeout(config.timeout);

        if !config.is_configured() {
            error!("LANGFLOW_URL is not set; every planning turn will use the fallback reply");
        } else if let Err(err) = Url::parse(config.url.trim()) {
            error!(url = %config.url, error = %err, "LANGFLOW_URL is not a valid url");
        }
        if config.token.trim().is_empty() {
            error!("LANGFLOW_TOKEN is missing; the flow will likely reject requests");
        } else {
            info!(timeout_secs = config.timeout.as_secs(), "ai flow client initialized");
        }

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(6))
            .timeout(config.timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { http, config })
    }
}

pub fn flow_payload(input: &str) -> Value {
    json!({
        "input_value": input,
        "inputType": "chat",
        "outputType": "chat",
        "tweaks": {}
    })
}

impl AiFlow for LangflowClient {
    async fn run(&self, input: &str) -> Result<Value, FlowError> {
        if !self.config.is_configured() {
            return Err(FlowError::NotConfigured);
        }

        info!(chars = input.chars().count(), "sending query to ai flow");
        let response = self
            .http
            .post(self.config.url.trim())
            .bearer_auth(self.config.token.as_str())
            .header("X-DataStax-Current-Org", self.config.org_id.as_str())
            .json(&flow_payload(input))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FlowError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        response.json::<Value>().await.map_err(FlowError::Decode)
    }
}
