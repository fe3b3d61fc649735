//! HTTP client for the analytics collector.
//!
//! Posts analytics batches to `{base}/v1/analytics`. The blocking client
//! implements [`CollectorSink`](crate::sink::CollectorSink) so the tracker can
//! forward through it directly.

use crate::sink::SinkError;
#[cfg(feature = "gateway")]
use crate::sink::{CollectorPayload, CollectorSink};
use serde::{Deserialize, Serialize};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Collector base URL, e.g. `http://127.0.0.1:8787`
    pub base_url: String,
    /// Optional bearer token
    pub token: Option<String>,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token,
        }
    }

    /// Build from the collector settings of a [`Config`](crate::config::Config).
    pub fn from_config(config: &crate::config::Config) -> Result<Self, GatewayError> {
        let base_url = config
            .collector_url
            .clone()
            .ok_or_else(|| GatewayError::Config("no collector_url configured".to_string()))?;
        Ok(Self::new(base_url, config.collector_token.clone()))
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Get the analytics ingest endpoint URL.
    pub fn analytics_url(&self) -> String {
        format!("{}/v1/analytics", self.base())
    }

    /// Get the health check endpoint URL.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.base())
    }
}

/// Gateway client error types.
#[derive(Debug)]
pub enum GatewayError {
    /// Configuration error
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Server returned an error response
    Server { status: u16, message: String },
    /// JSON serialization error
    Serialization(String),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Config(msg) => write!(f, "Gateway config error: {msg}"),
            GatewayError::Network(msg) => write!(f, "Gateway network error: {msg}"),
            GatewayError::Server { status, message } => {
                write!(f, "Gateway server error ({status}): {message}")
            }
            GatewayError::Serialization(msg) => write!(f, "Gateway serialization error: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<GatewayError> for SinkError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Server { status, message } => SinkError::Rejected { status, message },
            GatewayError::Serialization(msg) => SinkError::Serialization(msg),
            GatewayError::Config(msg) | GatewayError::Network(msg) => SinkError::Unreachable(msg),
        }
    }
}

/// Collector acknowledgement for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorAck {
    /// Events stored by the collector
    pub accepted: usize,
}

/// Async collector client.
#[cfg(feature = "gateway")]
pub struct GatewayClient {
    config: GatewayConfig,
    client: reqwest::Client,
    agent_id: String,
}

#[cfg(feature = "gateway")]
impl GatewayClient {
    /// Create a new gateway client.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to create HTTP client: {e}")))?;

        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let agent_id = format!(
            "page-engagement-{}-{}",
            hostname,
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );

        Ok(Self {
            config,
            client,
            agent_id,
        })
    }

    /// Test connection to the collector.
    pub async fn test_connection(&self) -> Result<bool, GatewayError> {
        let response = self
            .client
            .get(self.config.health_url())
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    /// Post one analytics batch.
    pub async fn send_batch(&self, payload: &CollectorPayload) -> Result<CollectorAck, GatewayError> {
        let mut request = self
            .client
            .post(self.config.analytics_url())
            .header("X-Agent-Id", &self.agent_id)
            .json(payload);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GatewayError::Server {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::Serialization(e.to_string()))
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }
}

/// Blocking collector client for use in synchronous contexts.
///
/// Must not be used from inside another tokio runtime.
#[cfg(feature = "gateway")]
pub struct BlockingGatewayClient {
    inner: GatewayClient,
    runtime: tokio::runtime::Runtime,
}

#[cfg(feature = "gateway")]
impl BlockingGatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            inner: GatewayClient::new(config)?,
            runtime,
        })
    }

    pub fn test_connection(&self) -> Result<bool, GatewayError> {
        self.runtime.block_on(self.inner.test_connection())
    }

    pub fn send_batch(&self, payload: &CollectorPayload) -> Result<CollectorAck, GatewayError> {
        self.runtime.block_on(self.inner.send_batch(payload))
    }

    pub fn agent_id(&self) -> &str {
        self.inner.agent_id()
    }
}

#[cfg(feature = "gateway")]
impl CollectorSink for BlockingGatewayClient {
    fn send(&self, payload: &CollectorPayload) -> Result<(), SinkError> {
        let ack = self.send_batch(payload)?;
        tracing::debug!(accepted = ack.accepted, "collector acknowledged batch");
        Ok(())
    }
}
