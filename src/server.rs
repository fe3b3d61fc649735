//! HTTP collector for analytics batches.
//!
//! This module provides an HTTP server that:
//! - Accepts tracker batches via `POST /v1/analytics`
//! - Appends each batch as one JSON line to an output file
//! - Answers `GET /health`
//!
//! # Architecture
//!
//! ```text
//! page tracker ──→ POST /v1/analytics ──→ collector ──→ analytics.jsonl
//! ```

use crate::gateway::CollectorAck;
use crate::sink::CollectorPayload;
use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// JSON-lines file batches are appended to
    pub output: PathBuf,
    /// Bearer token required on ingest, if set
    pub token: Option<String>,
}

impl ServerConfig {
    pub fn new(port: u16, output: PathBuf) -> Self {
        Self {
            port,
            output,
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// One stored line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredBatch {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub received_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub payload: CollectorPayload,
}

/// Shared server state
struct ServerState {
    output: PathBuf,
    token: Option<String>,
    /// Serializes appends to the output file
    write_lock: Mutex<()>,
}

impl ServerState {
    async fn append(&self, batch: &StoredBatch) -> std::io::Result<()> {
        let line = serde_json::to_string(batch)?;
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output)?;
        writeln!(file, "{line}")
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.token else {
            return true;
        };
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|t| t == expected)
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: String, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error,
            code: code.to_string(),
        }),
    )
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /v1/analytics
async fn ingest(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Json(payload): Json<CollectorPayload>,
) -> Result<Json<CollectorAck>, ApiError> {
    if !state.authorized(&headers) {
        return Err(api_error(
            StatusCode::UNAUTHORIZED,
            "missing or invalid bearer token".to_string(),
            "UNAUTHORIZED",
        ));
    }

    let accepted = payload.events.len();
    let batch = StoredBatch {
        received_at: Utc::now(),
        agent_id: headers
            .get("X-Agent-Id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        payload,
    };

    state.append(&batch).await.map_err(|e| {
        tracing::error!("Failed to store batch: {}", e);
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to store batch: {e}"),
            "STORAGE_ERROR",
        )
    })?;

    tracing::info!(
        session_id = %batch.payload.session_id,
        events = accepted,
        "analytics batch stored"
    );

    Ok(Json(CollectorAck { accepted }))
}

/// Run the HTTP server
pub async fn run(config: ServerConfig) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(ServerState {
        output: config.output.clone(),
        token: config.token.clone(),
        write_lock: Mutex::new(()),
    });

    let app = Router::new()
        .route("/health", get(health))
        .route("/v1/analytics", post(ingest))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Collector listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Collector shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
