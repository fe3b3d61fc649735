//! Remote collector interface for analytics batches.
//!
//! Forwarding is fire-and-forget: the tracker hands a payload to a
//! [`CollectorSink`] and only looks at the result to decide what to do with
//! its buffer.

use crate::tracker::types::{InteractionEvent, RevenueMetrics, UserProfile};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// JSON document accepted by the remote collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectorPayload {
    pub session_id: String,
    pub user_id: String,
    pub events: Vec<InteractionEvent>,
    pub revenue: RevenueMetrics,
    pub user_profile: UserProfile,
}

/// Sink error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The collector could not be reached
    Unreachable(String),
    /// The collector answered with a non-success status
    Rejected { status: u16, message: String },
    /// The payload could not be encoded
    Serialization(String),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Unreachable(msg) => write!(f, "Collector unreachable: {msg}"),
            SinkError::Rejected { status, message } => {
                write!(f, "Collector rejected batch ({status}): {message}")
            }
            SinkError::Serialization(msg) => write!(f, "Collector serialization error: {msg}"),
        }
    }
}

impl std::error::Error for SinkError {}

/// Destination for analytics batches.
pub trait CollectorSink: Send + Sync {
    fn send(&self, payload: &CollectorPayload) -> Result<(), SinkError>;
}

/// Shared handle to a sink.
pub type SharedSink = Arc<dyn CollectorSink>;

/// Sink used when no collector is configured; accepts and discards.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl CollectorSink for NoopSink {
    fn send(&self, payload: &CollectorPayload) -> Result<(), SinkError> {
        debug!(
            session_id = %payload.session_id,
            events = payload.events.len(),
            conversion_score = payload.revenue.conversion_score,
            "no collector configured, discarding batch"
        );
        Ok(())
    }
}

/// Sink that keeps every accepted payload in memory.
///
/// Can be switched into a failing mode to exercise lossy delivery.
#[derive(Debug, Default)]
pub struct MemorySink {
    payloads: Mutex<Vec<CollectorPayload>>,
    failing: AtomicBool,
    attempts: Mutex<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Payloads accepted so far.
    pub fn payloads(&self) -> Vec<CollectorPayload> {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events across all accepted payloads.
    pub fn delivered_events(&self) -> usize {
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|p| p.events.len())
            .sum()
    }

    /// Number of send calls, successful or not.
    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CollectorSink for MemorySink {
    fn send(&self, payload: &CollectorPayload) -> Result<(), SinkError> {
        *self.attempts.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Unreachable("memory sink set to fail".to_string()));
        }
        self.payloads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(payload.clone());
        Ok(())
    }
}
