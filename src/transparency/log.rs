//! Transparency log for the tracker's data handling.
//!
//! Counts what was recorded, persisted, forwarded and lost, so that the
//! at-most-once flush behavior is visible instead of silent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Transparency statistics for the current session.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Number of interaction events recorded
    events_recorded: AtomicU64,
    /// Number of flushes (snapshot writes)
    flushes: AtomicU64,
    /// Number of events handed to the remote sink successfully
    events_forwarded: AtomicU64,
    /// Number of events cleared after a failed forward
    events_dropped: AtomicU64,
    /// Number of interventions rendered
    interventions_shown: AtomicU64,
    /// Number of leads captured
    leads_captured: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    /// Create a new transparency log.
    pub fn new() -> Self {
        Self {
            events_recorded: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            events_forwarded: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            interventions_shown: AtomicU64::new(0),
            leads_captured: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a transparency log with persistence.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!(error = %e, "could not load previous transparency stats");
        }

        log
    }

    pub fn record_event(&self) {
        self.events_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self, count: u64) {
        self.events_forwarded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, count: u64) {
        self.events_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_intervention(&self) {
        self.interventions_shown.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lead(&self) {
        self.leads_captured.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            events_recorded: self.events_recorded.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            events_forwarded: self.events_forwarded.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            interventions_shown: self.interventions_shown.load(Ordering::Relaxed),
            leads_captured: self.leads_captured.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Events recorded: {}\n\
             - Flushes: {}\n\
             - Events forwarded: {}\n\
             - Events dropped after failed forward: {}\n\
             - Interventions shown: {}\n\
             - Leads captured: {}\n\
             \n\
             Data Handling:\n\
             - Form submissions keep field lengths only\n\
             - Forwarding is best-effort and unacknowledged",
            stats.events_recorded,
            stats.flushes,
            stats.events_forwarded,
            stats.events_dropped,
            stats.interventions_shown,
            stats.leads_captured,
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            // Ensure parent directory exists
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                events_recorded: stats.events_recorded,
                flushes: stats.flushes,
                events_forwarded: stats.events_forwarded,
                events_dropped: stats.events_dropped,
                interventions_shown: stats.interventions_shown,
                leads_captured: stats.leads_captured,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.events_recorded
                    .store(persisted.events_recorded, Ordering::Relaxed);
                self.flushes.store(persisted.flushes, Ordering::Relaxed);
                self.events_forwarded
                    .store(persisted.events_forwarded, Ordering::Relaxed);
                self.events_dropped
                    .store(persisted.events_dropped, Ordering::Relaxed);
                self.interventions_shown
                    .store(persisted.interventions_shown, Ordering::Relaxed);
                self.leads_captured
                    .store(persisted.leads_captured, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.events_recorded.store(0, Ordering::Relaxed);
        self.flushes.store(0, Ordering::Relaxed);
        self.events_forwarded.store(0, Ordering::Relaxed);
        self.events_dropped.store(0, Ordering::Relaxed);
        self.interventions_shown.store(0, Ordering::Relaxed);
        self.leads_captured.store(0, Ordering::Relaxed);
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub events_recorded: u64,
    pub flushes: u64,
    pub events_forwarded: u64,
    pub events_dropped: u64,
    pub interventions_shown: u64,
    pub leads_captured: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    events_recorded: u64,
    flushes: u64,
    events_forwarded: u64,
    events_dropped: u64,
    interventions_shown: u64,
    leads_captured: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

/// Create a new shared transparency log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparency_log_counting() {
        let log = TransparencyLog::new();

        log.record_event();
        log.record_event();
        log.record_forwarded(2);
        log.record_dropped(3);

        let stats = log.stats();
        assert_eq!(stats.events_recorded, 2);
        assert_eq!(stats.events_forwarded, 2);
        assert_eq!(stats.events_dropped, 3);
    }

    #[test]
    fn test_transparency_log_reset() {
        let log = TransparencyLog::new();

        log.record_intervention();
        log.record_lead();
        log.reset();

        let stats = log.stats();
        assert_eq!(stats.interventions_shown, 0);
        assert_eq!(stats.leads_captured, 0);
    }

    #[test]
    fn test_persistence_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transparency.json");

        let log = TransparencyLog::with_persistence(path.clone());
        log.record_flush();
        log.record_dropped(4);
        log.save().unwrap();

        let reloaded = TransparencyLog::with_persistence(path);
        let stats = reloaded.stats();
        assert_eq!(stats.flushes, 1);
        assert_eq!(stats.events_dropped, 4);
    }

    #[test]
    fn test_summary_format() {
        let log = TransparencyLog::new();
        let summary = log.summary();

        assert!(summary.contains("Events recorded"));
        assert!(summary.contains("dropped"));
        assert!(summary.contains("field lengths only"));
    }
}
