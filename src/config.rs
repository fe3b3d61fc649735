//! Configuration for the page engagement agent.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engagement tracker settings
    pub tracker: TrackerConfig,

    /// Experience optimizer settings
    pub optimizer: OptimizerConfig,

    /// Path for the persistent storage scope and transparency stats
    pub data_path: PathBuf,

    /// Base URL of the remote analytics collector, if any
    pub collector_url: Option<String>,

    /// Bearer token sent to the collector
    pub collector_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("page-engagement-agent");

        Self {
            tracker: TrackerConfig::default(),
            optimizer: OptimizerConfig::default(),
            data_path: data_dir,
            collector_url: None,
            collector_token: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults when absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("page-engagement-agent")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Path of the persisted transparency stats.
    pub fn transparency_path(&self) -> PathBuf {
        self.data_path.join("transparency.json")
    }
}

/// What happens to buffered events when forwarding fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Clear the buffer after every forwarding attempt (events may be lost)
    #[default]
    AtMostOnce,
    /// Keep the buffer until the sink accepts it
    Confirmed,
}

/// Engagement tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Interval between automatic flushes
    #[serde(with = "duration_serde")]
    pub flush_interval: Duration,

    /// Time-on-site milestones, in seconds
    pub time_milestones_secs: Vec<u64>,

    /// Scroll-depth milestones, in percent
    pub scroll_milestones: Vec<u32>,

    /// Session length after which a visitor counts as hot
    #[serde(with = "duration_serde")]
    pub hot_after: Duration,

    /// Buffer handling on failed forwards
    pub delivery: DeliveryMode,

    /// Capacity of the page event channel
    pub event_channel_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(30),
            time_milestones_secs: vec![30, 60, 120, 300],
            scroll_milestones: vec![25, 50, 75, 90],
            hot_after: Duration::from_secs(120),
            delivery: DeliveryMode::AtMostOnce,
            event_channel_capacity: 10_000,
        }
    }
}

impl TrackerConfig {
    pub fn time_milestones(&self) -> Vec<Duration> {
        self.time_milestones_secs
            .iter()
            .map(|s| Duration::from_secs(*s))
            .collect()
    }
}

/// Experience optimizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Interval of the time-on-site score tick
    #[serde(with = "duration_serde")]
    pub behavior_tick: Duration,

    /// Interval between social proof notifications
    #[serde(with = "duration_serde")]
    pub social_proof_interval: Duration,

    /// Delay before the flash discount check
    #[serde(with = "duration_serde")]
    pub dynamic_pricing_delay: Duration,

    /// Delay before the personalization pass
    #[serde(with = "duration_serde")]
    pub personalization_delay: Duration,

    /// Length of the cosmetic flash discount countdown
    #[serde(with = "duration_serde")]
    pub flash_discount_countdown: Duration,

    /// Auto-dismiss delays
    #[serde(with = "duration_serde")]
    pub vip_offer_dismiss: Duration,
    #[serde(with = "duration_serde")]
    pub live_activity_dismiss: Duration,
    #[serde(with = "duration_serde")]
    pub social_proof_dismiss: Duration,
    #[serde(with = "duration_serde")]
    pub recommendations_dismiss: Duration,
    #[serde(with = "duration_serde")]
    pub exit_offer_close: Duration,

    /// Number of leading product cards eligible for a hot badge
    pub badge_limit: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            behavior_tick: Duration::from_secs(1),
            social_proof_interval: Duration::from_secs(25),
            dynamic_pricing_delay: Duration::from_secs(120),
            personalization_delay: Duration::from_secs(5),
            flash_discount_countdown: Duration::from_secs(15 * 60),
            vip_offer_dismiss: Duration::from_secs(300),
            live_activity_dismiss: Duration::from_secs(10),
            social_proof_dismiss: Duration::from_secs(8),
            recommendations_dismiss: Duration::from_secs(30),
            exit_offer_close: Duration::from_secs(3),
            badge_limit: 3,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration (whole seconds).
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tracker.flush_interval, Duration::from_secs(30));
        assert_eq!(config.tracker.scroll_milestones, vec![25, 50, 75, 90]);
        assert_eq!(config.tracker.delivery, DeliveryMode::AtMostOnce);
        assert_eq!(config.optimizer.social_proof_interval, Duration::from_secs(25));
        assert_eq!(config.optimizer.badge_limit, 3);
        assert!(config.collector_url.is_none());
    }

    #[test]
    fn test_time_milestones() {
        let config = TrackerConfig::default();
        assert_eq!(
            config.time_milestones(),
            vec![
                Duration::from_secs(30),
                Duration::from_secs(60),
                Duration::from_secs(120),
                Duration::from_secs(300)
            ]
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"tracker": {"flush_interval": 10, "delivery": "confirmed"}}"#,
        )
        .unwrap();
        assert_eq!(config.tracker.flush_interval, Duration::from_secs(10));
        assert_eq!(config.tracker.delivery, DeliveryMode::Confirmed);
        assert_eq!(config.tracker.hot_after, Duration::from_secs(120));
        assert_eq!(config.optimizer.behavior_tick, Duration::from_secs(1));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.collector_url = Some("http://127.0.0.1:7070".to_string());
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.collector_url.as_deref(), Some("http://127.0.0.1:7070"));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.tracker.event_channel_capacity, 10_000);
    }
}
