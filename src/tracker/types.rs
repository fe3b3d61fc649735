//! Data model of the engagement tracker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form context data attached to an event.
pub type EventData = Map<String, Value>;

/// Coarse classification of demonstrated interest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementLevel {
    #[default]
    Cold,
    Warm,
    Hot,
}

impl EngagementLevel {
    /// Base conversion probability for this tier, in percent.
    pub fn base_probability(self) -> f64 {
        match self {
            EngagementLevel::Hot => 40.0,
            EngagementLevel::Warm => 20.0,
            EngagementLevel::Cold => 5.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EngagementLevel::Cold => "cold",
            EngagementLevel::Warm => "warm",
            EngagementLevel::Hot => "hot",
        }
    }
}

impl std::fmt::Display for EngagementLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded interaction. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionEvent {
    /// Event name
    pub event: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub user_id: String,
    /// Caller data merged with the environment snapshot
    pub data: EventData,
}

/// Revenue-potential accumulator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueMetrics {
    pub total_potential: f64,
    pub affiliate_clicks: u32,
    pub premium_interest: u32,
    pub subscriptions: u32,
    /// Clamped to 0..=100 after every update
    pub conversion_score: u32,
}

/// Observed price bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    pub fn widen(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }
}

/// Derived visitor profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub engagement_level: EngagementLevel,
    /// Categories in first-seen order, no duplicates
    pub interests: Vec<String>,
    pub price_range: Option<PriceRange>,
    /// Milliseconds since the tracker started, as of the last update
    pub session_duration: u64,
    pub page_views: u32,
    /// Deepest scroll percentage seen
    pub scroll_depth: u32,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            engagement_level: EngagementLevel::Cold,
            interests: Vec::new(),
            price_range: None,
            session_duration: 0,
            page_views: 1,
            scroll_depth: 0,
        }
    }
}

/// What gets written to persistent storage on every flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    pub events: Vec<InteractionEvent>,
    pub revenue: RevenueMetrics,
    pub user_profile: UserProfile,
    pub session_id: String,
    pub user_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_update: DateTime<Utc>,
}

/// Session part of [`AnalyticsSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    /// Milliseconds since the tracker started
    pub duration: u64,
    /// Events currently buffered
    pub events: usize,
}

/// Read-only view of the tracker state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub session: SessionSummary,
    pub revenue: RevenueMetrics,
    pub user_profile: UserProfile,
    pub conversion_probability: f64,
}

/// Numeric field, accepting numbers and numeric strings.
pub fn number(data: &EventData, key: &str) -> Option<f64> {
    match data.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Numeric field that is present and neither zero nor NaN.
pub fn nonzero_number(data: &EventData, key: &str) -> Option<f64> {
    number(data, key).filter(|v| *v != 0.0 && !v.is_nan())
}

/// Non-empty string field.
pub fn text<'a>(data: &'a EventData, key: &str) -> Option<&'a str> {
    data.get(key)?.as_str().filter(|s| !s.is_empty())
}

/// Build [`EventData`] from a `serde_json::json!` object literal.
///
/// Non-object values produce an empty map.
pub fn event_data(value: Value) -> EventData {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
