//! Optimizer engagement score.
//!
//! A single scalar in 0..=100 that only ever grows. Each behavior signal maps
//! to a fixed or capped number of points.

use serde::{Deserialize, Serialize};

/// Upper bound of the score.
pub const MAX_SCORE: f64 = 100.0;

/// Behavior signal feeding the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreAction {
    /// New maximum scroll percentage
    Scroll,
    /// Cumulative time on page in milliseconds
    Time,
    /// Cumulative click count
    Click,
    AffiliateInterest,
    PremiumInterest,
    FormEngagement,
}

impl ScoreAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ScoreAction::Scroll => "scroll",
            ScoreAction::Time => "time",
            ScoreAction::Click => "click",
            ScoreAction::AffiliateInterest => "affiliate_interest",
            ScoreAction::PremiumInterest => "premium_interest",
            ScoreAction::FormEngagement => "form_engagement",
        }
    }

    /// Points awarded for one signal carrying `value`.
    ///
    /// Scroll is worth at most 25, time at most 30 (three minutes) and clicks
    /// at most 20. Fixed-value signals ignore `value`.
    pub fn points(self, value: f64) -> f64 {
        let points = match self {
            ScoreAction::Scroll => (value / 4.0).min(25.0),
            ScoreAction::Time => (value / 6000.0).min(30.0),
            ScoreAction::Click => (value * 2.0).min(20.0),
            ScoreAction::AffiliateInterest => 20.0,
            ScoreAction::PremiumInterest => 25.0,
            ScoreAction::FormEngagement => 15.0,
        };
        // Negative or NaN inputs never take points away.
        if points.is_nan() {
            0.0
        } else {
            points.max(0.0)
        }
    }
}

impl std::fmt::Display for ScoreAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which threshold reaction a score calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBand {
    /// Below 20
    Idle,
    /// 20..40: pulse calls to action
    Encourage,
    /// 40..70: badges and live activity
    Enhance,
    /// 70 and above: VIP offer territory
    Vip,
}

impl ScoreBand {
    pub fn of(score: f64) -> Self {
        if score >= 70.0 {
            ScoreBand::Vip
        } else if score >= 40.0 {
            ScoreBand::Enhance
        } else if score >= 20.0 {
            ScoreBand::Encourage
        } else {
            ScoreBand::Idle
        }
    }
}

/// Add `points` to `score`, clamped to [`MAX_SCORE`].
pub fn accumulate(score: f64, points: f64) -> f64 {
    (score + points).min(MAX_SCORE)
}
