//! Revenue-potential accounting and conversion probability.

use crate::tracker::types::{nonzero_number, number, EngagementLevel, EventData, RevenueMetrics, UserProfile};

/// Ceiling for both the conversion score and the conversion probability.
pub const SCORE_CEILING: u32 = 100;

const DEFAULT_AFFILIATE_VALUE: f64 = 50.0;
const DEFAULT_PLAN_VALUE: f64 = 39.0;
const DEEP_SCROLL_PERCENT: f64 = 75.0;

/// Apply the revenue rule for one recorded event. Unknown events are ignored.
pub fn update_revenue(revenue: &mut RevenueMetrics, name: &str, data: &EventData) {
    match name {
        "affiliate_click" => {
            revenue.affiliate_clicks += 1;
            revenue.total_potential +=
                nonzero_number(data, "estimatedValue").unwrap_or(DEFAULT_AFFILIATE_VALUE);
            revenue.conversion_score += 15;
        }
        "premium_interest" => {
            revenue.premium_interest += 1;
            revenue.total_potential += nonzero_number(data, "planValue").unwrap_or(DEFAULT_PLAN_VALUE);
            revenue.conversion_score += 25;
        }
        "subscribe" => {
            revenue.subscriptions += 1;
            revenue.total_potential += nonzero_number(data, "value").unwrap_or(DEFAULT_PLAN_VALUE);
            revenue.conversion_score += 100;
        }
        "lead" => {
            revenue.conversion_score += 10;
        }
        "scroll_depth" => {
            if number(data, "percentage").is_some_and(|p| p > DEEP_SCROLL_PERCENT) {
                revenue.conversion_score += 5;
            }
        }
        _ => {}
    }

    revenue.conversion_score = revenue.conversion_score.min(SCORE_CEILING);
}

/// Heuristic purchase likelihood in percent, clamped to 0..=100.
///
/// Minutes are taken from the profile's session duration, i.e. as of the
/// last recorded event.
pub fn conversion_probability(profile: &UserProfile, revenue: &RevenueMetrics) -> f64 {
    let minutes = profile.session_duration as f64 / 60_000.0;
    let probability = base(profile.engagement_level)
        + 10.0 * f64::from(revenue.affiliate_clicks)
        + 15.0 * f64::from(revenue.premium_interest)
        + 2.0 * minutes;
    probability.clamp(0.0, f64::from(SCORE_CEILING))
}

fn base(level: EngagementLevel) -> f64 {
    level.base_probability()
}
