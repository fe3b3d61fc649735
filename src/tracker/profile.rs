//! Profile rules: engagement tier, interests and price preferences.

use crate::tracker::types::{nonzero_number, number, text, EngagementLevel, EventData, PriceRange, UserProfile};

/// Scroll percentage above which a visitor warms up.
const WARM_SCROLL_PERCENT: f64 = 50.0;

/// Apply the profile rules for one recorded event.
///
/// `session_duration_ms` is the elapsed session time at the moment of the
/// event; `hot_after_ms` the threshold past which any event makes the visitor
/// hot. All matching rules apply, in order. No rule lowers the tier.
pub fn update_profile(
    profile: &mut UserProfile,
    name: &str,
    data: &EventData,
    session_duration_ms: u64,
    hot_after_ms: u64,
) {
    profile.session_duration = session_duration_ms;

    if name == "scroll_depth"
        && number(data, "percentage").is_some_and(|p| p > WARM_SCROLL_PERCENT)
    {
        raise(profile, EngagementLevel::Warm);
    }
    if profile.session_duration > hot_after_ms {
        raise(profile, EngagementLevel::Hot);
    }
    if matches!(name, "affiliate_click" | "premium_interest") {
        raise(profile, EngagementLevel::Hot);
    }

    if let Some(category) = text(data, "category") {
        if !profile.interests.iter().any(|i| i == category) {
            profile.interests.push(category.to_string());
        }
    }

    if let Some(value) = nonzero_number(data, "estimatedValue") {
        match profile.price_range.as_mut() {
            Some(range) => range.widen(value),
            None => {
                profile.price_range = Some(PriceRange {
                    min: value,
                    max: value,
                })
            }
        }
    }
}

fn raise(profile: &mut UserProfile, level: EngagementLevel) {
    if level > profile.engagement_level {
        profile.engagement_level = level;
    }
}
