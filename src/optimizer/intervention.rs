//! Intervention descriptors.
//!
//! The optimizer decides *what* to show; a [`Presenter`](super::presenter::Presenter)
//! decides how. Descriptors carry only the data a presenter needs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifier of a rendered intervention, unique per optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InterventionId(pub u64);

impl std::fmt::Display for InterventionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One entry in the social proof rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialProofEntry {
    pub name: String,
    pub title: String,
    pub action: String,
    pub time: String,
}

impl SocialProofEntry {
    fn new(name: &str, title: &str, action: &str, time: &str) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            action: action.to_string(),
            time: time.to_string(),
        }
    }
}

/// The fixed social proof rotation, shown round-robin.
pub fn social_proof_feed() -> Vec<SocialProofEntry> {
    vec![
        SocialProofEntry::new("Carlos M.", "CEO, Tech Startup", "joined Elite", "2 min"),
        SocialProofEntry::new("Ana S.", "Marketing Director", "downloaded the report", "5 min"),
        SocialProofEntry::new("Roberto L.", "Senior Consultant", "bought through an affiliate", "8 min"),
        SocialProofEntry::new("María F.", "VP of Sales", "joined Basic", "12 min"),
        SocialProofEntry::new("Diego R.", "Founder", "attended the masterclass", "15 min"),
    ]
}

/// Viewer count shown on the live activity banner.
pub const LIVE_VIEWERS: u32 = 127;

/// Discount advertised by the VIP offer and granted on upgrade.
pub const VIP_DISCOUNT_PERCENT: u32 = 40;

/// Discount advertised by the flash banner.
pub const FLASH_DISCOUNT_PERCENT: u32 = 20;

/// What to put on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InterventionKind {
    /// Modal offering the elite tier at a discount
    VipOffer { discount_percent: u32 },
    /// "Hot" badges added to the product cards at these indices
    HotBadges { cards: Vec<usize> },
    /// Banner with a live viewer count
    LiveActivity { viewers: u32 },
    /// Pulse animation on primary calls to action
    CtaPulse,
    /// Modal with a lead magnet shown when the pointer leaves the page
    ExitIntentOffer,
    /// Toast naming another visitor's recent action
    SocialProof(SocialProofEntry),
    /// Banner with a cosmetic countdown
    FlashDiscount {
        discount_percent: u32,
        remaining_secs: u64,
    },
    /// Headline rewritten for an engaged visitor
    PersonalizedHero,
    /// Sidebar of recommended offers
    Recommendations,
    /// Upgrade confirmation notice
    UpgradeConfirmation { discount_percent: u32 },
    /// Thank-you notice after a lead is captured
    LeadCaptured,
}

impl InterventionKind {
    pub fn label(&self) -> &'static str {
        match self {
            InterventionKind::VipOffer { .. } => "vip_offer",
            InterventionKind::HotBadges { .. } => "hot_badges",
            InterventionKind::LiveActivity { .. } => "live_activity",
            InterventionKind::CtaPulse => "cta_pulse",
            InterventionKind::ExitIntentOffer => "exit_intent_offer",
            InterventionKind::SocialProof(_) => "social_proof",
            InterventionKind::FlashDiscount { .. } => "flash_discount",
            InterventionKind::PersonalizedHero => "personalized_hero",
            InterventionKind::Recommendations => "recommendations",
            InterventionKind::UpgradeConfirmation { .. } => "upgrade_confirmation",
            InterventionKind::LeadCaptured => "lead_captured",
        }
    }
}

/// A rendered or to-be-rendered intervention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intervention {
    pub id: InterventionId,
    pub kind: InterventionKind,
    /// Dismissed automatically after this long, if set
    #[serde(default, with = "optional_secs")]
    pub auto_dismiss: Option<Duration>,
}

mod optional_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.map(|d| d.as_secs_f64()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<f64>::deserialize(deserializer)?;
        Ok(secs.filter(|s| s.is_finite() && *s >= 0.0).map(Duration::from_secs_f64))
    }
}
