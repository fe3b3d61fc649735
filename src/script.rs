//! Timed replay scripts.
//!
//! A script is a JSON document listing page events and visitor actions at
//! millisecond offsets from page load:
//!
//! ```json
//! {
//!   "environment": { "url": "https://club.example/", "viewport_width": 1280 },
//!   "product_cards": 6,
//!   "steps": [
//!     { "at_ms": 1500, "event": { "type": "scroll", "scroll_top": 900, "scroll_height": 2000, "viewport_height": 1000 } },
//!     { "at_ms": 1516, "event": { "type": "animation_frame" } },
//!     { "at_ms": 90000, "action": { "type": "exit_offer", "email": "ana@example.com" } }
//!   ],
//!   "end_ms": 180000
//! }
//! ```

use crate::collector::{EnvironmentSnapshot, PageEvent};
use crate::optimizer::Presenter;
use crate::runtime::PageRuntime;
use crate::tracker::EventData;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Product cards on the page when a script does not say.
pub const DEFAULT_PRODUCT_CARDS: usize = 6;

/// Latest offset a script may use: one day after page load.
pub const MAX_OFFSET_MS: u64 = 24 * 60 * 60 * 1000;

fn default_product_cards() -> usize {
    DEFAULT_PRODUCT_CARDS
}

/// Something the visitor does that is not a raw page event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptAction {
    VipUpgrade,
    ExitOffer {
        email: String,
    },
    PageView {
        #[serde(default)]
        page: Option<String>,
    },
    Purchase {
        product_id: String,
        value: f64,
        #[serde(default)]
        category: Option<String>,
    },
    Custom {
        name: String,
        #[serde(default)]
        data: EventData,
    },
    Flush,
}

/// Payload of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptInput {
    Event(PageEvent),
    Action(ScriptAction),
}

/// One timed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptStep {
    /// Offset from page load
    pub at_ms: u64,
    #[serde(flatten)]
    pub input: ScriptInput,
}

/// A replayable page visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub environment: Option<EnvironmentSnapshot>,
    #[serde(default = "default_product_cards")]
    pub product_cards: usize,
    #[serde(default)]
    pub steps: Vec<ScriptStep>,
    /// Keep the page open until this offset, if later than the last step
    #[serde(default)]
    pub end_ms: Option<u64>,
}

/// Script loading errors.
#[derive(Debug)]
pub enum ScriptError {
    IoError(std::io::Error),
    ParseError(serde_json::Error),
    OffsetTooLarge(u64),
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptError::IoError(e) => write!(f, "IO error: {e}"),
            ScriptError::ParseError(e) => write!(f, "Parse error: {e}"),
            ScriptError::OffsetTooLarge(ms) => {
                write!(f, "Offset {ms}ms is past the {MAX_OFFSET_MS}ms limit")
            }
        }
    }
}

impl std::error::Error for ScriptError {}

impl From<std::io::Error> for ScriptError {
    fn from(e: std::io::Error) -> Self {
        ScriptError::IoError(e)
    }
}

impl From<serde_json::Error> for ScriptError {
    fn from(e: serde_json::Error) -> Self {
        ScriptError::ParseError(e)
    }
}

impl Script {
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(json: &str) -> Result<Self, ScriptError> {
        let script: Self = serde_json::from_str(json)?;
        script.validate()?;
        Ok(script)
    }

    /// Reject offsets past [`MAX_OFFSET_MS`].
    pub fn validate(&self) -> Result<(), ScriptError> {
        let mut offsets = self.steps.iter().map(|s| s.at_ms).chain(self.end_ms);
        match offsets.find(|ms| *ms > MAX_OFFSET_MS) {
            Some(ms) => Err(ScriptError::OffsetTooLarge(ms)),
            None => Ok(()),
        }
    }

    /// Steps in time order; steps sharing an offset keep their listed order.
    pub fn ordered_steps(&self) -> Vec<&ScriptStep> {
        let mut steps: Vec<&ScriptStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.at_ms);
        steps
    }

    /// Offset at which the visit ends.
    pub fn duration(&self) -> Duration {
        let last_step = self.steps.iter().map(|s| s.at_ms).max().unwrap_or(0);
        Duration::from_millis(self.end_ms.unwrap_or(0).max(last_step))
    }

    /// Replay on a simulated runtime. `on_step` runs after each step is applied.
    ///
    /// Time is advanced with [`PageRuntime::advance`], so every timer due
    /// between steps fires at its own trigger time.
    pub fn play<P, F>(&self, runtime: &mut PageRuntime<P>, mut on_step: F)
    where
        P: Presenter,
        F: FnMut(&ScriptStep, &PageRuntime<P>),
    {
        let mut elapsed = 0u64;
        for step in self.ordered_steps() {
            if step.at_ms > elapsed {
                runtime.advance(Duration::from_millis(step.at_ms - elapsed));
                elapsed = step.at_ms;
            }
            apply(runtime, &step.input);
            on_step(step, &*runtime);
        }

        let end = self.duration().as_millis() as u64;
        if end > elapsed {
            runtime.advance(Duration::from_millis(end - elapsed));
        }
    }
}

/// Apply one step to a runtime and handle it immediately.
pub fn apply<P: Presenter>(runtime: &mut PageRuntime<P>, input: &ScriptInput) {
    debug!(?input, "script step");
    match input {
        ScriptInput::Event(event) => {
            runtime.dispatch(event.clone());
            runtime.run_pending();
        }
        ScriptInput::Action(action) => match action {
            ScriptAction::VipUpgrade => runtime.vip_upgrade(),
            ScriptAction::ExitOffer { email } => runtime.exit_offer(email),
            ScriptAction::PageView { page } => {
                runtime.tracker().lock().track_page_view(page.as_deref());
            }
            ScriptAction::Purchase {
                product_id,
                value,
                category,
            } => {
                runtime
                    .tracker()
                    .lock()
                    .track_purchase(product_id, *value, category.as_deref());
            }
            ScriptAction::Custom { name, data } => {
                runtime.tracker().lock().track_custom_event(name, data.clone());
            }
            ScriptAction::Flush => {
                runtime.flush();
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::optimizer::PagePresenter;
    use crate::runtime::RuntimeParts;
    use chrono::{DateTime, Utc};

    const SCRIPT: &str = r#"{
        "environment": { "url": "https://club.example/offers", "screen_width": 1920, "screen_height": 1080 },
        "product_cards": 4,
        "steps": [
            { "at_ms": 2000, "event": { "type": "click", "target": { "tag": "a", "href": "https://partner.example/w" },
              "tracked": { "tag": "a", "tracking_id": "affiliate_click", "category": "watches", "value": "80" } } },
            { "at_ms": 1000, "event": { "type": "scroll", "scroll_top": 600, "scroll_height": 2000, "viewport_height": 1000 } },
            { "at_ms": 1016, "event": { "type": "animation_frame" } },
            { "at_ms": 4000, "action": { "type": "exit_offer", "email": "ana@example.com" } },
            { "at_ms": 4500, "action": { "type": "purchase", "product_id": "elite", "value": 390 } }
        ],
        "end_ms": 3000
    }"#;

    fn runtime(script: &Script) -> PageRuntime<PagePresenter> {
        let mut parts = RuntimeParts::new(Config::default(), PagePresenter::new(script.product_cards));
        if let Some(environment) = &script.environment {
            parts.environment = environment.clone();
        }
        PageRuntime::simulated(parts, DateTime::<Utc>::from_timestamp_millis(0).unwrap())
    }

    #[test]
    fn test_parse_and_order() {
        let script = Script::parse(SCRIPT).unwrap();
        assert_eq!(script.product_cards, 4);
        let offsets: Vec<u64> = script.ordered_steps().iter().map(|s| s.at_ms).collect();
        assert_eq!(offsets, vec![1000, 1016, 2000, 4000, 4500]);
        assert_eq!(script.duration(), Duration::from_millis(4500));
        assert!(matches!(
            script.steps[3].input,
            ScriptInput::Action(ScriptAction::ExitOffer { .. })
        ));
    }

    #[test]
    fn test_defaults() {
        let script = Script::parse("{}").unwrap();
        assert_eq!(script.product_cards, DEFAULT_PRODUCT_CARDS);
        assert!(script.steps.is_empty());
        assert_eq!(script.duration(), Duration::ZERO);
    }

    #[test]
    fn test_rejects_unknown_event() {
        let err = Script::parse(r#"{"steps":[{"at_ms":1,"event":{"type":"teleport"}}]}"#);
        assert!(matches!(err, Err(ScriptError::ParseError(_))));
    }

    #[test]
    fn test_rejects_offsets_past_one_day() {
        let err = Script::parse(r#"{"end_ms": 9000000000000000}"#);
        assert!(matches!(err, Err(ScriptError::OffsetTooLarge(9_000_000_000_000_000))));

        let err = Script::parse(r#"{"steps":[{"at_ms":86400001,"action":{"type":"flush"}}]}"#);
        assert!(matches!(err, Err(ScriptError::OffsetTooLarge(86_400_001))));

        let script = Script::parse(r#"{"end_ms": 86400000}"#).unwrap();
        assert_eq!(script.duration(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_play_to_the_end_of_time_saturates() {
        let mut config = Config::default();
        config.tracker.flush_interval = Duration::from_secs(10_000_000_000_000);
        config.optimizer.behavior_tick = Duration::from_secs(10_000_000_000_000);
        config.optimizer.social_proof_interval = Duration::from_secs(10_000_000_000_000);
        let parts = RuntimeParts::new(config, PagePresenter::new(DEFAULT_PRODUCT_CARDS));
        let mut runtime = PageRuntime::simulated(parts, DateTime::<Utc>::from_timestamp_millis(0).unwrap());

        // Built in code, so the offset limit is not applied.
        let script = Script {
            environment: None,
            product_cards: DEFAULT_PRODUCT_CARDS,
            steps: Vec::new(),
            end_ms: Some(u64::MAX),
        };
        script.play(&mut runtime, |_, _| {});

        assert_eq!(runtime.now(), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_play() {
        let script = Script::parse(SCRIPT).unwrap();
        let mut runtime = runtime(&script);
        let mut seen = Vec::new();
        script.play(&mut runtime, |step, rt| seen.push((step.at_ms, rt.now().timestamp_millis())));

        assert_eq!(seen.len(), 5);
        assert_eq!(seen[2], (2000, 2000));
        assert_eq!(runtime.now().timestamp_millis(), 4500);

        let tracker = runtime.tracker().lock();
        let names: Vec<&str> = tracker
            .buffered_events()
            .iter()
            .map(|e| e.event.as_str())
            .collect();
        for expected in ["page_view", "scroll_depth", "affiliate_click", "external_link_click", "lead", "purchase"] {
            assert!(names.contains(&expected), "missing {expected}");
        }
        assert_eq!(tracker.revenue().affiliate_clicks, 1);
        assert_eq!(tracker.revenue().conversion_score, 25);
        assert_eq!(tracker.profile().interests, vec!["watches"]);
    }
}
