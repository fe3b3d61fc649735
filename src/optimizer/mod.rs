//! Experience optimizer.
//!
//! Keeps its own engagement score, independent of the tracker's, and turns
//! score thresholds and timers into [`Intervention`]s handed to a
//! [`Presenter`]. Everything the optimizer does is mirrored into an optional
//! [`EventRecorder`] so it shows up in analytics.

pub mod intervention;
pub mod presenter;
pub mod score;

use crate::collector::types::{ClickEvent, FieldFocus, PageEvent, ScrollPosition};
use crate::config::OptimizerConfig;
use crate::core::{Scheduler, SharedClock, TaskId};
use crate::storage::{keys, load_json, store_json, SharedStorage, Storage, StorageError};
use crate::tracker::{event_data, EventRecorder};
use crate::transparency::{create_shared_log, SharedTransparencyLog};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use intervention::{
    social_proof_feed, Intervention, InterventionId, InterventionKind, SocialProofEntry,
    FLASH_DISCOUNT_PERCENT, LIVE_VIEWERS, VIP_DISCOUNT_PERCENT,
};
pub use presenter::{PagePresenter, Presenter, PresenterEvent};
pub use score::{ScoreAction, ScoreBand, MAX_SCORE};

/// Minimum score for the social proof rotation to show anything.
const SOCIAL_PROOF_MIN_SCORE: f64 = 30.0;
/// Minimum score, at the dynamic pricing check, for the flash discount.
const FLASH_DISCOUNT_MIN_SCORE: f64 = 60.0;
/// Minimum score for the personalized hero headline.
const HERO_MIN_SCORE: f64 = 50.0;
/// Minimum score for the recommendations sidebar.
const RECOMMENDATIONS_MIN_SCORE: f64 = 40.0;

const MEMBERSHIP_TIER: &str = "elite";
const EXIT_INTENT_SOURCE: &str = "exit_intent";

/// A captured lead, as stored under the leads key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub email: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub at: DateTime<Utc>,
    pub user_score: f64,
}

/// Read the stored lead list. A missing key is an empty list.
pub fn load_leads(storage: &dyn Storage) -> Result<Vec<LeadRecord>, StorageError> {
    Ok(load_json(storage, keys::LEADS)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptimizerTask {
    BehaviorTick,
    SocialProof,
    DynamicPricing,
    Personalize,
    Dismiss(InterventionId),
    CountdownTick(InterventionId),
    CloseExitOffer,
}

/// Running totals fed into the score.
#[derive(Debug, Default)]
struct BehaviorState {
    max_scroll: u32,
    time_on_page_ms: u64,
    clicks: u32,
}

#[derive(Debug)]
struct FlashCountdown {
    id: InterventionId,
    remaining_secs: u64,
    task: TaskId,
}

/// The experience optimizer for one page session.
pub struct ExperienceOptimizer<P: Presenter> {
    config: OptimizerConfig,
    clock: SharedClock,
    presenter: P,
    storage: SharedStorage,
    recorder: Option<Arc<dyn EventRecorder>>,
    transparency: SharedTransparencyLog,

    score: f64,
    vip_offer_shown: bool,
    exit_intent_shown: bool,
    hero_personalized: bool,
    behavior: BehaviorState,

    social_proof: Vec<SocialProofEntry>,
    social_proof_index: usize,
    social_proof_task: Option<TaskId>,

    vip_offer: Option<InterventionId>,
    exit_offer: Option<InterventionId>,
    visible_social_proof: Option<InterventionId>,
    flash: Option<FlashCountdown>,

    next_intervention: u64,
    scheduler: Scheduler<OptimizerTask>,
}

impl<P: Presenter> ExperienceOptimizer<P> {
    /// Create an optimizer and arm its timers.
    ///
    /// `storage` is the persistent scope, used by the conversion handlers.
    pub fn new(
        config: OptimizerConfig,
        clock: SharedClock,
        presenter: P,
        storage: SharedStorage,
    ) -> Self {
        let now = clock.now();
        let mut scheduler = Scheduler::new();
        scheduler.schedule_repeating(now, config.behavior_tick, OptimizerTask::BehaviorTick);
        let social_proof_task = scheduler.schedule_repeating(
            now,
            config.social_proof_interval,
            OptimizerTask::SocialProof,
        );
        scheduler.schedule_once(now, config.dynamic_pricing_delay, OptimizerTask::DynamicPricing);
        scheduler.schedule_once(now, config.personalization_delay, OptimizerTask::Personalize);

        info!("experience optimizer initialized");

        Self {
            config,
            clock,
            presenter,
            storage,
            recorder: None,
            transparency: create_shared_log(),
            score: 0.0,
            vip_offer_shown: false,
            exit_intent_shown: false,
            hero_personalized: false,
            behavior: BehaviorState::default(),
            social_proof: social_proof_feed(),
            social_proof_index: 0,
            social_proof_task: Some(social_proof_task),
            vip_offer: None,
            exit_offer: None,
            visible_social_proof: None,
            flash: None,
            next_intervention: 1,
            scheduler,
        }
    }

    /// Mirror optimizer activity into `recorder`.
    pub fn with_recorder(mut self, recorder: Arc<dyn EventRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn with_transparency(mut self, log: SharedTransparencyLog) -> Self {
        self.transparency = log;
        self
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn vip_offer_shown(&self) -> bool {
        self.vip_offer_shown
    }

    pub fn exit_intent_shown(&self) -> bool {
        self.exit_intent_shown
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    /// Add the points for one behavior signal, react to the new score and
    /// mirror the update.
    pub fn update_score(&mut self, action: ScoreAction, value: f64) {
        let points = action.points(value);
        self.score = score::accumulate(self.score, points);
        debug!(action = %action, value, points, score = self.score, "score updated");

        self.evaluate_thresholds();

        self.mirror(
            "user_score_update",
            json!({
                "action": action.as_str(),
                "value": value,
                "points": points,
                "totalScore": self.score,
            }),
        );
    }

    fn evaluate_thresholds(&mut self) {
        match ScoreBand::of(self.score) {
            ScoreBand::Vip => {
                if !self.vip_offer_shown {
                    self.show_vip_offer();
                }
            }
            ScoreBand::Enhance => self.enhance_experience(),
            ScoreBand::Encourage => {
                if !self.presenter.cta_pulsing() {
                    self.show(InterventionKind::CtaPulse, None);
                }
            }
            ScoreBand::Idle => {}
        }
    }

    fn show_vip_offer(&mut self) {
        self.vip_offer_shown = true;
        let id = self.show(
            InterventionKind::VipOffer {
                discount_percent: VIP_DISCOUNT_PERCENT,
            },
            Some(self.config.vip_offer_dismiss),
        );
        self.vip_offer = Some(id);
        self.mirror("vip_offer_shown", json!({ "userScore": self.score }));
    }

    fn enhance_experience(&mut self) {
        let limit = self.config.badge_limit.min(self.presenter.product_card_count());
        let cards: Vec<usize> = (0..limit)
            .filter(|i| !self.presenter.card_has_badge(*i))
            .collect();
        if !cards.is_empty() {
            self.show(InterventionKind::HotBadges { cards }, None);
        }
        self.show(
            InterventionKind::LiveActivity {
                viewers: LIVE_VIEWERS,
            },
            Some(self.config.live_activity_dismiss),
        );
    }

    /// React to a page event.
    pub fn handle_event(&mut self, event: &PageEvent) {
        match event {
            PageEvent::Scroll(position) => self.on_scroll(position),
            PageEvent::Click(click) => self.on_click(click),
            PageEvent::Focus(focus) => self.on_focus(focus),
            PageEvent::PointerLeave { client_y } => {
                if *client_y <= 0.0 && !self.exit_intent_shown {
                    self.show_exit_intent_offer();
                }
            }
            PageEvent::AnimationFrame
            | PageEvent::Submit(_)
            | PageEvent::VisibilityChange { .. }
            | PageEvent::Unload => {}
        }
    }

    fn on_scroll(&mut self, position: &ScrollPosition) {
        let Some(percent) = position.percent() else {
            return;
        };
        if percent > self.behavior.max_scroll {
            self.behavior.max_scroll = percent;
            self.update_score(ScoreAction::Scroll, f64::from(percent));
        }
    }

    fn on_click(&mut self, click: &ClickEvent) {
        self.behavior.clicks += 1;
        self.update_score(ScoreAction::Click, f64::from(self.behavior.clicks));

        match click.tracking_id() {
            Some("affiliate_click") => self.update_score(ScoreAction::AffiliateInterest, 20.0),
            Some("premium_interest") => self.update_score(ScoreAction::PremiumInterest, 25.0),
            _ => {}
        }
    }

    fn on_focus(&mut self, focus: &FieldFocus) {
        if focus.is_text_entry() {
            self.update_score(ScoreAction::FormEngagement, 15.0);
        }
    }

    fn show_exit_intent_offer(&mut self) {
        self.exit_intent_shown = true;
        let id = self.show(InterventionKind::ExitIntentOffer, None);
        self.exit_offer = Some(id);
        self.mirror("exit_intent_offer_shown", json!({ "userScore": self.score }));
    }

    /// Earliest pending timer.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.scheduler.next_due()
    }

    /// Fire every timer due at the current clock time, in trigger order.
    pub fn run_due(&mut self) {
        let now = self.clock.now();
        while let Some(due) = self.scheduler.pop_due(now) {
            match due.task {
                OptimizerTask::BehaviorTick => {
                    self.behavior.time_on_page_ms += self.config.behavior_tick.as_millis() as u64;
                    let elapsed = self.behavior.time_on_page_ms as f64;
                    self.update_score(ScoreAction::Time, elapsed);
                }
                OptimizerTask::SocialProof => self.rotate_social_proof(),
                OptimizerTask::DynamicPricing => {
                    if self.score >= FLASH_DISCOUNT_MIN_SCORE {
                        self.show_flash_discount();
                    }
                }
                OptimizerTask::Personalize => self.personalize(),
                OptimizerTask::Dismiss(id) => self.dismiss(id),
                OptimizerTask::CountdownTick(id) => self.tick_countdown(id),
                OptimizerTask::CloseExitOffer => {
                    if let Some(id) = self.exit_offer.take() {
                        self.presenter.dismiss(id);
                    }
                }
            }
        }
    }

    fn rotate_social_proof(&mut self) {
        if self.score < SOCIAL_PROOF_MIN_SCORE || self.social_proof.is_empty() {
            return;
        }
        if let Some(previous) = self.visible_social_proof.take() {
            self.presenter.dismiss(previous);
        }

        let entry = self.social_proof[self.social_proof_index].clone();
        self.social_proof_index = (self.social_proof_index + 1) % self.social_proof.len();

        let id = self.show(
            InterventionKind::SocialProof(entry.clone()),
            Some(self.config.social_proof_dismiss),
        );
        self.visible_social_proof = Some(id);
        self.mirror(
            "social_proof_shown",
            serde_json::to_value(&entry).unwrap_or(Value::Null),
        );
    }

    fn show_flash_discount(&mut self) {
        let remaining_secs = self.config.flash_discount_countdown.as_secs();
        let id = self.show(
            InterventionKind::FlashDiscount {
                discount_percent: FLASH_DISCOUNT_PERCENT,
                remaining_secs,
            },
            None,
        );
        let task = self.scheduler.schedule_repeating(
            self.clock.now(),
            Duration::from_secs(1),
            OptimizerTask::CountdownTick(id),
        );
        self.flash = Some(FlashCountdown {
            id,
            remaining_secs,
            task,
        });
        self.mirror("dynamic_discount_shown", json!({ "userScore": self.score }));
    }

    fn tick_countdown(&mut self, id: InterventionId) {
        let Some(flash) = self.flash.as_mut().filter(|f| f.id == id) else {
            return;
        };
        flash.remaining_secs = flash.remaining_secs.saturating_sub(1);

        if flash.remaining_secs == 0 {
            let task = flash.task;
            self.flash = None;
            self.scheduler.cancel(task);
            self.presenter.dismiss(id);
            debug!(id = %id, "flash discount expired");
        } else {
            let updated = Intervention {
                id,
                kind: InterventionKind::FlashDiscount {
                    discount_percent: FLASH_DISCOUNT_PERCENT,
                    remaining_secs: flash.remaining_secs,
                },
                auto_dismiss: None,
            };
            self.presenter.update(&updated);
        }
    }

    fn personalize(&mut self) {
        if self.score >= HERO_MIN_SCORE && !self.hero_personalized {
            self.hero_personalized = true;
            self.show(InterventionKind::PersonalizedHero, None);
        }
        if self.score >= RECOMMENDATIONS_MIN_SCORE {
            self.show(
                InterventionKind::Recommendations,
                Some(self.config.recommendations_dismiss),
            );
        }
    }

    /// Visitor accepted the VIP offer.
    pub fn handle_vip_upgrade(&mut self) {
        let discount = VIP_DISCOUNT_PERCENT.to_string();
        for (key, value) in [(keys::MEMBERSHIP, MEMBERSHIP_TIER), (keys::DISCOUNT, discount.as_str())] {
            if let Err(e) = self.storage.set(key, value) {
                warn!(key, error = %e, "could not store membership");
            }
        }

        self.mirror(
            "subscribe",
            json!({
                "plan": MEMBERSHIP_TIER,
                "discount": VIP_DISCOUNT_PERCENT,
                "source": "vip_offer",
                "userScore": self.score,
            }),
        );

        if let Some(id) = self.vip_offer.take() {
            self.presenter.dismiss(id);
        }
        self.show(
            InterventionKind::UpgradeConfirmation {
                discount_percent: VIP_DISCOUNT_PERCENT,
            },
            None,
        );
        info!(tier = MEMBERSHIP_TIER, "membership upgraded");
    }

    /// Visitor submitted the exit-intent form. The email is taken as given.
    pub fn handle_exit_offer(&mut self, email: &str) {
        let storage = self.storage.as_ref();
        let mut leads = match load_leads(storage) {
            Ok(leads) => leads,
            Err(e) => {
                warn!(error = %e, "stored leads unreadable, starting a new list");
                Vec::new()
            }
        };
        leads.push(LeadRecord {
            kind: EXIT_INTENT_SOURCE.to_string(),
            email: email.to_string(),
            at: self.clock.now(),
            user_score: self.score,
        });
        if let Err(e) = store_json(storage, keys::LEADS, &leads) {
            warn!(error = %e, "could not store lead");
        }
        self.transparency.record_lead();

        self.mirror(
            "lead",
            json!({
                "source": EXIT_INTENT_SOURCE,
                "email": email,
                "userScore": self.score,
            }),
        );

        self.show(
            InterventionKind::LeadCaptured,
            Some(self.config.exit_offer_close),
        );
        self.scheduler.schedule_once(
            self.clock.now(),
            self.config.exit_offer_close,
            OptimizerTask::CloseExitOffer,
        );
        info!(leads = leads.len(), "lead captured");
    }

    /// Cancel the social proof rotation and every pending one-shot timer.
    ///
    /// The behavior tick and a running flash countdown keep going.
    pub fn destroy(&mut self) {
        if let Some(task) = self.social_proof_task.take() {
            self.scheduler.cancel(task);
        }
        let cancelled = self.scheduler.cancel_one_shots();
        info!(cancelled, "experience optimizer destroyed");
    }

    fn show(&mut self, kind: InterventionKind, auto_dismiss: Option<Duration>) -> InterventionId {
        let id = InterventionId(self.next_intervention);
        self.next_intervention += 1;

        let intervention = Intervention {
            id,
            kind,
            auto_dismiss,
        };
        info!(id = %id, kind = intervention.kind.label(), score = self.score, "intervention shown");
        self.presenter.render(&intervention);
        self.transparency.record_intervention();

        if let Some(after) = auto_dismiss {
            self.scheduler
                .schedule_once(self.clock.now(), after, OptimizerTask::Dismiss(id));
        }
        id
    }

    fn dismiss(&mut self, id: InterventionId) {
        self.presenter.dismiss(id);
        if self.visible_social_proof == Some(id) {
            self.visible_social_proof = None;
        }
        if self.vip_offer == Some(id) {
            self.vip_offer = None;
        }
    }

    fn mirror(&self, name: &str, data: Value) {
        if let Some(recorder) = &self.recorder {
            recorder.record(name, event_data(data));
        }
    }
}
