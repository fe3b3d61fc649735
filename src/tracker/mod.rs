//! Engagement tracker.
//!
//! Owns visitor identity, an append-only buffer of interaction events, the
//! derived [`UserProfile`] and [`RevenueMetrics`], and the flush cycle that
//! persists a snapshot and forwards buffered events to a [`CollectorSink`].
//!
//! The tracker reacts to [`PageEvent`]s from the page host and to its own
//! scheduled tasks (time milestones and auto-save). It never fails: storage
//! and sink problems are logged and swallowed.

pub mod identity;
pub mod profile;
pub mod revenue;
pub mod types;

use crate::collector::types::{
    ClickEvent, EnvironmentSnapshot, FieldFocus, FormSubmission, PageEvent, ScrollPosition,
};
use crate::config::{DeliveryMode, TrackerConfig};
use crate::core::{elapsed_ms, Scheduler, SharedClock};
use crate::sink::{CollectorPayload, NoopSink, SharedSink};
use crate::storage::{keys, store_json, StorageScopes};
use crate::transparency::{create_shared_log, SharedTransparencyLog};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

pub use identity::Identity;
pub use revenue::conversion_probability;
pub use types::{
    event_data, AnalyticsSnapshot, AnalyticsSummary, EngagementLevel, EventData,
    InteractionEvent, PriceRange, RevenueMetrics, SessionSummary, UserProfile,
};

/// Anything that accepts named interaction events.
///
/// The optimizer mirrors its own activity through this interface instead of
/// reaching for a global.
pub trait EventRecorder: Send + Sync {
    fn record(&self, name: &str, data: EventData);
}

/// Outcome of one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Whether the snapshot reached persistent storage
    pub persisted: bool,
    /// Events accepted by the sink
    pub forwarded: usize,
    /// Events cleared after the sink failed
    pub dropped: usize,
    /// Events kept for the next flush after the sink failed
    pub retained: usize,
}

#[derive(Debug, Clone, PartialEq)]
enum TrackerTask {
    TimeMilestone(Duration),
    AutoSave,
}

/// Scroll milestones and animation-frame throttling.
#[derive(Debug, Default)]
struct ScrollState {
    max_percent: u32,
    reported: BTreeSet<u32>,
    latest: Option<ScrollPosition>,
    ticking: bool,
}

/// The engagement tracker for one page session.
pub struct EngagementTracker {
    config: TrackerConfig,
    clock: SharedClock,
    storage: StorageScopes,
    sink: SharedSink,
    transparency: SharedTransparencyLog,
    environment: EnvironmentSnapshot,
    identity: Identity,
    start_time: DateTime<Utc>,
    events: Vec<InteractionEvent>,
    revenue: RevenueMetrics,
    profile: UserProfile,
    scroll: ScrollState,
    visible: bool,
    scheduler: Scheduler<TrackerTask>,
}

impl EngagementTracker {
    /// Create a tracker, resolve identity and arm its timers.
    pub fn new(config: TrackerConfig, clock: SharedClock, storage: StorageScopes) -> Self {
        let now = clock.now();
        let identity = identity::resolve(storage.session.as_ref(), storage.persistent.as_ref(), now);

        let mut scheduler = Scheduler::new();
        for milestone in config.time_milestones() {
            scheduler.schedule_once(now, milestone, TrackerTask::TimeMilestone(milestone));
        }
        scheduler.schedule_repeating(now, config.flush_interval, TrackerTask::AutoSave);

        info!(
            session_id = %identity.session_id,
            user_id = %identity.user_id,
            "engagement tracker initialized"
        );

        Self {
            config,
            clock,
            storage,
            sink: Arc::new(NoopSink),
            transparency: create_shared_log(),
            environment: EnvironmentSnapshot::default(),
            identity,
            start_time: now,
            events: Vec::new(),
            revenue: RevenueMetrics::default(),
            profile: UserProfile::default(),
            scroll: ScrollState::default(),
            visible: true,
            scheduler,
        }
    }

    /// Attach the remote collector.
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    /// Attach a transparency log.
    pub fn with_transparency(mut self, log: SharedTransparencyLog) -> Self {
        self.transparency = log;
        self
    }

    /// Set the environment stamped onto events.
    pub fn with_environment(mut self, environment: EnvironmentSnapshot) -> Self {
        self.environment = environment;
        self
    }

    /// Replace the environment, e.g. after a client-side navigation.
    pub fn set_environment(&mut self, environment: EnvironmentSnapshot) {
        self.environment = environment;
    }

    pub fn session_id(&self) -> &str {
        &self.identity.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn revenue(&self) -> &RevenueMetrics {
        &self.revenue
    }

    /// Events buffered since the last forward.
    pub fn buffered_events(&self) -> &[InteractionEvent] {
        &self.events
    }

    /// Record an interaction event and update profile and revenue.
    pub fn record(&mut self, name: &str, data: EventData) -> InteractionEvent {
        let now = self.clock.now();

        let mut stamped = data.clone();
        stamped.insert("url".into(), Value::from(self.environment.url.clone()));
        stamped.insert("referrer".into(), Value::from(self.environment.referrer.clone()));
        stamped.insert("userAgent".into(), Value::from(self.environment.user_agent.clone()));
        stamped.insert(
            "screenResolution".into(),
            Value::from(self.environment.screen_resolution()),
        );
        stamped.insert("viewportSize".into(), Value::from(self.environment.viewport_size()));

        let event = InteractionEvent {
            event: name.to_string(),
            timestamp: now,
            session_id: self.identity.session_id.clone(),
            user_id: self.identity.user_id.clone(),
            data: stamped,
        };
        self.events.push(event.clone());

        let duration = elapsed_ms(self.start_time, now);
        let hot_after = self.config.hot_after.as_millis() as u64;
        profile::update_profile(&mut self.profile, name, &data, duration, hot_after);
        revenue::update_revenue(&mut self.revenue, name, &data);
        self.transparency.record_event();

        debug!(
            event = name,
            engagement = %self.profile.engagement_level,
            conversion_score = self.revenue.conversion_score,
            "event recorded"
        );
        event
    }

    /// Page-view notifier.
    pub fn track_page_view(&mut self, page: Option<&str>) -> InteractionEvent {
        let page = page
            .map(str::to_string)
            .unwrap_or_else(|| self.environment.path());
        self.profile.page_views += 1;
        let page_views = self.profile.page_views;
        self.record(
            "page_view",
            event_data(json!({ "page": page, "pageViews": page_views })),
        )
    }

    /// Purchase notifier.
    pub fn track_purchase(
        &mut self,
        product_id: &str,
        value: f64,
        category: Option<&str>,
    ) -> InteractionEvent {
        self.record(
            "purchase",
            event_data(json!({
                "productId": product_id,
                "value": value,
                "category": category,
                "conversionType": "direct",
            })),
        )
    }

    /// Record an arbitrary named event.
    pub fn track_custom_event(&mut self, name: &str, data: EventData) -> InteractionEvent {
        self.record(name, data)
    }

    /// React to a page event.
    pub fn handle_event(&mut self, event: &PageEvent) {
        match event {
            PageEvent::Scroll(position) => {
                self.scroll.latest = Some(*position);
                self.scroll.ticking = true;
            }
            PageEvent::AnimationFrame => {
                if self.scroll.ticking {
                    self.evaluate_scroll();
                    self.scroll.ticking = false;
                }
            }
            PageEvent::Click(click) => self.on_click(click),
            PageEvent::Focus(focus) => self.on_focus(focus),
            PageEvent::Submit(form) => self.on_submit(form),
            PageEvent::VisibilityChange { hidden } => {
                self.visible = !hidden;
                let duration = elapsed_ms(self.start_time, self.clock.now());
                self.record(
                    "visibility_change",
                    event_data(json!({ "hidden": hidden, "duration": duration })),
                );
            }
            PageEvent::PointerLeave { .. } => {}
            PageEvent::Unload => {
                self.flush();
            }
        }
    }

    fn evaluate_scroll(&mut self) {
        let Some(percent) = self.scroll.latest.and_then(|p| p.percent()) else {
            return;
        };
        if percent <= self.scroll.max_percent {
            return;
        }
        self.scroll.max_percent = percent;
        self.profile.scroll_depth = percent;

        let mut crossed: Vec<u32> = self
            .config
            .scroll_milestones
            .iter()
            .copied()
            .filter(|m| *m <= percent && !self.scroll.reported.contains(m))
            .collect();
        crossed.sort_unstable();
        crossed.dedup();

        for milestone in crossed {
            self.scroll.reported.insert(milestone);
            self.record(
                "scroll_depth",
                event_data(json!({ "percentage": milestone })),
            );
        }
    }

    fn on_click(&mut self, click: &ClickEvent) {
        if let Some(tracked) = &click.tracked {
            let data = event_data(json!({
                "elementType": tracked.tag,
                "trackingId": tracked.tracking_id,
                "elementId": tracked.element_id,
                "category": tracked.category,
                "estimatedValue": tracked.estimated_value(),
                "position": { "x": click.client_x, "y": click.client_y },
                "elementPosition": tracked.rect,
            }));
            self.record(&tracked.tracking_id, data);
        }

        if click.target.is_external_link() {
            let text = click.target.text.as_deref().unwrap_or("").trim().to_string();
            self.record(
                "external_link_click",
                event_data(json!({ "url": click.target.href, "text": text })),
            );
        }
    }

    fn on_focus(&mut self, focus: &FieldFocus) {
        if !focus.is_form_control() {
            return;
        }
        let field_name = focus.name.clone().or_else(|| focus.id.clone());
        self.record(
            "form_field_focus",
            event_data(json!({
                "fieldName": field_name,
                "fieldType": focus.field_type,
                "formId": focus.form_id,
            })),
        );
    }

    fn on_submit(&mut self, form: &FormSubmission) {
        // Lengths only; submitted values never reach the event log.
        let fields: serde_json::Map<String, Value> = form
            .fields
            .iter()
            .map(|f| (f.name.clone(), Value::from(f.value.encode_utf16().count())))
            .collect();
        self.record(
            "form_submit",
            event_data(json!({
                "formId": form.form_id,
                "fieldCount": fields.len(),
                "fields": fields,
            })),
        );
    }

    /// Earliest pending timer.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.scheduler.next_due()
    }

    /// Fire every timer due at the current clock time.
    pub fn run_due(&mut self) {
        let now = self.clock.now();
        while let Some(due) = self.scheduler.pop_due(now) {
            match due.task {
                TrackerTask::TimeMilestone(milestone) => {
                    if self.visible {
                        let level = self.profile.engagement_level;
                        self.record(
                            "time_on_site",
                            event_data(json!({
                                "duration": milestone.as_millis() as u64,
                                "engagementLevel": level,
                            })),
                        );
                    }
                }
                TrackerTask::AutoSave => {
                    self.flush();
                }
            }
        }
    }

    /// Current snapshot of the tracker state.
    pub fn snapshot(&self) -> AnalyticsSnapshot {
        AnalyticsSnapshot {
            events: self.events.clone(),
            revenue: self.revenue.clone(),
            user_profile: self.profile.clone(),
            session_id: self.identity.session_id.clone(),
            user_id: self.identity.user_id.clone(),
            last_update: self.clock.now(),
        }
    }

    /// Persist a snapshot, then forward buffered events.
    pub fn flush(&mut self) -> FlushReport {
        let persisted = self.save_snapshot();
        let mut report = self.forward();
        report.persisted = persisted;
        self.transparency.record_flush();
        report
    }

    /// Overwrite the stored snapshot. Returns false when storage refused it.
    pub fn save_snapshot(&self) -> bool {
        match store_json(self.storage.persistent.as_ref(), keys::ANALYTICS, &self.snapshot()) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "could not persist analytics snapshot");
                false
            }
        }
    }

    /// Hand buffered events to the sink.
    ///
    /// In [`DeliveryMode::AtMostOnce`] the buffer is cleared whatever the
    /// outcome; in [`DeliveryMode::Confirmed`] it is only cleared on success.
    pub fn forward(&mut self) -> FlushReport {
        if self.events.is_empty() {
            return FlushReport::default();
        }

        let payload = CollectorPayload {
            session_id: self.identity.session_id.clone(),
            user_id: self.identity.user_id.clone(),
            events: self.events.clone(),
            revenue: self.revenue.clone(),
            user_profile: self.profile.clone(),
        };
        let count = self.events.len();

        match self.sink.send(&payload) {
            Ok(()) => {
                info!(events = count, "analytics batch forwarded");
                self.transparency.record_forwarded(count as u64);
                self.events.clear();
                FlushReport {
                    forwarded: count,
                    ..FlushReport::default()
                }
            }
            Err(e) => match self.config.delivery {
                DeliveryMode::AtMostOnce => {
                    warn!(error = %e, events = count, "forward failed, batch dropped");
                    self.transparency.record_dropped(count as u64);
                    self.events.clear();
                    FlushReport {
                        dropped: count,
                        ..FlushReport::default()
                    }
                }
                DeliveryMode::Confirmed => {
                    warn!(error = %e, events = count, "forward failed, batch kept");
                    FlushReport {
                        retained: count,
                        ..FlushReport::default()
                    }
                }
            },
        }
    }

    /// Read-only summary with the derived conversion probability.
    pub fn summary(&self) -> AnalyticsSummary {
        AnalyticsSummary {
            session: SessionSummary {
                id: self.identity.session_id.clone(),
                duration: elapsed_ms(self.start_time, self.clock.now()),
                events: self.events.len(),
            },
            revenue: self.revenue.clone(),
            user_profile: self.profile.clone(),
            conversion_probability: self.conversion_probability(),
        }
    }

    pub fn conversion_probability(&self) -> f64 {
        revenue::conversion_probability(&self.profile, &self.revenue)
    }
}

/// Shared, lockable tracker handed to the runtime and the optimizer.
#[derive(Clone)]
pub struct TrackerHandle(Arc<Mutex<EngagementTracker>>);

impl TrackerHandle {
    pub fn new(tracker: EngagementTracker) -> Self {
        Self(Arc::new(Mutex::new(tracker)))
    }

    /// Lock the tracker. A poisoned lock is recovered; tracker state stays usable.
    pub fn lock(&self) -> MutexGuard<'_, EngagementTracker> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventRecorder for TrackerHandle {
    fn record(&self, name: &str, data: EventData) {
        self.lock().record(name, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::{ClickTarget, ElementRect, FormField, TrackedElement};
    use crate::core::ManualClock;
    use crate::core::clock::Clock;
    use crate::sink::MemorySink;
    use crate::storage::load_json;

    fn tracker_with(config: TrackerConfig) -> (EngagementTracker, Arc<ManualClock>, StorageScopes, Arc<MemorySink>) {
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
        ));
        let storage = StorageScopes::in_memory();
        let sink = Arc::new(MemorySink::new());
        let tracker = EngagementTracker::new(config, clock.clone(), storage.clone())
            .with_sink(sink.clone())
            .with_environment(EnvironmentSnapshot {
                url: "https://club.example/".to_string(),
                screen_width: 1920,
                screen_height: 1080,
                viewport_width: 1280,
                viewport_height: 720,
                ..Default::default()
            });
        (tracker, clock, storage, sink)
    }

    fn tracker() -> (EngagementTracker, Arc<ManualClock>, StorageScopes, Arc<MemorySink>) {
        tracker_with(TrackerConfig::default())
    }

    fn scroll_to(tracker: &mut EngagementTracker, percent: f64) {
        tracker.handle_event(&PageEvent::Scroll(ScrollPosition::new(percent * 10.0, 2000.0, 1000.0)));
        tracker.handle_event(&PageEvent::AnimationFrame);
    }

    fn names(tracker: &EngagementTracker) -> Vec<String> {
        tracker.buffered_events().iter().map(|e| e.event.clone()).collect()
    }

    #[test]
    fn test_record_stamps_environment() {
        let (mut tracker, _, _, _) = tracker();
        let event = tracker.record("cta_view", event_data(json!({"slot": "hero"})));

        assert_eq!(event.session_id, tracker.session_id());
        assert_eq!(event.data["slot"], json!("hero"));
        assert_eq!(event.data["url"], json!("https://club.example/"));
        assert_eq!(event.data["screenResolution"], json!("1920x1080"));
        assert_eq!(event.data["viewportSize"], json!("1280x720"));
        assert_eq!(tracker.buffered_events().len(), 1);
    }

    #[test]
    fn test_identity_is_persisted() {
        let (tracker, _, storage, _) = tracker();
        assert_eq!(
            storage.session.get(keys::SESSION_ID).unwrap().as_deref(),
            Some(tracker.session_id())
        );
        assert_eq!(
            storage.persistent.get(keys::USER_ID).unwrap().as_deref(),
            Some(tracker.user_id())
        );
    }

    #[test]
    fn test_affiliate_then_subscribe_scenario() {
        let (mut tracker, _, _, _) = tracker();
        tracker.record("affiliate_click", event_data(json!({"estimatedValue": 80})));
        assert_eq!(tracker.revenue().affiliate_clicks, 1);
        assert!(tracker.revenue().total_potential >= 80.0);
        assert_eq!(tracker.revenue().conversion_score, 15);

        tracker.record("subscribe", event_data(json!({"value": 39})));
        assert_eq!(tracker.revenue().subscriptions, 1);
        assert!(tracker.revenue().total_potential >= 119.0);
        assert_eq!(tracker.revenue().conversion_score, 100);
    }

    #[test]
    fn test_scroll_milestones_fire_once_per_frame() {
        let (mut tracker, _, _, _) = tracker();

        // Several scroll events before a frame evaluate once, at the latest position.
        tracker.handle_event(&PageEvent::Scroll(ScrollPosition::new(100.0, 2000.0, 1000.0)));
        tracker.handle_event(&PageEvent::Scroll(ScrollPosition::new(260.0, 2000.0, 1000.0)));
        assert!(tracker.buffered_events().is_empty());
        tracker.handle_event(&PageEvent::AnimationFrame);
        assert_eq!(names(&tracker), vec!["scroll_depth"]);
        assert_eq!(tracker.profile().scroll_depth, 26);

        // A jump crosses 50 and 75 together; scrolling back and down again adds nothing.
        scroll_to(&mut tracker, 80.0);
        scroll_to(&mut tracker, 10.0);
        scroll_to(&mut tracker, 80.0);
        let depths: Vec<Value> = tracker
            .buffered_events()
            .iter()
            .map(|e| e.data["percentage"].clone())
            .collect();
        assert_eq!(depths, vec![json!(25), json!(50), json!(75)]);
        assert_eq!(tracker.profile().engagement_level, EngagementLevel::Warm);
        assert_eq!(tracker.revenue().conversion_score, 0);

        scroll_to(&mut tracker, 95.0);
        assert_eq!(tracker.revenue().conversion_score, 5);
    }

    #[test]
    fn test_frame_without_scroll_is_ignored() {
        let (mut tracker, _, _, _) = tracker();
        tracker.handle_event(&PageEvent::AnimationFrame);
        assert!(tracker.buffered_events().is_empty());
    }

    #[test]
    fn test_time_milestones_respect_visibility() {
        let config = TrackerConfig {
            flush_interval: Duration::from_secs(600),
            ..TrackerConfig::default()
        };
        let (mut tracker, clock, _, _) = tracker_with(config);

        clock.advance(Duration::from_secs(30));
        tracker.run_due();
        assert_eq!(names(&tracker), vec!["time_on_site"]);
        assert_eq!(tracker.buffered_events()[0].data["duration"], json!(30_000));

        tracker.handle_event(&PageEvent::VisibilityChange { hidden: true });
        clock.advance(Duration::from_secs(30));
        tracker.run_due();
        assert_eq!(names(&tracker), vec!["time_on_site", "visibility_change"]);
    }

    #[test]
    fn test_auto_save_forwards_on_interval() {
        let (mut tracker, clock, _, sink) = tracker();
        tracker.record("page_view", EventData::new());

        clock.advance(Duration::from_secs(30));
        tracker.run_due();

        // The 30s milestone fires before the auto-save scheduled after it.
        assert_eq!(sink.delivered_events(), 2);
        assert!(tracker.buffered_events().is_empty());
        assert!(tracker.next_due().is_some());
    }

    #[test]
    fn test_click_tracking() {
        let (mut tracker, _, _, _) = tracker();
        tracker.handle_event(&PageEvent::Click(ClickEvent {
            target: ClickTarget {
                tag: "a".to_string(),
                href: Some("https://partner.example/rolex".to_string()),
                text: Some("  See offer ".to_string()),
            },
            tracked: Some(TrackedElement {
                tag: "a".to_string(),
                tracking_id: "affiliate_click".to_string(),
                element_id: Some("rolex-sub".to_string()),
                category: Some("watches".to_string()),
                value: Some("120".to_string()),
                rect: ElementRect::default(),
            }),
            client_x: 10.0,
            client_y: 20.0,
        }));

        assert_eq!(names(&tracker), vec!["affiliate_click", "external_link_click"]);
        let events = tracker.buffered_events();
        assert_eq!(events[0].data["estimatedValue"], json!(120.0));
        assert_eq!(events[1].data["text"], json!("See offer"));
        assert_eq!(tracker.profile().interests, vec!["watches"]);
        assert_eq!(tracker.profile().engagement_level, EngagementLevel::Hot);
        assert_eq!(tracker.revenue().total_potential, 120.0);
    }

    #[test]
    fn test_form_submit_keeps_lengths_only() {
        let (mut tracker, _, _, _) = tracker();
        tracker.handle_event(&PageEvent::Focus(FieldFocus {
            tag: "input".to_string(),
            name: None,
            id: Some("email".to_string()),
            field_type: Some("email".to_string()),
            form_id: Some("newsletter".to_string()),
        }));
        tracker.handle_event(&PageEvent::Submit(FormSubmission {
            form_id: Some("newsletter".to_string()),
            fields: vec![FormField {
                name: "email".to_string(),
                value: "ana@example.com".to_string(),
            }],
        }));

        let events = tracker.buffered_events();
        assert_eq!(events[0].data["fieldName"], json!("email"));
        assert_eq!(events[1].data["fieldCount"], json!(1));
        assert_eq!(events[1].data["fields"]["email"], json!(15));
        let serialized = serde_json::to_string(events).unwrap();
        assert!(!serialized.contains("ana@example.com"));
    }

    #[test]
    fn test_flush_twice_yields_empty_events() {
        let (mut tracker, _, storage, sink) = tracker();
        tracker.record("page_view", EventData::new());

        let first = tracker.flush();
        assert!(first.persisted);
        assert_eq!(first.forwarded, 1);
        let stored: AnalyticsSnapshot = load_json(storage.persistent.as_ref(), keys::ANALYTICS)
            .unwrap()
            .unwrap();
        assert_eq!(stored.events.len(), 1);

        let second = tracker.flush();
        assert_eq!(second.forwarded, 0);
        let stored: AnalyticsSnapshot = load_json(storage.persistent.as_ref(), keys::ANALYTICS)
            .unwrap()
            .unwrap();
        assert!(stored.events.is_empty());
        assert_eq!(sink.attempts(), 1);
    }

    #[test]
    fn test_failed_forward_drops_by_default() {
        let (mut tracker, _, _, sink) = tracker();
        sink.set_failing(true);
        tracker.record("page_view", EventData::new());

        let report = tracker.flush();
        assert_eq!(report.dropped, 1);
        assert!(tracker.buffered_events().is_empty());
        assert_eq!(sink.delivered_events(), 0);
    }

    #[test]
    fn test_confirmed_delivery_keeps_buffer() {
        let config = TrackerConfig {
            delivery: DeliveryMode::Confirmed,
            ..TrackerConfig::default()
        };
        let (mut tracker, _, _, sink) = tracker_with(config);
        sink.set_failing(true);
        tracker.record("page_view", EventData::new());

        assert_eq!(tracker.flush().retained, 1);
        assert_eq!(tracker.buffered_events().len(), 1);

        sink.set_failing(false);
        tracker.record("lead", EventData::new());
        assert_eq!(tracker.flush().forwarded, 2);
        assert_eq!(sink.delivered_events(), 2);
    }

    #[test]
    fn test_unload_flushes() {
        let (mut tracker, _, _, sink) = tracker();
        tracker.record("page_view", EventData::new());
        tracker.handle_event(&PageEvent::Unload);
        assert_eq!(sink.delivered_events(), 1);
    }

    #[test]
    fn test_page_view_and_summary() {
        let (mut tracker, clock, _, _) = tracker();
        tracker.track_page_view(None);
        assert_eq!(tracker.profile().page_views, 2);
        assert_eq!(tracker.buffered_events()[0].data["page"], json!("/"));

        clock.advance(Duration::from_secs(150));
        tracker.track_purchase("elite-annual", 390.0, Some("membership"));

        let summary = tracker.summary();
        assert_eq!(summary.session.duration, 150_000);
        assert_eq!(summary.session.events, 2);
        assert_eq!(summary.user_profile.engagement_level, EngagementLevel::Hot);
        assert_eq!(summary.conversion_probability, 40.0 + 2.0 * 2.5);
    }

    #[test]
    fn test_out_of_range_flush_interval_never_fires() {
        let config: crate::config::Config =
            serde_json::from_str(r#"{"tracker": {"flush_interval": 10000000000000}}"#).unwrap();
        let (mut tracker, clock, _, sink) = tracker_with(config.tracker);

        assert_eq!(
            tracker.next_due(),
            Some(clock.now() + chrono::Duration::seconds(30))
        );
        clock.advance(Duration::from_secs(600));
        tracker.run_due();

        let milestones = tracker
            .buffered_events()
            .iter()
            .filter(|e| e.event == "time_on_site")
            .count();
        assert_eq!(milestones, 4);
        assert_eq!(sink.attempts(), 0);
        assert_eq!(tracker.next_due(), Some(DateTime::<Utc>::MAX_UTC));
    }
}
