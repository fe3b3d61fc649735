//! Page runtime: one tracker and one optimizer on a shared clock.
//!
//! Page events go into a [`PageEventCollector`]; [`PageRuntime::run_pending`]
//! drains it, hands every event to the tracker and then to the optimizer, and
//! fires whatever timers are due. With a [`ManualClock`],
//! [`PageRuntime::advance`] steps time forward through every due timer in
//! order.

use crate::collector::{EnvironmentSnapshot, PageEvent, PageEventCollector};
use crate::config::Config;
use crate::core::{saturating_add, to_chrono, Clock, ManualClock, SharedClock, SystemClock};
use crate::optimizer::{ExperienceOptimizer, Presenter};
use crate::sink::{NoopSink, SharedSink};
use crate::storage::StorageScopes;
use crate::tracker::{AnalyticsSummary, EngagementTracker, FlushReport, TrackerHandle};
use crate::transparency::{create_shared_log, SharedTransparencyLog};
use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Everything a runtime is built from.
pub struct RuntimeParts<P> {
    pub config: Config,
    pub storage: StorageScopes,
    pub presenter: P,
    pub environment: EnvironmentSnapshot,
    pub sink: SharedSink,
    pub transparency: SharedTransparencyLog,
}

impl<P> RuntimeParts<P> {
    /// In-memory storage, no remote collector, a fresh transparency log.
    pub fn new(config: Config, presenter: P) -> Self {
        Self {
            config,
            storage: StorageScopes::in_memory(),
            presenter,
            environment: EnvironmentSnapshot::default(),
            sink: Arc::new(NoopSink),
            transparency: create_shared_log(),
        }
    }
}

#[derive(Clone)]
enum RuntimeClock {
    Manual(Arc<ManualClock>),
    System,
}

/// A running page session.
pub struct PageRuntime<P: Presenter> {
    clock: RuntimeClock,
    shared_clock: SharedClock,
    collector: PageEventCollector,
    tracker: TrackerHandle,
    optimizer: ExperienceOptimizer<P>,
    transparency: SharedTransparencyLog,
    shut_down: bool,
}

impl<P: Presenter> PageRuntime<P> {
    /// Start a session on a manual clock beginning at `start`.
    pub fn simulated(parts: RuntimeParts<P>, start: DateTime<Utc>) -> Self {
        let manual = Arc::new(ManualClock::new(start));
        Self::start(parts, RuntimeClock::Manual(manual.clone()), manual)
    }

    /// Start a session on the wall clock.
    pub fn live(parts: RuntimeParts<P>) -> Self {
        Self::start(parts, RuntimeClock::System, Arc::new(SystemClock))
    }

    fn start(parts: RuntimeParts<P>, clock: RuntimeClock, shared_clock: SharedClock) -> Self {
        let RuntimeParts {
            config,
            storage,
            presenter,
            environment,
            sink,
            transparency,
        } = parts;

        let mut collector = PageEventCollector::new(config.tracker.event_channel_capacity);
        if let Err(e) = collector.start() {
            warn!(error = %e, "event collector did not start");
        }

        let mut tracker = EngagementTracker::new(
            config.tracker.clone(),
            shared_clock.clone(),
            storage.clone(),
        )
        .with_sink(sink)
        .with_transparency(transparency.clone())
        .with_environment(environment);
        tracker.track_page_view(None);
        let tracker = TrackerHandle::new(tracker);

        let optimizer = ExperienceOptimizer::new(
            config.optimizer.clone(),
            shared_clock.clone(),
            presenter,
            storage.persistent.clone(),
        )
        .with_recorder(Arc::new(tracker.clone()))
        .with_transparency(transparency.clone());

        info!(session_id = %tracker.lock().session_id(), "page runtime started");

        Self {
            clock,
            shared_clock,
            collector,
            tracker,
            optimizer,
            transparency,
            shut_down: false,
        }
    }

    /// Sender hosts can feed page events into from any thread.
    pub fn sender(&self) -> Sender<PageEvent> {
        self.collector.sender()
    }

    /// Queue one page event. Dropped with a warning when the queue refuses it.
    pub fn dispatch(&self, event: PageEvent) {
        if let Err(e) = self.collector.push(event) {
            warn!(error = %e, "page event dropped");
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.shared_clock.now()
    }

    pub fn tracker(&self) -> &TrackerHandle {
        &self.tracker
    }

    pub fn optimizer(&self) -> &ExperienceOptimizer<P> {
        &self.optimizer
    }

    pub fn optimizer_mut(&mut self) -> &mut ExperienceOptimizer<P> {
        &mut self.optimizer
    }

    pub fn transparency(&self) -> &SharedTransparencyLog {
        &self.transparency
    }

    /// Handle queued events, then fire timers due now.
    pub fn run_pending(&mut self) {
        self.process_events();
        self.fire_timers();
    }

    /// Earliest pending timer across both components.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        [self.tracker.lock().next_due(), self.optimizer.next_due()]
            .into_iter()
            .flatten()
            .min()
    }

    /// Move a manual clock forward by `by`, firing every timer on the way
    /// at its own trigger time. On the wall clock this only runs what is
    /// pending.
    pub fn advance(&mut self, by: Duration) {
        self.process_events();

        let RuntimeClock::Manual(manual) = self.clock.clone() else {
            self.fire_timers();
            return;
        };

        let target = saturating_add(manual.now(), to_chrono(by));
        while let Some(due) = self.next_due().filter(|due| *due <= target) {
            manual.set(due);
            self.fire_timers();
        }
        manual.set(target);
        self.fire_timers();
    }

    fn process_events(&mut self) {
        for event in self.collector.drain() {
            self.tracker.lock().handle_event(&event);
            self.optimizer.handle_event(&event);
        }
    }

    fn fire_timers(&mut self) {
        self.tracker.lock().run_due();
        self.optimizer.run_due();
    }

    /// Visitor accepted the VIP offer.
    pub fn vip_upgrade(&mut self) {
        self.process_events();
        self.optimizer.handle_vip_upgrade();
    }

    /// Visitor submitted the exit-intent form.
    pub fn exit_offer(&mut self, email: &str) {
        self.process_events();
        self.optimizer.handle_exit_offer(email);
    }

    pub fn flush(&mut self) -> FlushReport {
        self.tracker.lock().flush()
    }

    pub fn summary(&self) -> AnalyticsSummary {
        self.tracker.lock().summary()
    }

    /// Unload the page: flush the tracker, tear down optimizer timers and
    /// stop accepting events. Only the first call has an effect.
    pub fn shutdown(&mut self) -> AnalyticsSummary {
        if !self.shut_down {
            self.shut_down = true;
            self.process_events();
            self.tracker.lock().handle_event(&PageEvent::Unload);
            self.optimizer.handle_event(&PageEvent::Unload);
            self.optimizer.destroy();
            self.collector.stop();
            info!("page runtime stopped");
        }
        self.summary()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::ScrollPosition;
    use crate::optimizer::PagePresenter;
    use crate::sink::MemorySink;
    use crate::storage::{keys, load_json};
    use crate::tracker::AnalyticsSnapshot;

    fn start() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    fn runtime() -> (PageRuntime<PagePresenter>, Arc<MemorySink>, StorageScopes) {
        let sink = Arc::new(MemorySink::new());
        let mut parts = RuntimeParts::new(Config::default(), PagePresenter::new(6));
        parts.sink = sink.clone();
        let storage = parts.storage.clone();
        (PageRuntime::simulated(parts, start()), sink, storage)
    }

    fn names(runtime: &PageRuntime<PagePresenter>) -> Vec<String> {
        runtime
            .tracker()
            .lock()
            .buffered_events()
            .iter()
            .map(|e| e.event.clone())
            .collect()
    }

    #[test]
    fn test_initial_page_view() {
        let (runtime, _, _) = runtime();
        assert_eq!(names(&runtime), vec!["page_view"]);
        assert_eq!(runtime.tracker().lock().profile().page_views, 2);
    }

    #[test]
    fn test_events_reach_both_components() {
        let (mut runtime, _, _) = runtime();
        runtime.dispatch(PageEvent::Scroll(ScrollPosition::new(1000.0, 2000.0, 1000.0)));
        runtime.dispatch(PageEvent::AnimationFrame);
        runtime.run_pending();

        assert_eq!(runtime.optimizer().score(), 25.0);
        let recorded = names(&runtime);
        assert_eq!(recorded.iter().filter(|n| *n == "scroll_depth").count(), 4);
        assert!(recorded.contains(&"user_score_update".to_string()));
    }

    #[test]
    fn test_advance_fires_timers_in_order() {
        let (mut runtime, sink, storage) = runtime();
        runtime.advance(Duration::from_secs(30));

        assert_eq!(runtime.now(), start() + chrono::Duration::seconds(30));
        // Tracker timers run before optimizer timers due at the same instant,
        // so the 30s auto-save carries the 30s milestone but only 29 ticks.
        let payloads = sink.payloads();
        assert_eq!(payloads.len(), 1);
        let events = &payloads[0].events;
        assert_eq!(events.iter().filter(|e| e.event == "time_on_site").count(), 1);
        assert_eq!(
            events.iter().filter(|e| e.event == "user_score_update").count(),
            29
        );
        assert_eq!(names(&runtime), vec!["user_score_update"]);

        let stored: AnalyticsSnapshot = load_json(storage.persistent.as_ref(), keys::ANALYTICS)
            .unwrap()
            .unwrap();
        assert_eq!(stored.session_id, runtime.tracker().lock().session_id());
    }

    #[test]
    fn test_shutdown_flushes_once() {
        let (mut runtime, sink, _) = runtime();
        runtime.dispatch(PageEvent::PointerLeave { client_y: -1.0 });
        let summary = runtime.shutdown();

        assert!(runtime.optimizer().exit_intent_shown());
        assert_eq!(summary.session.events, 0);
        assert_eq!(sink.payloads().len(), 1);

        runtime.shutdown();
        assert_eq!(sink.payloads().len(), 1);
    }

    #[test]
    fn test_advance_past_the_calendar_saturates() {
        let huge = Duration::from_secs(10_000_000_000_000);
        let mut config = Config::default();
        config.tracker.flush_interval = huge;
        config.optimizer.behavior_tick = huge;
        config.optimizer.social_proof_interval = huge;

        let sink = Arc::new(MemorySink::new());
        let mut parts = RuntimeParts::new(config, PagePresenter::new(6));
        parts.sink = sink.clone();
        let mut runtime = PageRuntime::simulated(parts, start());

        runtime.advance(Duration::from_secs(u64::MAX));

        assert_eq!(runtime.now(), DateTime::<Utc>::MAX_UTC);
        assert_eq!(runtime.next_due(), None);
        // The auto-save due at the end of time still runs once.
        assert_eq!(sink.attempts(), 1);

        runtime.advance(Duration::from_secs(1));
        assert_eq!(runtime.now(), DateTime::<Utc>::MAX_UTC);
    }
}
