//! Page Engagement Agent - on-page behavior tracking and experience optimization.
//!
//! This library observes a visitor's interactions with a marketing page,
//! keeps an analytics trail with a derived profile and revenue estimate, and
//! drives score-gated page interventions.
//!
//! # Data Handling
//!
//! - **Local first**: State lives in local storage scopes; forwarding to a
//!   collector is optional and fire-and-forget
//! - **No form values**: Form submissions are reduced to field lengths
//! - **Transparency**: Recorded, forwarded and dropped events are counted
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Page Engagement Agent                     │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌──────────────┐   ┌─────────────┐        │
//! │  │  Collector  │──▶│   Tracker    │──▶│    Sink     │        │
//! │  │ (page evts) │   │ (profile/rev)│   │ (collector) │        │
//! │  └─────────────┘   └──────────────┘   └─────────────┘        │
//! │         │                 ▲  │                               │
//! │         ▼                 │  ▼                               │
//! │  ┌─────────────┐  mirror  │ ┌─────────────┐                  │
//! │  │  Optimizer  │──────────┘ │   Storage   │                  │
//! │  │  (score)    │            │  (scopes)   │                  │
//! │  └─────────────┘            └─────────────┘                  │
//! │         │                                                    │
//! │         ▼                                                    │
//! │  ┌─────────────┐                                             │
//! │  │  Presenter  │                                             │
//! │  └─────────────┘                                             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use page_engagement_agent::{
//!     collector::{PageEvent, ScrollPosition},
//!     optimizer::PagePresenter,
//!     runtime::{PageRuntime, RuntimeParts},
//!     Config,
//! };
//! use std::time::Duration;
//!
//! let parts = RuntimeParts::new(Config::default(), PagePresenter::new(6));
//! let mut runtime = PageRuntime::simulated(parts, chrono::Utc::now());
//!
//! runtime.dispatch(PageEvent::Scroll(ScrollPosition::new(900.0, 2000.0, 1000.0)));
//! runtime.advance(Duration::from_secs(60));
//!
//! let summary = runtime.shutdown();
//! println!("conversion probability: {}", summary.conversion_probability);
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod optimizer;
pub mod runtime;
pub mod script;
pub mod sink;
pub mod storage;
pub mod tracker;
pub mod transparency;

#[cfg(feature = "gateway")]
pub mod gateway;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use collector::{CollectorError, EnvironmentSnapshot, PageEvent, PageEventCollector};
pub use config::{Config, DeliveryMode, OptimizerConfig, TrackerConfig};
pub use optimizer::{ExperienceOptimizer, Intervention, InterventionKind, PagePresenter, Presenter};
pub use runtime::{PageRuntime, RuntimeParts};
pub use sink::{CollectorPayload, CollectorSink, MemorySink, NoopSink, SinkError};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageScopes};
pub use tracker::{
    AnalyticsSnapshot, AnalyticsSummary, EngagementLevel, EngagementTracker, EventRecorder,
    InteractionEvent, TrackerHandle,
};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

// Gateway re-exports (when enabled)
#[cfg(feature = "gateway")]
pub use gateway::{BlockingGatewayClient, GatewayClient, GatewayConfig, GatewayError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Data declaration that can be displayed to visitors and operators.
pub const DATA_DECLARATION: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║          PAGE ENGAGEMENT AGENT - DATA DECLARATION                ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This agent records how a visitor engages with this page.        ║
║                                                                  ║
║  ✓ WHAT WE RECORD:                                               ║
║    • Scroll depth milestones and time on page                    ║
║    • Clicks on tracked offers and outbound links                 ║
║    • Which form fields receive focus                             ║
║    • Page URL, referrer, browser and screen size                 ║
║    • An email address, only if you submit one                    ║
║                                                                  ║
║  ✗ WHAT WE NEVER RECORD:                                         ║
║    • What you type into forms (only field lengths)               ║
║    • Pointer positions outside tracked clicks                    ║
║    • Anything from other tabs or sites                           ║
║                                                                  ║
║  Identifiers are random and stored locally. Batches are sent     ║
║  to a collector only when one is configured.                     ║
║                                                                  ║
║  You can view collection statistics anytime with:                ║
║    page-engagement status                                        ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_declaration_contents() {
        assert!(DATA_DECLARATION.contains("DATA DECLARATION"));
        assert!(DATA_DECLARATION.contains("NEVER RECORD"));
        assert!(DATA_DECLARATION.contains("field lengths"));
    }
}
