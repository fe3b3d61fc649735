//! Event collection module for the page engagement agent.
//!
//! The page host pushes [`PageEvent`]s into a bounded channel; the runtime
//! drains them on its own schedule. Hosts on other threads (a WebView bridge,
//! a replay harness) get a cloned [`Sender`].

pub mod types;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Re-export commonly used types
pub use types::{
    ClickEvent, ClickTarget, ElementRect, EnvironmentSnapshot, FieldFocus, FormField,
    FormSubmission, PageEvent, ScrollPosition, TrackedElement,
};

/// Default channel capacity.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Errors that can occur during event collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorError {
    AlreadyRunning,
    NotRunning,
    /// The channel is full; the event was dropped
    Full,
    Disconnected,
}

impl std::fmt::Display for CollectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorError::AlreadyRunning => write!(f, "Collector is already running"),
            CollectorError::NotRunning => write!(f, "Collector is not running"),
            CollectorError::Full => write!(f, "Event channel is full"),
            CollectorError::Disconnected => write!(f, "Event channel is disconnected"),
        }
    }
}

impl std::error::Error for CollectorError {}

/// Channel-backed page event collector.
pub struct PageEventCollector {
    sender: Sender<PageEvent>,
    receiver: Receiver<PageEvent>,
    running: Arc<AtomicBool>,
}

impl Default for PageEventCollector {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PageEventCollector {
    /// Create a stopped collector with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self {
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start accepting events.
    pub fn start(&mut self) -> Result<(), CollectorError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CollectorError::AlreadyRunning);
        }
        Ok(())
    }

    /// Stop accepting events. Already queued events stay drainable.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Raw sender for hosts that manage their own start/stop.
    pub fn sender(&self) -> Sender<PageEvent> {
        self.sender.clone()
    }

    /// Push an event without blocking.
    pub fn push(&self, event: PageEvent) -> Result<(), CollectorError> {
        if !self.is_running() {
            return Err(CollectorError::NotRunning);
        }
        self.sender.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => CollectorError::Full,
            TrySendError::Disconnected(_) => CollectorError::Disconnected,
        })
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&self) -> Option<PageEvent> {
        self.receiver.try_recv().ok()
    }

    /// Take every queued event in arrival order.
    pub fn drain(&self) -> Vec<PageEvent> {
        self.receiver.try_iter().collect()
    }

    pub fn queued(&self) -> usize {
        self.receiver.len()
    }
}
