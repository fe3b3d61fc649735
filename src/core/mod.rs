//! Core timing primitives shared by the tracker and optimizer.
//!
//! This module contains:
//! - Clocks (wall-clock and manual) behind a common trait
//! - A small scheduler for one-shot and repeating tasks

pub mod clock;
pub mod scheduler;

// Re-export commonly used types
pub use clock::{elapsed_ms, saturating_add, to_chrono, Clock, ManualClock, SharedClock, SystemClock};
pub use scheduler::{DueTask, Scheduler, TaskId};
