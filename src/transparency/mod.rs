//! Transparency module for the page engagement agent.
//!
//! This module tracks what the agent records and what happens to it, so
//! silent data loss on a failed forward shows up in the numbers.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog,
    TransparencyStats,
};
