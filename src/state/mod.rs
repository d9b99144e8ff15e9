//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `LogEntry`: one row per discovered member with its account visibility
//!   and the completion flag of each per-member stage
//! - `Stage`: the flagged stages (profiles, connections, groups)
//! - `StageFlag`: pending/done marker persisted in the crawl log

mod log_entry;

// Re-export main types
pub use log_entry::{LogEntry, Stage, StageFlag};
