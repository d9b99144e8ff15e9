//! Output module for reporting crawl progress
//!
//! This module handles:
//! - Computing per-stage statistics from the persisted tables
//! - Printing them for the `--stats` mode

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};
