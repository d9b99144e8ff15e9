//! Crawler module for the staged group crawl
//!
//! This module contains the core crawling logic, including:
//! - Splitting pending members into batches per stage
//! - Merging fetched batches into the persisted tables
//! - Halting a stage when the API quota is exhausted

pub mod batch;
mod coordinator;

pub use coordinator::{record_config_hash, run_crawl, Coordinator, CrawlSummary, StageOutcome};
