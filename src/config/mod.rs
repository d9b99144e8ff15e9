//! Configuration module
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use group_graph::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Data directory: {}", config.crawl.data_dir.display());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AlertSinkConfig, ApiConfig, Config, CrawlConfig, FileSinkConfig, LoggingConfig,
    DEFAULT_API_VERSION, DEFAULT_BASE_URL, DEFAULT_REQUEST_INTERVAL_MS,
};
pub use validation::MIN_REQUEST_INTERVAL_MS;

// Re-export parser functions
pub use parser::{config_hash, load_config, load_config_with_hash, parse_config};
