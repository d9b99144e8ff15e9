//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{ConnectionTable, GroupMemberships, LogTable, ProfileTable};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Each table is loaded once when a crawl starts and saved as a whole after
/// every batch that changed it. When crawling, loading a table that does not
/// exist yet creates it empty, so the data directory always holds all four
/// tables once a crawl has started.
pub trait Storage {
    // ===== Crawl Log =====

    /// Loads the crawl log, creating it empty if absent
    fn load_log(&self) -> StorageResult<LogTable>;

    /// Persists the whole crawl log
    fn save_log(&self, log: &LogTable) -> StorageResult<()>;

    // ===== Profiles =====

    /// Loads the profile table, creating it empty if absent
    fn load_profiles(&self) -> StorageResult<ProfileTable>;

    /// Persists the whole profile table
    fn save_profiles(&self, profiles: &ProfileTable) -> StorageResult<()>;

    // ===== Friend Connections =====

    /// Loads the connection table, creating it empty if absent
    fn load_connections(&self) -> StorageResult<ConnectionTable>;

    /// Persists the whole connection table
    fn save_connections(&self, connections: &ConnectionTable) -> StorageResult<()>;

    // ===== Group Memberships =====

    /// Loads the group membership map, creating it empty if absent
    fn load_group_memberships(&self) -> StorageResult<GroupMemberships>;

    /// Persists the whole group membership map
    fn save_group_memberships(&self, groups: &GroupMemberships) -> StorageResult<()>;

    // ===== Crawl Metadata =====

    /// Loads the hash of the configuration the tables were last written with
    fn load_config_hash(&self) -> StorageResult<Option<String>>;

    /// Records the hash of the configuration the current crawl runs with
    fn save_config_hash(&self, hash: &str) -> StorageResult<()>;
}
