//! Storage module for persisting crawl data
//!
//! This module handles everything the crawl keeps on disk:
//! - The crawl log with per-member stage flags
//! - Profile rows, friendship edges and group memberships
//! - The merge rules that keep those tables idempotent across runs
//! - Write-through persistence after every batch

mod files;
mod tables;
mod traits;

pub use files::{
    FileStorage, CONFIG_HASH_FILE, CONNECTIONS_FILE, GROUPS_FILE, LOG_FILE, PROFILES_FILE,
};
pub use tables::{Connection, ConnectionTable, GroupMemberships, LogTable, ProfileTable};
pub use traits::{Storage, StorageError, StorageResult};

