//! Statistics generation from the persisted tables
//!
//! This module provides functionality for extracting and displaying
//! crawl progress from the storage layer.

use crate::state::Stage;
use crate::storage::{ConnectionTable, GroupMemberships, LogTable, ProfileTable, Storage, StorageResult};
use std::collections::BTreeSet;

/// Crawl statistics summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlStatistics {
    /// Number of logged members
    pub members: usize,

    /// Members known to have closed accounts
    pub closed: usize,

    /// Members known to have open accounts
    pub open: usize,

    /// Members whose visibility is not known yet
    pub unknown: usize,

    /// Members with parsed profile data
    pub profiles_done: usize,

    /// Members with a parsed friend list
    pub connections_done: usize,

    /// Members with a parsed group list
    pub groups_done: usize,

    /// Open members still waiting for their friend list
    pub connections_pending: usize,

    /// Open members still waiting for their group list
    pub groups_pending: usize,

    /// Rows in the profile table
    pub profile_rows: usize,

    /// Edges in the connection table
    pub connections: usize,

    /// Entries in the group membership map
    pub group_entries: usize,

    /// Ids referenced by a table but missing from the log
    pub orphan_ids: Vec<u64>,
}

impl CrawlStatistics {
    /// Computes statistics from loaded tables
    pub fn from_tables(
        log: &LogTable,
        profiles: &ProfileTable,
        connections: &ConnectionTable,
        groups: &GroupMemberships,
    ) -> Self {
        let entries = log.entries();
        let closed = entries.iter().filter(|e| e.is_closed == Some(true)).count();
        let open = entries.iter().filter(|e| e.is_closed == Some(false)).count();

        let mut orphans = BTreeSet::new();
        orphans.extend(
            profiles
                .rows()
                .iter()
                .map(|row| row.user_id)
                .filter(|id| !log.contains(*id)),
        );
        for edge in connections.edges() {
            orphans.extend([edge.user_a, edge.user_b].into_iter().filter(|id| !log.contains(*id)));
        }
        orphans.extend(groups.user_ids().filter(|id| !log.contains(*id)));

        Self {
            members: log.len(),
            closed,
            open,
            unknown: log.len() - closed - open,
            profiles_done: log.count_done(Stage::Profiles),
            connections_done: log.count_done(Stage::Connections),
            groups_done: log.count_done(Stage::Groups),
            connections_pending: log.pending(Stage::Connections).len(),
            groups_pending: log.pending(Stage::Groups).len(),
            profile_rows: profiles.len(),
            connections: connections.len(),
            group_entries: groups.len(),
            orphan_ids: orphans.into_iter().collect(),
        }
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to read
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - A table could not be read
pub fn load_statistics(storage: &impl Storage) -> StorageResult<CrawlStatistics> {
    let log = storage.load_log()?;
    let profiles = storage.load_profiles()?;
    let connections = storage.load_connections()?;
    let groups = storage.load_group_memberships()?;

    Ok(CrawlStatistics::from_tables(
        &log,
        &profiles,
        &connections,
        &groups,
    ))
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Members:");
    println!("  Logged: {}", stats.members);
    println!(
        "  Open: {}  Closed: {}  Unknown: {}",
        stats.open, stats.closed, stats.unknown
    );
    println!();

    println!("Stages:");
    println!(
        "  Profiles:    {} done ({:.1}%)",
        stats.profiles_done,
        percentage(stats.profiles_done, stats.members)
    );
    println!(
        "  Connections: {} done, {} pending",
        stats.connections_done, stats.connections_pending
    );
    println!(
        "  Groups:      {} done, {} pending",
        stats.groups_done, stats.groups_pending
    );
    println!();

    println!("Tables:");
    println!("  Profile rows: {}", stats.profile_rows);
    println!("  Friend connections: {}", stats.connections);
    println!("  Group entries: {}", stats.group_entries);

    if !stats.orphan_ids.is_empty() {
        println!();
        println!(
            "Warning: {} ids appear in the tables but not in the log",
            stats.orphan_ids.len()
        );
        for id in stats.orphan_ids.iter().take(10) {
            println!("  - {}", id);
        }
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}
