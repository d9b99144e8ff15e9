//! In-memory tables and their merge rules
//!
//! - `LogTable`: one entry per member, insertion ordered; stage flags only
//!   ever move to done
//! - `ProfileTable`: at most one row per member; re-fetched rows replace the
//!   old row in place
//! - `ConnectionTable`: append-only directed edges, each pair stored once
//! - `GroupMemberships`: member id to group ids, replaced wholesale per member

use crate::profile::UserProfile;
use crate::state::{LogEntry, Stage};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Crawl log keyed by member id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogTable {
    entries: Vec<LogEntry>,
    index: HashMap<u64, usize>,
}

impl LogTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from persisted rows; a repeated id keeps its first row
    pub fn from_entries(entries: impl IntoIterator<Item = LogEntry>) -> Self {
        let mut table = Self::new();
        for entry in entries {
            if !table.index.contains_key(&entry.user_id) {
                table.index.insert(entry.user_id, table.entries.len());
                table.entries.push(entry);
            }
        }
        table
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, user_id: u64) -> bool {
        self.index.contains_key(&user_id)
    }

    pub fn get(&self, user_id: u64) -> Option<&LogEntry> {
        self.index.get(&user_id).map(|&i| &self.entries[i])
    }

    fn get_mut(&mut self, user_id: u64) -> Option<&mut LogEntry> {
        self.index.get(&user_id).map(|&i| &mut self.entries[i])
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Adds a pending entry for every id not yet logged
    ///
    /// Returns the number of entries added.
    pub fn insert_members(&mut self, user_ids: impl IntoIterator<Item = u64>) -> usize {
        let before = self.entries.len();
        for user_id in user_ids {
            if !self.index.contains_key(&user_id) {
                self.index.insert(user_id, self.entries.len());
                self.entries.push(LogEntry::new(user_id));
            }
        }
        self.entries.len() - before
    }

    /// Ids still eligible for a stage, in log order
    pub fn pending(&self, stage: Stage) -> Vec<u64> {
        self.entries
            .iter()
            .filter(|entry| entry.is_eligible(stage))
            .map(|entry| entry.user_id)
            .collect()
    }

    /// Marks a stage done for each id; unknown ids are ignored
    pub fn mark_done(&mut self, user_ids: &[u64], stage: Stage) {
        for &user_id in user_ids {
            if let Some(entry) = self.get_mut(user_id) {
                entry.mark_done(stage);
            }
        }
    }

    /// Records whether an account is closed
    pub fn set_closed(&mut self, user_id: u64, is_closed: Option<bool>) {
        if let Some(entry) = self.get_mut(user_id) {
            entry.is_closed = is_closed;
        }
    }

    /// Set of all logged member ids
    pub fn member_ids(&self) -> HashSet<u64> {
        self.index.keys().copied().collect()
    }

    /// Number of members whose stage is done
    pub fn count_done(&self, stage: Stage) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.flag(stage).is_done())
            .count()
    }
}

/// Profile rows keyed by member id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileTable {
    rows: Vec<UserProfile>,
    index: HashMap<u64, usize>,
}

impl ProfileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from persisted rows; a repeated id keeps its last row
    pub fn from_rows(rows: impl IntoIterator<Item = UserProfile>) -> Self {
        let mut table = Self::new();
        for row in rows {
            table.upsert(row);
        }
        table
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, user_id: u64) -> Option<&UserProfile> {
        self.index.get(&user_id).map(|&i| &self.rows[i])
    }

    pub fn rows(&self) -> &[UserProfile] {
        &self.rows
    }

    /// Inserts a new row or replaces the existing row of the same member
    pub fn upsert(&mut self, profile: UserProfile) {
        match self.index.get(&profile.user_id) {
            Some(&i) => self.rows[i] = profile,
            None => {
                self.index.insert(profile.user_id, self.rows.len());
                self.rows.push(profile);
            }
        }
    }

    /// Patches the friend count of an existing row
    ///
    /// Returns false if the member has no profile row.
    pub fn set_friends_count(&mut self, user_id: u64, friends_count: u64) -> bool {
        match self.index.get(&user_id) {
            Some(&i) => {
                self.rows[i].friends_count = Some(friends_count);
                true
            }
            None => false,
        }
    }
}

/// A directed friendship edge between two members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub user_a: u64,
    pub user_b: u64,
}

/// Append-only set of friendship edges, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionTable {
    edges: Vec<Connection>,
    seen: HashSet<Connection>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from persisted rows, dropping repeated edges
    pub fn from_edges(edges: impl IntoIterator<Item = Connection>) -> Self {
        let mut table = Self::new();
        for edge in edges {
            table.insert(edge);
        }
        table
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edges(&self) -> &[Connection] {
        &self.edges
    }

    pub fn contains(&self, user_a: u64, user_b: u64) -> bool {
        self.seen.contains(&Connection { user_a, user_b })
    }

    /// Appends an edge unless it is already stored
    pub fn insert(&mut self, edge: Connection) -> bool {
        if self.seen.insert(edge) {
            self.edges.push(edge);
            true
        } else {
            false
        }
    }

    /// Records the edges from `user_a` to every friend that is a known member
    ///
    /// Friends outside `members` are discarded. Returns the number of new
    /// edges.
    pub fn extend_from_friends(
        &mut self,
        user_a: u64,
        friends: &[u64],
        members: &HashSet<u64>,
    ) -> usize {
        friends
            .iter()
            .filter(|&&friend| members.contains(&friend))
            .filter(|&&user_b| self.insert(Connection { user_a, user_b }))
            .count()
    }
}

/// Group ids per member; an entry is replaced wholesale on every fetch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupMemberships {
    groups: BTreeMap<u64, Vec<u64>>,
}

impl GroupMemberships {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, user_id: u64) -> Option<&[u64]> {
        self.groups.get(&user_id).map(Vec::as_slice)
    }

    /// Inserts or replaces the group list of a member
    pub fn upsert(&mut self, user_id: u64, group_ids: Vec<u64>) {
        self.groups.insert(user_id, group_ids);
    }

    pub fn user_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.groups.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_members_skips_known_ids() {
        let mut log = LogTable::new();
        assert_eq!(log.insert_members([3, 1, 2, 1]), 3);
        assert_eq!(log.insert_members([2, 4]), 1);

        let ids: Vec<u64> = log.entries().iter().map(|e| e.user_id).collect();
        assert_eq!(ids, vec![3, 1, 2, 4]);
    }

    #[test]
    fn test_pending_respects_flags_and_visibility() {
        let mut log = LogTable::new();
        log.insert_members([1, 2, 3]);
        assert_eq!(log.pending(Stage::Profiles), vec![1, 2, 3]);
        assert!(log.pending(Stage::Connections).is_empty());

        log.mark_done(&[1, 2, 3], Stage::Profiles);
        log.set_closed(1, Some(false));
        log.set_closed(2, Some(true));
        log.set_closed(3, None);

        assert!(log.pending(Stage::Profiles).is_empty());
        assert_eq!(log.pending(Stage::Connections), vec![1]);
        assert_eq!(log.pending(Stage::Groups), vec![1]);
        assert_eq!(log.count_done(Stage::Profiles), 3);
    }

    #[test]
    fn test_mark_done_ignores_unknown_ids() {
        let mut log = LogTable::new();
        log.insert_members([1]);
        log.mark_done(&[1, 99], Stage::Groups);
        assert_eq!(log.len(), 1);
        assert!(log.get(1).unwrap().groups_parsed.is_done());
    }

    #[test]
    fn test_profile_upsert_replaces_in_place() {
        let mut profiles = ProfileTable::new();
        profiles.upsert(UserProfile::empty(1));
        profiles.upsert(UserProfile::empty(2));

        let mut refreshed = UserProfile::empty(1);
        refreshed.sex = Some(2);
        profiles.upsert(refreshed);

        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles.rows()[0].sex, Some(2));
        assert!(profiles.set_friends_count(2, 10));
        assert!(!profiles.set_friends_count(3, 10));
        assert_eq!(profiles.get(2).unwrap().friends_count, Some(10));
    }

    #[test]
    fn test_connections_restricted_to_members_and_deduplicated() {
        let members: HashSet<u64> = [1, 2, 3].into_iter().collect();
        let mut connections = ConnectionTable::new();

        assert_eq!(connections.extend_from_friends(1, &[2, 3, 99, 2], &members), 2);
        assert_eq!(connections.extend_from_friends(1, &[2, 3], &members), 0);
        assert_eq!(connections.len(), 2);
        assert!(connections.contains(1, 2));
        assert!(!connections.contains(1, 99));
    }

    #[test]
    fn test_group_memberships_replace_wholesale() {
        let mut groups = GroupMemberships::new();
        groups.upsert(1, vec![10, 11]);
        groups.upsert(1, vec![]);
        assert_eq!(groups.get(1), Some(&[][..]));
        assert_eq!(groups.len(), 1);
    }
}
