//! Crawl log entries tracking per-member stage progress
//!
//! Every discovered member gets exactly one entry. Stage flags only ever move
//! from `Pending` to `Done`, so a stopped crawl resumes without re-fetching
//! finished work.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Completion flag of one stage for one member
///
/// Persisted as an empty field while pending and `true` once done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StageFlag {
    #[default]
    Pending,
    Done,
}

impl StageFlag {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl Serialize for StageFlag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Pending => serializer.serialize_none(),
            Self::Done => serializer.serialize_some(&true),
        }
    }
}

impl<'de> Deserialize<'de> for StageFlag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<bool>::deserialize(deserializer)? {
            Some(true) => Self::Done,
            _ => Self::Pending,
        })
    }
}

/// The per-member stages that carry a completion flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Profile attributes (`data_parsed`)
    Profiles,

    /// Friend connections (`friends_parsed`)
    Connections,

    /// Group memberships (`groups_parsed`)
    Groups,
}

impl Stage {
    /// Returns true if the stage only applies to open accounts
    pub fn requires_open_account(&self) -> bool {
        matches!(self, Self::Connections | Self::Groups)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Profiles => "profiles",
            Self::Connections => "connections",
            Self::Groups => "groups",
        };
        write!(f, "{}", name)
    }
}

/// One row of the crawl log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Member id, stable once assigned
    pub user_id: u64,

    /// Whether the account is private; unknown until its profile is fetched
    pub is_closed: Option<bool>,

    pub data_parsed: StageFlag,
    pub friends_parsed: StageFlag,
    pub groups_parsed: StageFlag,
}

impl LogEntry {
    /// Creates an entry for a freshly enumerated member with every stage pending
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id,
            is_closed: None,
            data_parsed: StageFlag::Pending,
            friends_parsed: StageFlag::Pending,
            groups_parsed: StageFlag::Pending,
        }
    }

    /// Returns the flag of the given stage
    pub fn flag(&self, stage: Stage) -> StageFlag {
        match stage {
            Stage::Profiles => self.data_parsed,
            Stage::Connections => self.friends_parsed,
            Stage::Groups => self.groups_parsed,
        }
    }

    /// Marks the stage as done. Marking an already finished stage is a no-op.
    pub fn mark_done(&mut self, stage: Stage) {
        match stage {
            Stage::Profiles => self.data_parsed = StageFlag::Done,
            Stage::Connections => self.friends_parsed = StageFlag::Done,
            Stage::Groups => self.groups_parsed = StageFlag::Done,
        }
    }

    /// Returns true if the member still has to go through the given stage
    ///
    /// Friends and groups are only attempted for accounts known to be open;
    /// closed accounts and accounts whose profile was never fetched are skipped.
    pub fn is_eligible(&self, stage: Stage) -> bool {
        if self.flag(stage).is_done() {
            return false;
        }

        if stage.requires_open_account() {
            return self.is_closed == Some(false);
        }

        true
    }
}
