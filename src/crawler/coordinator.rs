//! Crawler coordinator - the resumable four-stage pipeline
//!
//! This module drives the crawl:
//! - Loading the persisted tables (creating empty ones on the first run)
//! - Enumerating group members once per crawl
//! - Fetching profiles, friend connections and group memberships in batches
//! - Merging every batch into the tables and persisting right away
//! - Halting a stage gracefully when the API quota is spent

use crate::api::{ApiClient, SocialApi, VkFetcher};
use crate::config::{Config, CrawlConfig};
use crate::crawler::batch::{batch_size, plan_batches, Batch};
use crate::state::Stage;
use crate::storage::{
    ConnectionTable, FileStorage, GroupMemberships, LogTable, ProfileTable, Storage,
};
use crate::Result;
use std::fmt;

/// How a stage ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Nothing to do: no eligible ids, or members were already enumerated
    Skipped,

    /// Every eligible id was processed
    Completed { batches: usize, ids: usize },

    /// The API quota ran out; later batches were left for the next run
    Halted {
        completed_batches: usize,
        remaining_ids: usize,
    },
}

impl StageOutcome {
    pub fn is_halted(&self) -> bool {
        matches!(self, Self::Halted { .. })
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => write!(f, "skipped"),
            Self::Completed { batches, ids } => {
                write!(f, "completed ({} ids in {} batches)", ids, batches)
            }
            Self::Halted {
                completed_batches,
                remaining_ids,
            } => write!(
                f,
                "halted on quota after {} batches ({} ids left)",
                completed_batches, remaining_ids
            ),
        }
    }
}

/// Outcome of every stage of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlSummary {
    pub enumeration: StageOutcome,
    pub profiles: StageOutcome,
    pub connections: StageOutcome,
    pub groups: StageOutcome,
}

impl CrawlSummary {
    /// Returns true if any stage stopped on quota exhaustion
    pub fn any_halted(&self) -> bool {
        [self.profiles, self.connections, self.groups]
            .iter()
            .any(StageOutcome::is_halted)
    }
}

/// Main crawler coordinator structure
///
/// Holds the four tables in memory for the duration of a run. Every batch
/// mutates them and writes the touched tables back through `storage` before
/// the next batch starts.
pub struct Coordinator<A, S> {
    group_id: u64,
    api: A,
    storage: S,
    log: LogTable,
    profiles: ProfileTable,
    connections: ConnectionTable,
    groups: GroupMemberships,
}

impl<A: SocialApi, S: Storage> Coordinator<A, S> {
    /// Creates a coordinator and loads the persisted state
    ///
    /// # Arguments
    ///
    /// * `config` - Crawl target settings
    /// * `api` - Entity fetchers used for every remote call
    /// * `storage` - Backend holding the tables
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Tables loaded (or created empty)
    /// * `Err(CrawlError)` - A table could not be read or created
    pub fn new(config: &CrawlConfig, api: A, storage: S) -> Result<Self> {
        let log = storage.load_log()?;
        let profiles = storage.load_profiles()?;
        let connections = storage.load_connections()?;
        let groups = storage.load_group_memberships()?;

        tracing::info!(
            "Loaded state: {} members, {} profiles, {} connections, {} group lists",
            log.len(),
            profiles.len(),
            connections.len(),
            groups.len()
        );

        Ok(Self {
            group_id: config.group_id,
            api,
            storage,
            log,
            profiles,
            connections,
            groups,
        })
    }

    pub fn log(&self) -> &LogTable {
        &self.log
    }

    pub fn profiles(&self) -> &ProfileTable {
        &self.profiles
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    pub fn group_memberships(&self) -> &GroupMemberships {
        &self.groups
    }

    /// Runs all four stages in order
    ///
    /// A quota halt only ends its own stage; the following stages are still
    /// attempted. Hard API or storage errors abort the run.
    pub async fn run(&mut self) -> Result<CrawlSummary> {
        let enumeration = self.enumerate_members().await?;
        let profiles = self.fetch_profiles().await?;
        let connections = self.fetch_connections().await?;
        let groups = self.fetch_groups().await?;

        Ok(CrawlSummary {
            enumeration,
            profiles,
            connections,
            groups,
        })
    }

    /// Lists the group members and creates their log entries
    ///
    /// Runs at most once per crawl: a non-empty log means enumeration already
    /// happened and the call is a no-op.
    pub async fn enumerate_members(&mut self) -> Result<StageOutcome> {
        if !self.log.is_empty() {
            tracing::debug!(
                "Member log already holds {} entries, skipping enumeration",
                self.log.len()
            );
            return Ok(StageOutcome::Skipped);
        }

        tracing::info!("Enumerating members of group {}", self.group_id);
        let member_ids = self.api.enumerate_group_member_ids(self.group_id).await?;

        let added = self.log.insert_members(member_ids);
        self.storage.save_log(&self.log)?;

        tracing::info!("Logged {} members", added);
        Ok(StageOutcome::Completed {
            batches: 1,
            ids: added,
        })
    }

    /// Fetches profiles of members whose data has not been parsed yet
    pub async fn fetch_profiles(&mut self) -> Result<StageOutcome> {
        let pending = self.log.pending(Stage::Profiles);
        if pending.is_empty() {
            tracing::debug!("No profiles pending");
            return Ok(StageOutcome::Skipped);
        }

        let batches = plan_batches(&pending, batch_size(Stage::Profiles));
        tracing::info!(
            "Fetching {} profiles in {} batches",
            pending.len(),
            batches.len()
        );

        for batch in &batches {
            self.process_profile_batch(batch).await?;
        }

        Ok(StageOutcome::Completed {
            batches: batches.len(),
            ids: pending.len(),
        })
    }

    async fn process_profile_batch(&mut self, batch: &Batch<'_>) -> Result<()> {
        tracing::debug!(
            "Profile batch {}/{} ({} ids)",
            batch.index + 1,
            batch.total,
            batch.ids.len()
        );

        let fetched = self.api.fetch_profiles(batch.ids).await?;

        for profile in fetched {
            if !self.log.contains(profile.user_id) {
                tracing::warn!(
                    "Ignoring profile of user {} who is not a logged member",
                    profile.user_id
                );
                continue;
            }
            self.log.set_closed(profile.user_id, profile.is_closed);
            self.profiles.upsert(profile);
        }
        self.log.mark_done(batch.ids, Stage::Profiles);

        self.storage.save_profiles(&self.profiles)?;
        self.storage.save_log(&self.log)?;
        Ok(())
    }

    /// Resolves friend lists of open accounts and records member-to-member edges
    ///
    /// Stops at the first batch in which every friend-list call failed.
    pub async fn fetch_connections(&mut self) -> Result<StageOutcome> {
        let pending = self.log.pending(Stage::Connections);
        if pending.is_empty() {
            tracing::debug!("No friend lists pending");
            return Ok(StageOutcome::Skipped);
        }

        let members = self.log.member_ids();
        let batches = plan_batches(&pending, batch_size(Stage::Connections));
        tracing::info!(
            "Fetching friend lists of {} members in {} batches",
            pending.len(),
            batches.len()
        );

        for batch in &batches {
            tracing::debug!(
                "Friends batch {}/{} ({} ids)",
                batch.index + 1,
                batch.total,
                batch.ids.len()
            );

            let result = self.api.resolve_friend_lists(batch.ids).await?;
            if result.is_exhausted() {
                return Ok(self.halt(Stage::Connections, batch, pending.len()));
            }

            let mut new_edges = 0;
            for (user_id, friends) in result.entries() {
                if let Some(friends) = friends {
                    self.profiles
                        .set_friends_count(*user_id, friends.len() as u64);
                    new_edges += self
                        .connections
                        .extend_from_friends(*user_id, friends, &members);
                }
            }
            self.log.mark_done(batch.ids, Stage::Connections);

            tracing::debug!(
                "Recorded {} new connections ({} failed lookups)",
                new_edges,
                result.failures()
            );

            self.storage.save_profiles(&self.profiles)?;
            self.storage.save_connections(&self.connections)?;
            self.storage.save_log(&self.log)?;
        }

        Ok(StageOutcome::Completed {
            batches: batches.len(),
            ids: pending.len(),
        })
    }

    /// Resolves group memberships of open accounts
    ///
    /// Stops at the first batch in which every group-list call failed.
    pub async fn fetch_groups(&mut self) -> Result<StageOutcome> {
        let pending = self.log.pending(Stage::Groups);
        if pending.is_empty() {
            tracing::debug!("No group lists pending");
            return Ok(StageOutcome::Skipped);
        }

        let batches = plan_batches(&pending, batch_size(Stage::Groups));
        tracing::info!(
            "Fetching group lists of {} members in {} batches",
            pending.len(),
            batches.len()
        );

        for batch in &batches {
            tracing::debug!(
                "Groups batch {}/{} ({} ids)",
                batch.index + 1,
                batch.total,
                batch.ids.len()
            );

            let result = self.api.resolve_group_memberships(batch.ids).await?;
            if result.is_exhausted() {
                return Ok(self.halt(Stage::Groups, batch, pending.len()));
            }

            let failures = result.failures();
            for (user_id, group_ids) in result.into_entries() {
                if let Some(group_ids) = group_ids {
                    self.groups.upsert(user_id, group_ids);
                }
            }
            self.storage.save_group_memberships(&self.groups)?;

            self.log.mark_done(batch.ids, Stage::Groups);
            self.storage.save_log(&self.log)?;

            tracing::debug!("Stored group lists ({} failed lookups)", failures);
        }

        Ok(StageOutcome::Completed {
            batches: batches.len(),
            ids: pending.len(),
        })
    }

    fn halt(&self, stage: Stage, batch: &Batch<'_>, pending: usize) -> StageOutcome {
        let remaining_ids = batch.remaining_ids(pending);
        tracing::warn!(
            "API quota exhausted during {} batch {}/{}; {} ids left for the next run",
            stage,
            batch.index + 1,
            batch.total,
            remaining_ids
        );

        StageOutcome::Halted {
            completed_batches: batch.index,
            remaining_ids,
        }
    }
}

/// Records the hash of the configuration a crawl runs with
///
/// A data directory last written under a different configuration is still
/// resumed, with a warning: a changed group id against an existing log mixes
/// two groups in one crawl.
///
/// # Returns
///
/// * `Ok(true)` - A different hash was recorded before
/// * `Ok(false)` - First crawl of the directory, or same configuration
pub fn record_config_hash(storage: &impl Storage, config_hash: &str) -> Result<bool> {
    let previous = storage.load_config_hash()?;
    let changed = previous.as_deref().is_some_and(|previous| previous != config_hash);

    if changed {
        tracing::warn!(
            "Configuration changed since the last crawl of this data directory (was {}, now {})",
            previous.as_deref().unwrap_or_default(),
            config_hash
        );
    }
    if previous.as_deref() != Some(config_hash) {
        storage.save_config_hash(config_hash)?;
    }

    Ok(changed)
}

/// Runs a complete crawl against the configured API and data directory
///
/// # Example
///
/// ```no_run
/// use group_graph::config::load_config_with_hash;
/// use group_graph::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("config.toml"))?;
/// let summary = run_crawl(&config, &hash).await?;
/// println!("connections: {}", summary.connections);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: &Config, config_hash: &str) -> Result<CrawlSummary> {
    let client = ApiClient::new(&config.api)?;
    let storage = FileStorage::open(&config.crawl.data_dir)?;
    record_config_hash(&storage, config_hash)?;

    let mut coordinator = Coordinator::new(&config.crawl, VkFetcher::new(client), storage)?;
    coordinator.run().await
}
