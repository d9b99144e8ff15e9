//! Entity fetcher interface consumed by the crawl coordinator

use crate::api::ApiResult;
use crate::profile::UserProfile;

/// Per-id results of a scripted batch fetch
///
/// Entries keep the order of the requested ids. `None` marks an id whose
/// sub-call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult<T> {
    entries: Vec<(u64, Option<T>)>,
}

impl<T> BatchResult<T> {
    pub fn new(entries: Vec<(u64, Option<T>)>) -> Self {
        Self { entries }
    }

    /// Returns true if every sub-call of a non-empty batch failed
    ///
    /// This is how the API signals that the daily quota of a method is spent.
    pub fn is_exhausted(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|(_, value)| value.is_none())
    }

    /// Number of ids whose sub-call failed
    pub fn failures(&self) -> usize {
        self.entries.iter().filter(|(_, value)| value.is_none()).count()
    }

    pub fn entries(&self) -> &[(u64, Option<T>)] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<(u64, Option<T>)> {
        self.entries
    }
}

/// Batch-oriented fetchers for group members and their data
///
/// The coordinator only talks to the network through this trait, so the
/// crawl state machine can be exercised without a server.
#[allow(async_fn_in_trait)]
pub trait SocialApi {
    /// Lists every member id of a group
    async fn enumerate_group_member_ids(&self, group_id: u64) -> ApiResult<Vec<u64>>;

    /// Fetches normalized profiles, one per requested id, in request order
    async fn fetch_profiles(&self, user_ids: &[u64]) -> ApiResult<Vec<UserProfile>>;

    /// Resolves the complete friend list of each user
    async fn resolve_friend_lists(&self, user_ids: &[u64]) -> ApiResult<BatchResult<Vec<u64>>>;

    /// Resolves the group ids each user belongs to
    async fn resolve_group_memberships(
        &self,
        user_ids: &[u64],
    ) -> ApiResult<BatchResult<Vec<u64>>>;
}
