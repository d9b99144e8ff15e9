//! `SocialApi` implementation backed by the rate-limited client

use crate::api::scripts::{
    all_friends_script, friend_lists_script, group_lists_script, member_ids_script,
    CALLS_PER_SCRIPT, FRIENDS_PER_CALL, MEMBERS_PER_SCRIPT,
};
use crate::api::{ApiClient, ApiError, ApiResult, BatchResult, SocialApi};
use crate::profile::{normalize_profile, UserProfile, PROFILE_FIELDS};
use serde_json::Value;
use std::collections::HashMap;

/// Ids accepted by one `users.get` call
pub const PROFILES_PER_CALL: usize = 1000;

/// Entity fetchers for a VK-style API
#[derive(Debug, Clone)]
pub struct VkFetcher {
    client: ApiClient,
}

impl VkFetcher {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Runs a script and expects an array back
    async fn execute_array(&self, code: &str) -> ApiResult<Vec<Value>> {
        match self.client.execute(code).await? {
            Value::Array(items) => Ok(items),
            other => Err(ApiError::unexpected(
                "execute",
                format!("expected an array, got {}", other),
            )),
        }
    }

    /// Resolves one chunk of at most 25 users
    async fn friend_lists_chunk(&self, chunk: &[u64]) -> ApiResult<Vec<(u64, Option<Vec<u64>>)>> {
        let results = self.execute_array(&friend_lists_script(chunk)).await?;
        let mut entries = Vec::with_capacity(chunk.len());

        for (i, &user_id) in chunk.iter().enumerate() {
            let friends = match results.get(i) {
                Some(Value::Object(page)) => {
                    let count = page.get("count").and_then(Value::as_u64).unwrap_or(0);
                    if count >= FRIENDS_PER_CALL {
                        tracing::debug!("User {} has {} friends, paginating", user_id, count);
                        let all = self.client.execute(&all_friends_script(user_id)).await?;
                        parse_id_list(&all)
                    } else {
                        page.get("items").and_then(parse_id_list)
                    }
                }
                _ => None,
            };
            entries.push((user_id, friends));
        }

        Ok(entries)
    }
}

impl SocialApi for VkFetcher {
    async fn enumerate_group_member_ids(&self, group_id: u64) -> ApiResult<Vec<u64>> {
        let total = self.client.group_members_count(group_id).await?;
        tracing::info!("Group {} has {} members", group_id, total);

        let mut member_ids = Vec::with_capacity(total as usize);
        let mut offset = 0;
        while offset < total {
            let response = self
                .client
                .execute(&member_ids_script(group_id, offset))
                .await?;
            let page = parse_id_list(&response).ok_or_else(|| {
                ApiError::unexpected("execute", format!("member page at offset {}", offset))
            })?;

            tracing::debug!("Enumerated {} members at offset {}", page.len(), offset);
            member_ids.extend(page);
            offset += MEMBERS_PER_SCRIPT;
        }

        Ok(member_ids)
    }

    async fn fetch_profiles(&self, user_ids: &[u64]) -> ApiResult<Vec<UserProfile>> {
        let mut profiles = Vec::with_capacity(user_ids.len());

        for chunk in user_ids.chunks(PROFILES_PER_CALL) {
            let raw = self.client.users_get(chunk, PROFILE_FIELDS).await?;
            let mut by_id: HashMap<u64, UserProfile> = raw
                .iter()
                .filter_map(normalize_profile)
                .map(|profile| (profile.user_id, profile))
                .collect();

            for &user_id in chunk {
                let profile = by_id.remove(&user_id).unwrap_or_else(|| {
                    tracing::debug!("No profile returned for user {}", user_id);
                    UserProfile::empty(user_id)
                });
                profiles.push(profile);
            }
        }

        Ok(profiles)
    }

    async fn resolve_friend_lists(&self, user_ids: &[u64]) -> ApiResult<BatchResult<Vec<u64>>> {
        let mut entries = Vec::with_capacity(user_ids.len());
        for chunk in user_ids.chunks(CALLS_PER_SCRIPT) {
            entries.extend(self.friend_lists_chunk(chunk).await?);
        }
        Ok(BatchResult::new(entries))
    }

    async fn resolve_group_memberships(
        &self,
        user_ids: &[u64],
    ) -> ApiResult<BatchResult<Vec<u64>>> {
        let mut entries = Vec::with_capacity(user_ids.len());

        for chunk in user_ids.chunks(CALLS_PER_SCRIPT) {
            let results = self.execute_array(&group_lists_script(chunk)).await?;
            for (i, &user_id) in chunk.iter().enumerate() {
                entries.push((user_id, results.get(i).and_then(parse_id_list)));
            }
        }

        Ok(BatchResult::new(entries))
    }
}

/// Reads a JSON array of ids; `false`, `null` or any other shape is a failure
fn parse_id_list(value: &Value) -> Option<Vec<u64>> {
    value
        .as_array()?
        .iter()
        .map(Value::as_u64)
        .collect::<Option<Vec<_>>>()
}
