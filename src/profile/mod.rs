//! Profile normalization
//!
//! Converts raw `users.get` records into flat [`UserProfile`] rows. Every
//! attribute is optional: a missing or malformed sub-field becomes `None`
//! instead of failing the whole record.

mod bdate;

pub use bdate::normalize_bdate;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Profile fields requested from `users.get`
pub const PROFILE_FIELDS: &[&str] = &[
    "sex",
    "bdate",
    "verified",
    "city",
    "country",
    "education",
    "last_seen",
    "can_write_private_message",
    "can_send_friend_request",
    "followers_count",
];

/// One row of the profile table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: u64,
    pub is_closed: Option<bool>,
    /// 1 = female, 2 = male; unspecified is stored as empty
    pub sex: Option<u8>,
    /// `YYYY-MM-DD`, or `--MM-DD` when the year is hidden
    pub bdate: Option<String>,
    pub verified: Option<bool>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub university_name: Option<String>,
    pub faculty_name: Option<String>,
    /// Unix timestamp (seconds)
    pub last_seen: Option<i64>,
    pub can_write_private_message: Option<bool>,
    pub can_send_friend_request: Option<bool>,
    pub followers_count: Option<u64>,
    /// Filled in by the connections stage
    pub friends_count: Option<u64>,
}

impl UserProfile {
    /// Creates a profile with only the id set
    ///
    /// Used for members the API did not return a record for.
    pub fn empty(user_id: u64) -> Self {
        Self {
            user_id,
            ..Self::default()
        }
    }
}

/// Normalizes a raw `users.get` record
///
/// Returns `None` only when the record has no usable `id`.
pub fn normalize_profile(raw: &Value) -> Option<UserProfile> {
    let user_id = raw.get("id").and_then(Value::as_u64)?;

    let sex = raw
        .get("sex")
        .and_then(Value::as_u64)
        .filter(|s| matches!(s, 1 | 2))
        .map(|s| s as u8);

    let bdate = raw
        .get("bdate")
        .and_then(Value::as_str)
        .and_then(normalize_bdate);

    Some(UserProfile {
        user_id,
        is_closed: raw.get("is_closed").and_then(Value::as_bool),
        sex,
        bdate,
        verified: flag(raw.get("verified")),
        city: titled(raw.get("city")),
        country: titled(raw.get("country")),
        university_name: non_empty_str(raw.get("university_name")),
        faculty_name: non_empty_str(raw.get("faculty_name")),
        last_seen: raw
            .get("last_seen")
            .and_then(|ls| ls.get("time"))
            .and_then(Value::as_i64),
        can_write_private_message: flag(raw.get("can_write_private_message")),
        can_send_friend_request: flag(raw.get("can_send_friend_request")),
        followers_count: raw.get("followers_count").and_then(Value::as_u64),
        friends_count: None,
    })
}

/// Reads a 0/1 integer (or a JSON boolean) as a flag
fn flag(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_u64()? {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        },
        _ => None,
    }
}

/// Reads the `title` of a `{id, title}` object
fn titled(value: Option<&Value>) -> Option<String> {
    non_empty_str(value?.get("title"))
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
