//! VKScript programs executed through the `execute` method
//!
//! A single `execute` call may perform at most 25 API sub-calls. A failed
//! sub-call evaluates to `false` inside the script, so the returned arrays
//! hold `false` in place of the failed entry instead of aborting the call.

/// Sub-calls allowed in one `execute` invocation
pub const CALLS_PER_SCRIPT: usize = 25;

/// Members returned by one `groups.getMembers` call
pub const MEMBERS_PER_CALL: u64 = 1000;

/// Members enumerated by one script invocation
pub const MEMBERS_PER_SCRIPT: u64 = MEMBERS_PER_CALL * CALLS_PER_SCRIPT as u64;

/// Friends returned by one `friends.get` call; users at or above this
/// count need the paginated script
pub const FRIENDS_PER_CALL: u64 = 1000;

/// Groups fetched per user
pub const GROUPS_PER_USER: u64 = 30;

/// Lists up to 25 000 member ids of a group starting at `offset`
pub fn member_ids_script(group_id: u64, offset: u64) -> String {
    format!(
        r#"var group_id = {group_id};
var offset = {offset};
var i = 0;
var member_ids = [];
while (i < {calls}) {{
    var page = API.groups.getMembers({{
        "group_id": group_id,
        "offset": offset + i * {per_call},
        "count": {per_call}}})["items"];
    member_ids = member_ids + page;
    i = i + 1;
}}
return member_ids;"#,
        calls = CALLS_PER_SCRIPT,
        per_call = MEMBERS_PER_CALL,
    )
}

/// Fetches the first page of friends for each of up to 25 users
///
/// Each entry of the result is either `{"count": n, "items": [...]}` or
/// `false` when that user's call failed.
pub fn friend_lists_script(user_ids: &[u64]) -> String {
    format!(
        r#"var user_ids = {ids};
var i = 0;
var users_friends = [];
while ((i < {calls}) && (i < user_ids.length)) {{
    var friends = API.friends.get({{
        "user_id": user_ids[i],
        "count": {per_call}
    }});
    users_friends = users_friends + [friends];
    i = i + 1;
}}
return users_friends;"#,
        ids = id_array(user_ids),
        calls = CALLS_PER_SCRIPT,
        per_call = FRIENDS_PER_CALL,
    )
}

/// Pages through the complete friend list of one user
pub fn all_friends_script(user_id: u64) -> String {
    format!(
        r#"var user_id = {user_id};
var first_page = API.friends.get({{
    "user_id": user_id,
    "count": {per_call}
}});
var total = first_page["count"];
var user_friends = first_page["items"];
var offset = {per_call};
while (total - offset > 0) {{
    var page = API.friends.get({{
        "user_id": user_id,
        "offset": offset,
        "count": {per_call}
    }})["items"];
    user_friends = user_friends + page;
    offset = offset + {per_call};
}}
return user_friends;"#,
        per_call = FRIENDS_PER_CALL,
    )
}

/// Fetches the group ids of each of up to 25 users
pub fn group_lists_script(user_ids: &[u64]) -> String {
    format!(
        r#"var user_ids = {ids};
var i = 0;
var users_groups = [];
while ((i < {calls}) && (i < user_ids.length)) {{
    var groups = API.groups.get({{
        "user_id": user_ids[i],
        "count": {limit}
    }})["items"];
    users_groups = users_groups + [groups];
    i = i + 1;
}}
return users_groups;"#,
        ids = id_array(user_ids),
        calls = CALLS_PER_SCRIPT,
        limit = GROUPS_PER_USER,
    )
}

fn id_array(ids: &[u64]) -> String {
    let joined = ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("[{}]", joined)
}
