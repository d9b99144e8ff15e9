//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the remote API and drive the
//! full four-stage crawl end-to-end against a temporary data directory.

use group_graph::api::ApiError;
use group_graph::config::{ApiConfig, Config, CrawlConfig, LoggingConfig};
use group_graph::crawler::{run_crawl, StageOutcome};
use group_graph::profile::UserProfile;
use group_graph::state::Stage;
use group_graph::storage::{FileStorage, Storage};
use group_graph::CrawlError;
use serde_json::{json, Value};
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

const GROUP_ID: u64 = 77;
const CONFIG_HASH: &str = "0123abcd";

/// Creates a test configuration pointing at the mock server
fn create_test_config(server: &MockServer, data_dir: &Path, request_interval: u64) -> Config {
    Config {
        api: ApiConfig {
            access_token: "test-token".to_string(),
            version: "5.126".to_string(),
            base_url: format!("{}/method", server.uri()),
            request_interval,
        },
        crawl: CrawlConfig {
            group_id: GROUP_ID,
            data_dir: data_dir.to_path_buf(),
        },
        logging: LoggingConfig::default(),
    }
}

fn ok(response: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "response": response }))
}

async fn mount_method(server: &MockServer, api_method: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(format!("/method/{}", api_method)))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Mounts an `execute` mock selected by the result variable of its script
async fn mount_script(server: &MockServer, variable: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/method/execute"))
        .and(body_string_contains(variable))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Decodes one field of a form-encoded request body
fn form_field(request: &Request, name: &str) -> Option<String> {
    url::form_urlencoded::parse(&request.body)
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Matches requests whose form field satisfies a predicate
struct FormField {
    name: &'static str,
    predicate: Box<dyn Fn(&str) -> bool + Send + Sync>,
}

impl Match for FormField {
    fn matches(&self, request: &Request) -> bool {
        form_field(request, self.name).is_some_and(|value| (self.predicate)(&value))
    }
}

/// Matches `execute` calls whose script contains `needle`
fn code_contains(needle: impl Into<String>) -> FormField {
    let needle = needle.into();
    FormField {
        name: "code",
        predicate: Box::new(move |code| code.contains(&needle)),
    }
}

/// Matches `users.get` calls for exactly `count` ids
fn user_id_count(count: usize) -> FormField {
    FormField {
        name: "user_ids",
        predicate: Box::new(move |ids| ids.split(',').count() == count),
    }
}

/// Mounts an `execute` mock for one chunk of a per-user script
async fn mount_chunk(server: &MockServer, variable: &str, ids: &[u64], response: ResponseTemplate) {
    let ids = ids.iter().map(u64::to_string).collect::<Vec<_>>().join(",");
    Mock::given(method("POST"))
        .and(path("/method/execute"))
        .and(code_contains(variable))
        .and(code_contains(format!("var user_ids = [{}];", ids)))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Scripts of the `execute` calls received so far that contain `needle`
async fn received_scripts(server: &MockServer, needle: &str) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == "/method/execute")
        .filter_map(|request| form_field(request, "code"))
        .filter(|code| code.contains(needle))
        .collect()
}

fn open_profiles(ids: impl IntoIterator<Item = u64>) -> Value {
    ids.into_iter()
        .map(|id| json!({"id": id, "is_closed": false}))
        .collect()
}

fn closed_profiles(ids: impl IntoIterator<Item = u64>) -> Value {
    ids.into_iter()
        .map(|id| json!({"id": id, "is_closed": true}))
        .collect()
}

/// Members 1 and 2 are open, member 3 is closed
async fn mount_group(server: &MockServer) {
    mount_method(server, "groups.getMembers", ok(json!({"count": 3, "items": [1]}))).await;
    mount_script(server, "member_ids", ok(json!([1, 2, 3]))).await;
    mount_method(
        server,
        "users.get",
        ok(json!([
            {"id": 1, "is_closed": false, "sex": 2, "bdate": "5.6.1990",
             "city": {"id": 1, "title": "Moscow"}},
            {"id": 2, "is_closed": false, "sex": 1, "bdate": "31.12"},
            {"id": 3, "is_closed": true}
        ])),
    )
    .await;
}

fn storage(dir: &TempDir) -> FileStorage {
    FileStorage::open(dir.path()).unwrap()
}

#[tokio::test]
async fn test_full_crawl_builds_member_graph() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_group(&server).await;
    mount_script(
        &server,
        "users_friends",
        ok(json!([
            {"count": 3, "items": [2, 3, 99]},
            {"count": 1, "items": [1]}
        ])),
    )
    .await;
    mount_script(&server, "users_groups", ok(json!([[10, 11], false]))).await;

    let config = create_test_config(&server, dir.path(), 0);
    let summary = run_crawl(&config, CONFIG_HASH).await.unwrap();

    assert_eq!(summary.enumeration, StageOutcome::Completed { batches: 1, ids: 3 });
    assert_eq!(summary.profiles, StageOutcome::Completed { batches: 1, ids: 3 });
    assert_eq!(summary.connections, StageOutcome::Completed { batches: 1, ids: 2 });
    assert_eq!(summary.groups, StageOutcome::Completed { batches: 1, ids: 2 });
    assert!(!summary.any_halted());

    let log = std::fs::read_to_string(dir.path().join("users.log.csv")).unwrap();
    assert_eq!(
        log,
        "user_id,is_closed,data_parsed,friends_parsed,groups_parsed\n\
         1,false,true,true,true\n\
         2,false,true,true,true\n\
         3,true,true,,\n"
    );

    let edges = std::fs::read_to_string(dir.path().join("friends_connections.csv")).unwrap();
    assert_eq!(edges, "user_a,user_b\n1,2\n1,3\n2,1\n");

    let groups: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("user_groups.json")).unwrap())
            .unwrap();
    assert_eq!(groups, json!({"1": [10, 11]}));

    let recorded = std::fs::read_to_string(dir.path().join("config.sha256")).unwrap();
    assert_eq!(recorded.trim(), CONFIG_HASH);

    let profiles = storage(&dir).load_profiles().unwrap();
    assert_eq!(profiles.len(), 3);
    let first = profiles.get(1).unwrap();
    assert_eq!(first.bdate.as_deref(), Some("1990-06-05"));
    assert_eq!(first.city.as_deref(), Some("Moscow"));
    assert_eq!(first.friends_count, Some(3));
    assert_eq!(profiles.get(2).unwrap().bdate.as_deref(), Some("--12-31"));
    assert_eq!(profiles.get(3).unwrap().friends_count, None);
}

#[tokio::test]
async fn test_second_run_makes_no_requests() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_group(&server).await;
    mount_script(
        &server,
        "users_friends",
        ok(json!([{"count": 1, "items": [2]}, {"count": 0, "items": []}])),
    )
    .await;
    mount_script(&server, "users_groups", ok(json!([[10], [20]]))).await;

    let config = create_test_config(&server, dir.path(), 0);
    run_crawl(&config, CONFIG_HASH).await.unwrap();

    let requests_after_first = server.received_requests().await.unwrap().len();
    let files = ["users.log.csv", "user_data.csv", "friends_connections.csv", "user_groups.json"];
    let before: Vec<Vec<u8>> = files
        .iter()
        .map(|f| std::fs::read(dir.path().join(f)).unwrap())
        .collect();

    let summary = run_crawl(&config, CONFIG_HASH).await.unwrap();
    assert_eq!(summary.enumeration, StageOutcome::Skipped);
    assert_eq!(summary.profiles, StageOutcome::Skipped);
    assert_eq!(summary.connections, StageOutcome::Skipped);
    assert_eq!(summary.groups, StageOutcome::Skipped);

    assert_eq!(server.received_requests().await.unwrap().len(), requests_after_first);
    let after: Vec<Vec<u8>> = files
        .iter()
        .map(|f| std::fs::read(dir.path().join(f)).unwrap())
        .collect();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_quota_exhaustion_halts_connections_only() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_group(&server).await;
    mount_script(&server, "users_friends", ok(json!([false, false]))).await;
    mount_script(&server, "users_groups", ok(json!([[10], []]))).await;

    let config = create_test_config(&server, dir.path(), 0);
    let summary = run_crawl(&config, CONFIG_HASH).await.unwrap();

    assert_eq!(
        summary.connections,
        StageOutcome::Halted {
            completed_batches: 0,
            remaining_ids: 2
        }
    );
    assert_eq!(summary.groups, StageOutcome::Completed { batches: 1, ids: 2 });
    assert!(summary.any_halted());

    let store = storage(&dir);
    let log = store.load_log().unwrap();
    assert_eq!(log.count_done(Stage::Connections), 0);
    assert_eq!(log.pending(Stage::Connections), vec![1, 2]);
    assert_eq!(log.count_done(Stage::Groups), 2);
    assert!(store.load_connections().unwrap().is_empty());
    assert_eq!(store.load_group_memberships().unwrap().get(2), Some(&[][..]));
}

#[tokio::test]
async fn test_large_friend_list_is_paginated() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_group(&server).await;
    mount_script(
        &server,
        "users_friends",
        ok(json!([
            {"count": 1500, "items": [500]},
            {"count": 0, "items": []}
        ])),
    )
    .await;
    mount_script(&server, "user_friends", ok(json!([500, 2, 501, 3]))).await;
    mount_script(&server, "users_groups", ok(json!([[], []]))).await;

    let config = create_test_config(&server, dir.path(), 0);
    run_crawl(&config, CONFIG_HASH).await.unwrap();

    let store = storage(&dir);
    let connections = store.load_connections().unwrap();
    assert!(connections.contains(1, 2));
    assert!(connections.contains(1, 3));
    assert_eq!(connections.len(), 2);
    assert_eq!(store.load_profiles().unwrap().get(1).unwrap().friends_count, Some(4));
}

#[tokio::test]
async fn test_remote_error_aborts_the_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_method(&server, "groups.getMembers", ok(json!({"count": 2, "items": []}))).await;
    mount_script(&server, "member_ids", ok(json!([1, 2]))).await;
    mount_method(
        &server,
        "users.get",
        ResponseTemplate::new(200).set_body_json(json!({
            "error": {"error_code": 5, "error_msg": "User authorization failed"}
        })),
    )
    .await;

    let config = create_test_config(&server, dir.path(), 0);
    let err = run_crawl(&config, CONFIG_HASH).await.unwrap_err();
    match err {
        CrawlError::Api(ApiError::Remote { method, code, .. }) => {
            assert_eq!(method, "users.get");
            assert_eq!(code, 5);
        }
        other => panic!("unexpected error: {}", other),
    }

    // Enumeration was persisted before the failure
    let log = storage(&dir).load_log().unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log.count_done(Stage::Profiles), 0);
}

#[tokio::test]
async fn test_calls_respect_request_interval() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_group(&server).await;
    mount_script(
        &server,
        "users_friends",
        ok(json!([{"count": 0, "items": []}, {"count": 0, "items": []}])),
    )
    .await;
    mount_script(&server, "users_groups", ok(json!([[], []]))).await;

    let interval = Duration::from_millis(50);
    let config = create_test_config(&server, dir.path(), interval.as_millis() as u64);

    let started = Instant::now();
    run_crawl(&config, CONFIG_HASH).await.unwrap();
    let elapsed = started.elapsed();

    let calls = server.received_requests().await.unwrap().len() as u32;
    assert_eq!(calls, 5);
    assert!(elapsed >= interval * calls, "{:?} for {} calls", elapsed, calls);
}

#[tokio::test]
async fn test_enumeration_steps_script_offsets() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_method(&server, "groups.getMembers", ok(json!({"count": 30001, "items": []}))).await;
    Mock::given(method("POST"))
        .and(path("/method/execute"))
        .and(code_contains("var offset = 0;"))
        .respond_with(ok(json!((1..=25).collect::<Vec<u64>>())))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/method/execute"))
        .and(code_contains("var offset = 25000;"))
        .respond_with(ok(json!((26..=30).collect::<Vec<u64>>())))
        .mount(&server)
        .await;
    mount_method(&server, "users.get", ok(closed_profiles(1..=30))).await;

    let config = create_test_config(&server, dir.path(), 0);
    let summary = run_crawl(&config, CONFIG_HASH).await.unwrap();
    assert_eq!(summary.enumeration, StageOutcome::Completed { batches: 1, ids: 30 });
    assert_eq!(summary.connections, StageOutcome::Skipped);

    let scripts = received_scripts(&server, "member_ids").await;
    assert_eq!(scripts.len(), 2);
    assert!(scripts[0].contains("var offset = 0;"));
    assert!(scripts[1].contains("var offset = 25000;"));

    let log = storage(&dir).load_log().unwrap();
    let ids: Vec<u64> = log.entries().iter().map(|entry| entry.user_id).collect();
    assert_eq!(ids, (1..=30).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_friend_and_group_scripts_hold_at_most_25_users() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let first: Vec<u64> = (1..=25).collect();
    let second: Vec<u64> = (26..=30).collect();

    mount_method(&server, "groups.getMembers", ok(json!({"count": 30, "items": []}))).await;
    mount_script(&server, "member_ids", ok(json!((1..=30).collect::<Vec<u64>>()))).await;
    mount_method(&server, "users.get", ok(open_profiles(1..=30))).await;

    // Every member is friends with the next one, wrapping around
    let friends = |ids: &[u64]| -> Value {
        ids.iter()
            .map(|id| json!({"count": 1, "items": [id % 30 + 1]}))
            .collect()
    };
    mount_chunk(&server, "users_friends", &first, ok(friends(&first))).await;
    mount_chunk(&server, "users_friends", &second, ok(friends(&second))).await;

    let groups = |ids: &[u64], group: u64| -> Value { ids.iter().map(|_| json!([group])).collect() };
    mount_chunk(&server, "users_groups", &first, ok(groups(&first, 100))).await;
    mount_chunk(&server, "users_groups", &second, ok(groups(&second, 200))).await;

    let config = create_test_config(&server, dir.path(), 0);
    let summary = run_crawl(&config, CONFIG_HASH).await.unwrap();
    assert_eq!(summary.connections, StageOutcome::Completed { batches: 1, ids: 30 });
    assert_eq!(summary.groups, StageOutcome::Completed { batches: 1, ids: 30 });

    assert_eq!(received_scripts(&server, "users_friends").await.len(), 2);
    assert_eq!(received_scripts(&server, "users_groups").await.len(), 2);

    let store = storage(&dir);
    let connections = store.load_connections().unwrap();
    assert_eq!(connections.len(), 30);
    assert!(connections.contains(25, 26));
    assert!(connections.contains(30, 1));

    let memberships = store.load_group_memberships().unwrap();
    assert_eq!(memberships.len(), 30);
    assert_eq!(memberships.get(25), Some(&[100][..]));
    assert_eq!(memberships.get(26), Some(&[200][..]));
}

#[tokio::test]
async fn test_profiles_requested_in_chunks_of_1000() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_method(&server, "groups.getMembers", ok(json!({"count": 1001, "items": []}))).await;
    mount_script(&server, "member_ids", ok(json!((1..=1001).collect::<Vec<u64>>()))).await;
    Mock::given(method("POST"))
        .and(path("/method/users.get"))
        .and(user_id_count(1000))
        .respond_with(ok(closed_profiles(1..=1000)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/method/users.get"))
        .and(user_id_count(1))
        .respond_with(ok(closed_profiles([1001])))
        .mount(&server)
        .await;

    let config = create_test_config(&server, dir.path(), 0);
    let summary = run_crawl(&config, CONFIG_HASH).await.unwrap();
    assert_eq!(summary.profiles, StageOutcome::Completed { batches: 1, ids: 1001 });

    let chunk_sizes: Vec<usize> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == "/method/users.get")
        .filter_map(|request| form_field(request, "user_ids"))
        .map(|ids| ids.split(',').count())
        .collect();
    assert_eq!(chunk_sizes, vec![1000, 1]);

    let store = storage(&dir);
    assert_eq!(store.load_profiles().unwrap().len(), 1001);
    assert_eq!(store.load_log().unwrap().count_done(Stage::Profiles), 1001);
}

#[tokio::test]
async fn test_profile_missing_from_reply_stays_out_of_later_stages() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_method(&server, "groups.getMembers", ok(json!({"count": 3, "items": []}))).await;
    mount_script(&server, "member_ids", ok(json!([1, 2, 3]))).await;
    // Member 3 was deleted and is left out of the reply
    mount_method(&server, "users.get", ok(open_profiles([1, 2]))).await;
    mount_chunk(
        &server,
        "users_friends",
        &[1, 2],
        ok(json!([{"count": 1, "items": [2]}, {"count": 1, "items": [1]}])),
    )
    .await;
    mount_chunk(&server, "users_groups", &[1, 2], ok(json!([[10], [20]]))).await;

    let config = create_test_config(&server, dir.path(), 0);
    let summary = run_crawl(&config, CONFIG_HASH).await.unwrap();
    assert_eq!(summary.profiles, StageOutcome::Completed { batches: 1, ids: 3 });
    assert_eq!(summary.connections, StageOutcome::Completed { batches: 1, ids: 2 });
    assert_eq!(summary.groups, StageOutcome::Completed { batches: 1, ids: 2 });

    let log = std::fs::read_to_string(dir.path().join("users.log.csv")).unwrap();
    assert!(log.ends_with("\n3,,true,,\n"), "{}", log);

    let store = storage(&dir);
    assert_eq!(store.load_profiles().unwrap().get(3), Some(&UserProfile::empty(3)));
    assert!(store.load_group_memberships().unwrap().get(3).is_none());
    assert_eq!(store.load_connections().unwrap().len(), 2);

    for script in received_scripts(&server, "var user_ids").await {
        assert!(script.contains("var user_ids = [1,2];"), "{}", script);
    }
}
