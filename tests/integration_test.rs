//! Integration tests for tgwatch.
//!
//! These tests drive the library end to end:
//! - Raw updates through normalization into the store
//! - Read-side queries over the collected data
//! - A full monitor run against a mock Bot API

use serde_json::{Value, json};
use std::time::Duration;
use tempfile::TempDir;
use tgwatch::{
    api::{BotApi, RawUpdate},
    model::MediaType,
    monitor::{Monitor, MonitorConfig},
    normalize::normalize,
    query::QueryFacade,
    storage::Storage,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "123456:ABCDEFGHIJKLMNOPQRSTUVWXYZ";

fn message_update(update_id: i64, message_id: i64, from: Value, chat: Value, extra: Value) -> Value {
    let mut message = json!({
        "message_id": message_id,
        "date": 1_704_110_400 + update_id,
        "from": from,
        "chat": chat,
    });
    if let (Some(target), Some(fields)) = (message.as_object_mut(), extra.as_object()) {
        for (key, value) in fields {
            target.insert(key.clone(), value.clone());
        }
    }
    json!({ "update_id": update_id, "message": message })
}

fn alice(username: &str) -> Value {
    json!({"id": 1, "is_bot": false, "first_name": "Alice", "username": username})
}

fn bob() -> Value {
    json!({"id": 2, "is_bot": false, "first_name": "Bob", "username": "bob"})
}

fn lobby() -> Value {
    json!({"id": -100, "type": "supergroup", "title": "Lobby"})
}

fn dm() -> Value {
    json!({"id": 1, "type": "private", "first_name": "Alice"})
}

/// Alice posts in the lobby, renames herself and posts again privately,
/// then Bob posts a photo in the lobby.
fn scenario() -> Vec<Value> {
    vec![
        message_update(10, 501, alice("alice"), lobby(), json!({"text": "hello lobby"})),
        message_update(11, 7, alice("alicia"), dm(), json!({"text": "private hello"})),
        message_update(
            12,
            502,
            bob(),
            lobby(),
            json!({"photo": [{"file_id": "x"}], "caption": "look at this"}),
        ),
    ]
}

fn ingest_all(storage: &mut Storage, updates: &[Value]) {
    for body in updates {
        let update = RawUpdate {
            update_id: body["update_id"].as_i64().unwrap(),
            body: body.clone(),
        };
        let record = normalize(&update).unwrap().unwrap();
        storage.ingest(&record).unwrap();
    }
}

#[test]
fn test_three_update_scenario() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("tgwatch.db");
    let mut storage = Storage::open(&db_path).unwrap();
    ingest_all(&mut storage, &scenario());

    let stats = storage.get_statistics().unwrap();
    assert_eq!(stats.users, 2);
    assert_eq!(stats.messages, 3);
    assert_eq!(stats.chats, 2);
    assert_eq!(stats.username_changes, 1);

    let history = storage.get_username_history(1).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].username.as_deref(), Some("alicia"));
    assert_eq!(history[0].previous_username.as_deref(), Some("alice"));

    let activity = storage.get_user_activity(1).unwrap();
    assert_eq!(activity.len(), 2);
    let alice_lobby = activity.iter().find(|a| a.chat_id == -100).unwrap();
    assert_eq!(alice_lobby.message_count, 1);

    let bob_activity = storage.get_user_activity(2).unwrap();
    assert_eq!(bob_activity.len(), 1);
    assert_eq!(bob_activity[0].message_count, 1);
}

#[test]
fn test_rename_and_reply_in_one_group() {
    let team = json!({"id": 100, "type": "group", "title": "Team"});
    let updates = vec![
        message_update(1, 1, alice("alice"), team.clone(), json!({"text": "first"})),
        message_update(2, 2, alice("alicia"), team.clone(), json!({"text": "second"})),
        message_update(
            3,
            3,
            bob(),
            team,
            json!({"text": "reply", "reply_to_message": {"message_id": 1}}),
        ),
    ];

    let mut storage = Storage::open_memory().unwrap();
    ingest_all(&mut storage, &updates);

    let stats = storage.get_statistics().unwrap();
    assert_eq!(stats.users, 2);
    assert_eq!(stats.username_changes, 1);
    assert_eq!(stats.messages, 3);
    assert_eq!(stats.chats, 1);

    let alice_activity = storage.get_user_activity(1).unwrap();
    let bob_activity = storage.get_user_activity(2).unwrap();
    assert_eq!(alice_activity.len() + bob_activity.len(), 2);
    assert_eq!(alice_activity[0].chat_id, 100);
    assert_eq!(alice_activity[0].message_count, 2);
    assert_eq!(bob_activity[0].chat_id, 100);
    assert_eq!(bob_activity[0].message_count, 1);

    let bob_messages = storage.get_user_messages(2, 10).unwrap();
    assert_eq!(bob_messages.len(), 1);
    assert_eq!(bob_messages[0].message_id, 3);
    assert_eq!(bob_messages[0].reply_to_message_id, Some(1));
}

#[test]
fn test_queries_over_reopened_store() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("tgwatch.db");
    {
        let mut storage = Storage::open(&db_path).unwrap();
        ingest_all(&mut storage, &scenario());
    }

    let facade = QueryFacade::new(Storage::open_existing(&db_path).unwrap());

    let by_old_name = facade.search_usernames("@ALICE").unwrap();
    assert_eq!(by_old_name.len(), 1);
    assert_eq!(by_old_name[0].user_id, 1);
    assert_eq!(by_old_name[0].current_username.as_deref(), Some("alicia"));

    let report = facade.user_report(1).unwrap();
    assert_eq!(report.profile.as_ref().unwrap().first_name.as_deref(), Some("Alice"));
    assert_eq!(report.recent_messages.len(), 2);
    assert_eq!(report.recent_messages[0].message_text, "private hello");

    let hits = facade.search_messages("LOOK", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].media_type, MediaType::Photo);
    assert_eq!(hits[0].chat_title.as_deref(), Some("Lobby"));

    assert!(facade.user_report(999).unwrap().is_empty());
}

#[test]
fn test_replayed_update_is_idempotent_for_messages() {
    let mut storage = Storage::open_memory().unwrap();
    let updates = scenario();
    ingest_all(&mut storage, &updates);
    ingest_all(&mut storage, &updates[..1]);

    let stats = storage.get_statistics().unwrap();
    assert_eq!(stats.messages, 3);
    assert_eq!(stats.username_changes, 2);
}

#[test]
fn test_open_existing_rejects_missing_database() {
    let dir = TempDir::new().unwrap();
    let err = Storage::open_existing(dir.path().join("absent.db")).unwrap_err();
    assert!(err.to_string().contains("absent.db"));
}

#[tokio::test]
async fn test_monitor_collects_from_bot_api() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .and(query_param_is_missing("offset"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": scenario(),
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .and(query_param("offset", "13"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": [],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = BotApi::with_base_url(TOKEN, server.uri()).unwrap();
    let config = MonitorConfig {
        poll_timeout: 0,
        retry_delay: Duration::ZERO,
        idle_delay: Duration::ZERO,
        max_cycles: Some(2),
    };
    let mut monitor = Monitor::new(api, Storage::open_memory().unwrap(), config);
    let summary = monitor.run(&CancellationToken::new()).await;

    assert_eq!(summary.cycles, 2);
    assert_eq!(summary.received, 3);
    assert_eq!(summary.stored, 3);
    assert_eq!(summary.transport_errors, 0);
    assert_eq!(summary.last_update_id, Some(12));
    assert_eq!(monitor.storage().get_statistics().unwrap().users, 2);
}

#[tokio::test]
async fn test_monitor_survives_api_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/bot{TOKEN}/getUpdates")))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let api = BotApi::with_base_url(TOKEN, server.uri()).unwrap();
    let config = MonitorConfig {
        poll_timeout: 0,
        retry_delay: Duration::ZERO,
        idle_delay: Duration::ZERO,
        max_cycles: Some(3),
    };
    let mut monitor = Monitor::new(api, Storage::open_memory().unwrap(), config);
    let summary = monitor.run(&CancellationToken::new()).await;

    assert_eq!(summary.cycles, 3);
    assert_eq!(summary.transport_errors, 3);
    assert_eq!(summary.last_update_id, None);
}
