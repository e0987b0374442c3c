//! Integration tests for the in-memory store.

use chrono::{TimeZone, Utc};
use roomcast_protocol::{RenderedMessage, RoomName};
use roomcast_store::{MemoryStore, RoomStore, StoreError};

// =========================================================================
// Helpers
// =========================================================================

fn room(name: &str) -> RoomName {
    RoomName::try_from(name).unwrap()
}

fn msg_at(room_name: &str, secs: u32, content: &str) -> RenderedMessage {
    let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, secs).unwrap();
    RenderedMessage::new(room(room_name), "alice", ts, content)
}

// =========================================================================
// Rooms
// =========================================================================

#[tokio::test]
async fn test_create_room_then_list() {
    let store = MemoryStore::new();
    store.create_room(&room("beta")).await.unwrap();
    store.create_room(&room("alpha")).await.unwrap();

    let rooms = store.list_rooms().await.unwrap();
    let names: Vec<&str> = rooms.iter().map(|r| r.room.as_str()).collect();
    assert_eq!(names, vec!["alpha", "beta"]);
}

#[tokio::test]
async fn test_create_room_twice_reports_exists() {
    let store = MemoryStore::new();
    store.create_room(&room("r1")).await.unwrap();

    let err = store.create_room(&room("r1")).await.unwrap_err();
    assert!(matches!(err, StoreError::RoomExists(r) if r.as_str() == "r1"));
}

// =========================================================================
// Messages
// =========================================================================

#[tokio::test]
async fn test_append_to_unknown_room_fails() {
    let store = MemoryStore::new();
    let err = store
        .append_message(&msg_at("ghost", 1, "boo"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::RoomNotFound(_)));
}

#[tokio::test]
async fn test_history_is_ordered_by_timestamp() {
    let store = MemoryStore::new();
    store.create_room(&room("r1")).await.unwrap();
    store.append_message(&msg_at("r1", 30, "third")).await.unwrap();
    store.append_message(&msg_at("r1", 10, "first")).await.unwrap();
    store.append_message(&msg_at("r1", 20, "second")).await.unwrap();

    let history = store.history(&room("r1")).await.unwrap();
    let contents: Vec<&str> = history.iter().map(|m| m.content()).collect();
    assert_eq!(contents, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_history_equal_timestamps_keep_append_order() {
    let store = MemoryStore::new();
    store.create_room(&room("r1")).await.unwrap();
    store.append_message(&msg_at("r1", 5, "a")).await.unwrap();
    store.append_message(&msg_at("r1", 5, "b")).await.unwrap();

    let history = store.history(&room("r1")).await.unwrap();
    assert_eq!(history[0].content(), "a");
    assert_eq!(history[1].content(), "b");
}

#[tokio::test]
async fn test_history_is_scoped_to_room() {
    let store = MemoryStore::new();
    store.create_room(&room("r1")).await.unwrap();
    store.create_room(&room("r2")).await.unwrap();
    store.append_message(&msg_at("r1", 1, "only r1")).await.unwrap();

    assert_eq!(store.history(&room("r1")).await.unwrap().len(), 1);
    assert!(store.history(&room("r2")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_history_limit_drops_oldest() {
    let store = MemoryStore::with_history_limit(2);
    store.create_room(&room("r1")).await.unwrap();
    for (i, body) in ["one", "two", "three"].iter().enumerate() {
        store
            .append_message(&msg_at("r1", i as u32, body))
            .await
            .unwrap();
    }

    let history = store.history(&room("r1")).await.unwrap();
    let contents: Vec<&str> = history.iter().map(|m| m.content()).collect();
    assert_eq!(contents, vec!["two", "three"]);
}
