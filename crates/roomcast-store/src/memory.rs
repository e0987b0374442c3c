//! In-memory [`RoomStore`] backed by a `HashMap`.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roomcast_protocol::{RenderedMessage, RoomName};
use tokio::sync::Mutex;

use crate::{RoomRecord, RoomStore, StoreError};

struct StoredRoom {
    created_at: DateTime<Utc>,
    messages: VecDeque<RenderedMessage>,
}

/// Process-local store. Everything is lost on restart.
///
/// An optional per-room cap drops the oldest messages once reached.
pub struct MemoryStore {
    rooms: Mutex<HashMap<RoomName, StoredRoom>>,
    max_messages_per_room: Option<usize>,
}

impl MemoryStore {
    /// Creates an empty store with unbounded history.
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            max_messages_per_room: None,
        }
    }

    /// Creates an empty store that keeps at most `max` messages per room.
    pub fn with_history_limit(max: usize) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            max_messages_per_room: Some(max),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn create_room(&self, room: &RoomName) -> Result<(), StoreError> {
        let mut rooms = self.rooms.lock().await;
        if rooms.contains_key(room) {
            return Err(StoreError::RoomExists(room.clone()));
        }
        rooms.insert(
            room.clone(),
            StoredRoom {
                created_at: Utc::now(),
                messages: VecDeque::new(),
            },
        );
        tracing::debug!(%room, "room stored");
        Ok(())
    }

    async fn list_rooms(&self) -> Result<Vec<RoomRecord>, StoreError> {
        let rooms = self.rooms.lock().await;
        let mut records: Vec<RoomRecord> = rooms
            .iter()
            .map(|(room, stored)| RoomRecord {
                room: room.clone(),
                created_at: stored.created_at,
            })
            .collect();
        records.sort_by(|a, b| a.room.cmp(&b.room));
        Ok(records)
    }

    async fn append_message(
        &self,
        message: &RenderedMessage,
    ) -> Result<(), StoreError> {
        let mut rooms = self.rooms.lock().await;
        let stored = rooms
            .get_mut(message.room())
            .ok_or_else(|| StoreError::RoomNotFound(message.room().clone()))?;
        stored.messages.push_back(message.clone());
        if let Some(max) = self.max_messages_per_room {
            while stored.messages.len() > max {
                stored.messages.pop_front();
            }
        }
        Ok(())
    }

    async fn history(
        &self,
        room: &RoomName,
    ) -> Result<Vec<RenderedMessage>, StoreError> {
        let rooms = self.rooms.lock().await;
        let stored = rooms
            .get(room)
            .ok_or_else(|| StoreError::RoomNotFound(room.clone()))?;
        let mut messages: Vec<RenderedMessage> =
            stored.messages.iter().cloned().collect();
        // Stable: equal timestamps keep append order.
        messages.sort_by_key(|m| m.timestamp());
        Ok(messages)
    }
}
