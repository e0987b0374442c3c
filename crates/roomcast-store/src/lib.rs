//! Room and message persistence for Roomcast.
//!
//! The dispatch engine and the chat service only see the [`RoomStore`]
//! trait. [`MemoryStore`] is the default backend. History lives as long
//! as the process does.

mod error;
mod memory;

pub use error::StoreError;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roomcast_protocol::{RenderedMessage, RoomName};

/// A stored room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRecord {
    pub room: RoomName,
    pub created_at: DateTime<Utc>,
}

/// Durable-ish storage for rooms and their message history.
///
/// Object-safe so the server can hold an `Arc<dyn RoomStore>` and tests
/// can swap in failing doubles.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Registers a room. Fails with [`StoreError::RoomExists`] if the
    /// room is already stored.
    async fn create_room(&self, room: &RoomName) -> Result<(), StoreError>;

    /// Lists every stored room, ordered by name.
    async fn list_rooms(&self) -> Result<Vec<RoomRecord>, StoreError>;

    /// Appends a message to its room's history.
    async fn append_message(
        &self,
        message: &RenderedMessage,
    ) -> Result<(), StoreError>;

    /// Returns a room's history, oldest first.
    async fn history(
        &self,
        room: &RoomName,
    ) -> Result<Vec<RenderedMessage>, StoreError>;
}
