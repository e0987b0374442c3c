//! Error types for the persistence layer.

use roomcast_protocol::RoomName;

/// Errors returned by a [`RoomStore`](crate::RoomStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// `create_room` was called for a room that is already stored.
    #[error("room {0} already exists")]
    RoomExists(RoomName),

    /// A message or history lookup named a room that was never created.
    #[error("room {0} does not exist")]
    RoomNotFound(RoomName),

    /// The backing store could not complete the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
