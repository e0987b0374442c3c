//! Error types for the dispatch layer.

use std::time::Duration;

use roomcast_protocol::{Nickname, RoomName};
use roomcast_store::StoreError;
use roomcast_transport::ConnectionId;

/// Errors returned to callers of the registry and rooms.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No room is registered under this name.
    #[error("room {0} not found")]
    RoomNotFound(RoomName),

    /// Another connection in the room already uses this nickname.
    #[error("nickname {nickname} is already taken in room {room}")]
    NicknameTaken { room: RoomName, nickname: Nickname },

    /// The room's worker has stopped; nothing more can be broadcast.
    #[error("room {0} is closed")]
    RoomClosed(RoomName),

    /// The registry has been shut down and creates no new rooms.
    #[error("room registry is shutting down")]
    ShuttingDown,

    /// The room exists in memory but could not be persisted.
    #[error("failed to register room {room}: {source}")]
    Persistence {
        room: RoomName,
        #[source]
        source: StoreError,
    },
}

/// Why a single write to a target failed.
///
/// These never reach the sender. The worker logs them and decides
/// whether to retry.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The write did not finish within the configured deadline.
    #[error("write to {connection} timed out after {after:?}")]
    Timeout {
        connection: ConnectionId,
        after: Duration,
    },

    /// The connection rejected the write.
    #[error("write to {connection} failed: {reason}")]
    Transport {
        connection: ConnectionId,
        reason: String,
    },

    /// The worker was stopped before the write could start.
    #[error("delivery cancelled")]
    Cancelled,
}
