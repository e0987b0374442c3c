use crate::ConnectionId;

/// Errors that can occur on a single client connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed, either by the peer or locally.
    #[error("connection {0} is closed")]
    Closed(ConnectionId),

    /// Writing a frame to the peer failed.
    #[error("write to {id} failed: {source}")]
    Write {
        id: ConnectionId,
        #[source]
        source: std::io::Error,
    },

    /// Reading a frame from the peer failed.
    #[error("read from {id} failed: {source}")]
    Read {
        id: ConnectionId,
        #[source]
        source: std::io::Error,
    },
}
