//! Unified error type for the Roomcast server.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use roomcast_dispatch::DispatchError;
use roomcast_protocol::{ProtocolError, RoomName};
use roomcast_store::StoreError;
use roomcast_transport::TransportError;
use serde_json::json;

use crate::bot::BotError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum RoomcastError {
    /// A room, nickname or delivery error from the dispatch engine.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// A store error outside room registration (history, listing).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A connection error (send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Invalid room name, nickname or message content.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The message was broadcast but could not be saved to history.
    #[error("message broadcast in room {room} but not saved: {source}")]
    Persistence {
        room: RoomName,
        #[source]
        source: StoreError,
    },

    /// The bot could not be set up.
    #[error(transparent)]
    Bot(#[from] BotError),

    /// The client's connection could not be set up for the room.
    #[error("connection setup failed: {0}")]
    ConnectionSetup(String),

    /// Binding the listener or serving failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RoomcastError {
    /// The HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Dispatch(DispatchError::RoomNotFound(_))
            | Self::Store(StoreError::RoomNotFound(_)) => StatusCode::NOT_FOUND,
            Self::Dispatch(DispatchError::NicknameTaken { .. }) => {
                StatusCode::CONFLICT
            }
            Self::Protocol(_) | Self::ConnectionSetup(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Dispatch(
                DispatchError::RoomClosed(_) | DispatchError::ShuttingDown,
            ) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Dispatch(DispatchError::Persistence { .. })
            | Self::Persistence { .. }
            | Self::Store(_)
            | Self::Transport(_)
            | Self::Bot(_)
            | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RoomcastError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, %status, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomcast_protocol::Nickname;

    fn room() -> RoomName {
        RoomName::try_from("r1").unwrap()
    }

    #[test]
    fn test_from_dispatch_error() {
        let err: RoomcastError = DispatchError::RoomNotFound(room()).into();
        assert!(matches!(err, RoomcastError::Dispatch(_)));
        assert!(err.to_string().contains("r1"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: RoomcastError = RoomName::try_from("").unwrap_err().into();
        assert!(matches!(err, RoomcastError::Protocol(_)));
    }

    #[test]
    fn test_status_mapping() {
        let not_found: RoomcastError =
            DispatchError::RoomNotFound(room()).into();
        let taken: RoomcastError = DispatchError::NicknameTaken {
            room: room(),
            nickname: Nickname::try_from("alice").unwrap(),
        }
        .into();
        let closed: RoomcastError = DispatchError::RoomClosed(room()).into();
        let persistence = RoomcastError::Persistence {
            room: room(),
            source: StoreError::Unavailable("down".into()),
        };

        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(taken.status(), StatusCode::CONFLICT);
        assert_eq!(closed.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(persistence.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            RoomcastError::ConnectionSetup("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
