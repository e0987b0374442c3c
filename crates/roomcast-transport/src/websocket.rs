//! WebSocket connection adapter over an upgraded axum socket.

use std::io;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;

use crate::{Connection, ConnectionId, TransportError};

/// A single bound WebSocket client.
///
/// The socket is split so the write half and the read half sit behind
/// separate locks. The room worker can push frames while the bind
/// handler is parked in [`Connection::recv`].
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WebSocket, Message>>,
    stream: Mutex<SplitStream<WebSocket>>,
}

impl WebSocketConnection {
    /// Wraps an upgraded socket and assigns it a fresh [`ConnectionId`].
    pub fn new(socket: WebSocket) -> Self {
        let (sink, stream) = socket.split();
        let id = ConnectionId::next();
        tracing::debug!(%id, "websocket connection bound");
        Self {
            id,
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }

    fn write_error(&self, e: axum::Error) -> TransportError {
        TransportError::Write {
            id: self.id,
            source: io::Error::new(io::ErrorKind::BrokenPipe, e),
        }
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    /// Sends UTF-8 payloads as text frames and anything else as binary.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let frame = match std::str::from_utf8(data) {
            Ok(text) => Message::Text(text.to_owned().into()),
            Err(_) => Message::Binary(data.to_vec().into()),
        };
        self.sink
            .lock()
            .await
            .send(frame)
            .await
            .map_err(|e| self.write_error(e))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_str().as_bytes().to_vec()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong
                Some(Err(e)) => {
                    return Err(TransportError::Read {
                        id: self.id,
                        source: io::Error::new(
                            io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    });
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.sink
            .lock()
            .await
            .close()
            .await
            .map_err(|e| self.write_error(e))
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
