//! Integration tests for the WebSocket connection adapter.
//!
//! Each test serves a one-route axum app on an ephemeral port and
//! talks to it with a plain tokio-tungstenite client.

#[cfg(feature = "websocket")]
mod websocket {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::extract::ws::WebSocketUpgrade;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use futures_util::{SinkExt, StreamExt};
    use roomcast_transport::{Connection, WebSocketConnection};
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    /// Serves `app` on 127.0.0.1 with an OS-assigned port.
    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = listener.local_addr().expect("local addr").to_string();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        addr
    }

    async fn connect(addr: &str) -> ClientWs {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .expect("client should connect");
        ws
    }

    /// Echoes every frame back through the adapter.
    async fn echo(ws: WebSocketUpgrade) -> impl IntoResponse {
        ws.on_upgrade(|socket| async move {
            let conn = WebSocketConnection::new(socket);
            while let Ok(Some(data)) = conn.recv().await {
                if conn.send(&data).await.is_err() {
                    break;
                }
            }
        })
    }

    #[tokio::test]
    async fn test_websocket_text_round_trip_uses_text_frames() {
        let addr = serve(Router::new().route("/ws", get(echo))).await;
        let mut client = connect(&addr).await;

        client.send(Message::Text("hello".into())).await.unwrap();

        let reply = client.next().await.unwrap().unwrap();
        assert!(reply.is_text(), "utf-8 payloads go out as text");
        assert_eq!(reply.into_text().unwrap().as_str(), "hello");
    }

    #[tokio::test]
    async fn test_websocket_non_utf8_payload_uses_binary_frames() {
        let addr = serve(Router::new().route("/ws", get(echo))).await;
        let mut client = connect(&addr).await;

        client
            .send(Message::Binary(vec![0xff, 0xfe, 0x00].into()))
            .await
            .unwrap();

        let reply = client.next().await.unwrap().unwrap();
        assert!(reply.is_binary());
        assert_eq!(reply.into_data().as_ref(), &[0xff, 0xfe, 0x00]);
    }

    #[tokio::test]
    async fn test_websocket_recv_returns_none_on_client_close() {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let app = Router::new().route(
            "/ws",
            get(move |ws: WebSocketUpgrade| {
                let done_tx = done_tx.clone();
                async move {
                    ws.on_upgrade(move |socket| async move {
                        let conn = WebSocketConnection::new(socket);
                        let result = conn.recv().await;
                        let _ = done_tx.send(matches!(result, Ok(None)));
                    })
                }
            }),
        );
        let addr = serve(app).await;
        let mut client = connect(&addr).await;

        client.send(Message::Close(None)).await.unwrap();

        let clean = tokio::time::timeout(Duration::from_secs(2), done_rx.recv())
            .await
            .expect("handler should finish")
            .expect("handler should report");
        assert!(clean, "recv should return Ok(None) on close");
    }

    #[tokio::test]
    async fn test_websocket_send_while_recv_is_parked() {
        let app = Router::new().route(
            "/ws",
            get(|ws: WebSocketUpgrade| async move {
                ws.on_upgrade(|socket| async move {
                    let conn = Arc::new(WebSocketConnection::new(socket));
                    let reader = Arc::clone(&conn);
                    let parked = tokio::spawn(async move { reader.recv().await });

                    // Give the reader time to take the stream lock.
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    let _ = conn.send(b"pushed while reading").await;
                    let _ = parked.await;
                })
            }),
        );
        let addr = serve(app).await;
        let mut client = connect(&addr).await;

        let msg = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("push should not be blocked by the reader")
            .unwrap()
            .unwrap();
        assert_eq!(msg.into_text().unwrap().as_str(), "pushed while reading");
    }
}
