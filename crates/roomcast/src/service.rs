//! The chat service: binding connections to rooms, sending messages and
//! listing rooms. HTTP handlers are thin wrappers around this.

use std::sync::Arc;

use roomcast_dispatch::{Registry, Room, Task};
use roomcast_protocol::{
    MessageContent, Nickname, RenderedMessage, RoomName, RoomSummary,
};
use roomcast_store::RoomStore;
use roomcast_transport::Connection;
use tokio::time;
use tracing::{debug, info, warn};

use crate::RoomcastError;
use crate::bot::CommandProcessor;
use crate::config::ServiceConfig;

/// Sent after history replay so clients know the backlog is complete.
pub const CHAT_LOADED: &str = "chat loaded";

/// A connection that has joined a room.
///
/// Returned by [`ChatService::bind_room`] and consumed by
/// [`ChatService::serve_connection`].
pub struct Binding<C: Connection> {
    room: Arc<Room<C>>,
    nickname: Nickname,
    conn: Arc<C>,
}

impl<C: Connection> Binding<C> {
    pub fn room(&self) -> &Arc<Room<C>> {
        &self.room
    }

    pub fn nickname(&self) -> &Nickname {
        &self.nickname
    }

    pub fn connection(&self) -> &Arc<C> {
        &self.conn
    }
}

pub struct ChatService<C: Connection> {
    registry: Registry<C>,
    store: Arc<dyn RoomStore>,
    bot: Arc<dyn CommandProcessor>,
    config: ServiceConfig,
}

impl<C: Connection> ChatService<C> {
    pub fn new(
        registry: Registry<C>,
        bot: Arc<dyn CommandProcessor>,
        config: ServiceConfig,
    ) -> Self {
        let store = Arc::clone(registry.store());
        Self {
            registry,
            store,
            bot,
            config,
        }
    }

    pub fn registry(&self) -> &Registry<C> {
        &self.registry
    }

    /// Joins `conn` to `room` as `nickname`, creating the room on first
    /// use.
    ///
    /// A joiner of an existing room first receives the room's history,
    /// then the [`CHAT_LOADED`] marker. Live messages broadcast while the
    /// history is being replayed may arrive interleaved with it.
    pub async fn bind_room(
        &self,
        room: &RoomName,
        nickname: Nickname,
        conn: Arc<C>,
    ) -> Result<Binding<C>, RoomcastError> {
        let (handle, created) = self.registry.get_or_create(room).await?;
        handle
            .add_connection(nickname.clone(), Arc::clone(&conn))
            .await?;
        info!(%room, %nickname, created, "connection bound");

        let binding = Binding {
            room: handle,
            nickname,
            conn,
        };
        if let Err(e) = self.replay(&binding, created).await {
            binding.room.remove_connection(binding.conn.id()).await;
            return Err(e);
        }
        Ok(binding)
    }

    async fn replay(
        &self,
        binding: &Binding<C>,
        created: bool,
    ) -> Result<(), RoomcastError> {
        if !created {
            let history = self.store.history(binding.room.name()).await?;
            debug!(
                room = %binding.room.name(),
                messages = history.len(),
                "replaying history"
            );
            for message in history {
                self.write(binding, message.render().as_bytes()).await?;
            }
        }
        self.write(binding, CHAT_LOADED.as_bytes()).await
    }

    /// Sends one frame straight to a binding, bounded by the dispatch
    /// write timeout. A failed write is logged; a timed out one fails
    /// the bind.
    async fn write(
        &self,
        binding: &Binding<C>,
        frame: &[u8],
    ) -> Result<(), RoomcastError> {
        let limit = self.registry.config().write_timeout;
        match time::timeout(limit, binding.conn.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                warn!(
                    room = %binding.room.name(),
                    nickname = %binding.nickname,
                    error = %e,
                    "failed to replay to connection"
                );
                Ok(())
            }
            Err(_) => Err(RoomcastError::ConnectionSetup(format!(
                "history replay timed out after {limit:?}"
            ))),
        }
    }

    /// Reads from a bound connection until it closes, fails, or its room
    /// shuts down. Every text frame is sent to the room as a message from
    /// the binding's nickname. The connection leaves the room on return.
    pub async fn serve_connection(&self, binding: Binding<C>) {
        let room = binding.room.name().clone();
        loop {
            let frame = tokio::select! {
                biased;
                () = binding.room.cancelled() => {
                    debug!(%room, nickname = %binding.nickname, "room closed");
                    break;
                }
                frame = binding.conn.recv() => frame,
            };

            let bytes = match frame {
                Ok(Some(bytes)) => bytes,
                Ok(None) => break,
                Err(e) => {
                    debug!(
                        %room,
                        nickname = %binding.nickname,
                        error = %e,
                        "connection read failed"
                    );
                    break;
                }
            };

            let text = String::from_utf8_lossy(&bytes);
            let content = match MessageContent::try_from(text.as_ref()) {
                Ok(content) => content,
                Err(e) => {
                    debug!(%room, error = %e, "ignoring invalid message");
                    continue;
                }
            };
            if let Err(e) =
                self.send_message(&room, &binding.nickname, content).await
            {
                warn!(
                    %room,
                    nickname = %binding.nickname,
                    error = %e,
                    "message from connection failed"
                );
            }
        }

        binding.room.remove_connection(binding.conn.id()).await;
        if let Err(e) = binding.conn.close().await {
            debug!(%room, error = %e, "close after leave failed");
        }
        info!(%room, nickname = %binding.nickname, "connection left");
    }

    /// Broadcasts a message to `room`, then saves it.
    ///
    /// A command also gets a bot reply, broadcast after the message and
    /// not saved. When saving fails the broadcast has already happened
    /// and the error says so.
    pub async fn send_message(
        &self,
        room: &RoomName,
        nickname: &Nickname,
        content: MessageContent,
    ) -> Result<RenderedMessage, RoomcastError> {
        let handle = self.registry.require(room).await?;
        let message = RenderedMessage::now(
            room.clone(),
            nickname.as_str(),
            content.as_str(),
        );

        let targets = if self.config.echo_to_sender {
            handle.targets().await
        } else {
            handle.targets_except(nickname).await
        };
        handle
            .broadcast(Task::user_message(message.clone(), targets))
            .await?;

        if content.is_command(self.config.command_prefix) {
            self.reply_to_command(&handle, content.as_str()).await;
        }

        self.store.append_message(&message).await.map_err(|source| {
            RoomcastError::Persistence {
                room: room.clone(),
                source,
            }
        })?;
        debug!(%room, %nickname, "message sent");
        Ok(message)
    }

    /// Asks the bot and broadcasts its reply. Failures are logged and
    /// only drop the reply.
    async fn reply_to_command(&self, room: &Room<C>, command: &str) {
        let reply = match self.bot.process(room.name(), command).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(room = %room.name(), command, error = %e, "bot failed");
                return;
            }
        };
        let targets = room.targets().await;
        let task = Task::bot_reply(command, reply, targets);
        if let Err(e) = room.broadcast(task).await {
            warn!(room = %room.name(), command, error = %e, "bot reply not sent");
        }
    }

    /// Every room with its user count, busiest first, ties by name.
    ///
    /// Rooms that exist only in the store are listed with 0 users.
    pub async fn list_rooms(&self) -> Result<Vec<RoomSummary>, RoomcastError> {
        let mut summaries = Vec::new();
        for room in self.registry.rooms().await {
            summaries.push(RoomSummary {
                room: room.name().clone(),
                users: room.connection_count().await,
            });
        }
        for record in self.store.list_rooms().await? {
            if !summaries.iter().any(|s| s.room == record.room) {
                summaries.push(RoomSummary {
                    room: record.room,
                    users: 0,
                });
            }
        }
        summaries
            .sort_by(|a, b| b.users.cmp(&a.users).then_with(|| a.room.cmp(&b.room)));
        Ok(summaries)
    }

    /// Stops every room worker. New binds fail from now on.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use roomcast_dispatch::DispatchConfig;
    use roomcast_protocol::BOT_SENDER;
    use roomcast_store::MemoryStore;
    use roomcast_transport::{ConnectionId, TransportError};

    use super::*;
    use crate::bot::BotError;

    /// Records frames, or never finishes a send when `hang` is set.
    struct TestConn {
        id: ConnectionId,
        frames: Mutex<Vec<String>>,
        hang: bool,
    }

    impl TestConn {
        fn new(hang: bool) -> Arc<Self> {
            Arc::new(Self {
                id: ConnectionId::next(),
                frames: Mutex::new(Vec::new()),
                hang,
            })
        }

        fn frames(&self) -> Vec<String> {
            self.frames.lock().unwrap().clone()
        }
    }

    impl Connection for TestConn {
        type Error = TransportError;

        async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            let text = String::from_utf8_lossy(data).into_owned();
            self.frames.lock().unwrap().push(text);
            Ok(())
        }

        async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
            Ok(None)
        }

        async fn close(&self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn id(&self) -> ConnectionId {
            self.id
        }
    }

    /// Shuts the room down while answering, so its reply cannot be
    /// broadcast.
    #[derive(Default)]
    struct ClosingBot {
        room: Mutex<Option<Arc<Room<TestConn>>>>,
    }

    #[async_trait]
    impl CommandProcessor for ClosingBot {
        async fn process(
            &self,
            room: &RoomName,
            command: &str,
        ) -> Result<RenderedMessage, BotError> {
            if let Some(handle) = self.room.lock().unwrap().as_ref() {
                handle.shutdown();
            }
            Ok(RenderedMessage::now(room.clone(), BOT_SENDER, command))
        }
    }

    fn service(
        store: Arc<MemoryStore>,
        bot: Arc<dyn CommandProcessor>,
    ) -> ChatService<TestConn> {
        let config = DispatchConfig {
            write_timeout: Duration::from_millis(100),
            ..DispatchConfig::default()
        };
        let registry = Registry::new(store, config);
        ChatService::new(registry, bot, ServiceConfig::default())
    }

    fn room() -> RoomName {
        RoomName::try_from("r1").unwrap()
    }

    fn nick(name: &str) -> Nickname {
        Nickname::try_from(name).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_bind_fails_when_client_never_reads() {
        let service = service(
            Arc::new(MemoryStore::new()),
            Arc::new(ClosingBot::default()),
        );

        let result = service
            .bind_room(&room(), nick("carol"), TestConn::new(true))
            .await;

        assert!(matches!(result, Err(RoomcastError::ConnectionSetup(_))));
        let handle = service.registry().require(&room()).await.unwrap();
        assert!(!handle.has_nickname(&nick("carol")).await);
    }

    #[tokio::test]
    async fn test_bind_sends_marker_to_new_room() {
        let service = service(
            Arc::new(MemoryStore::new()),
            Arc::new(ClosingBot::default()),
        );
        let alice = TestConn::new(false);

        service
            .bind_room(&room(), nick("alice"), Arc::clone(&alice))
            .await
            .unwrap();

        assert_eq!(alice.frames(), vec![CHAT_LOADED.to_string()]);
    }

    #[tokio::test]
    async fn test_unsent_bot_reply_still_saves_message() {
        let store = Arc::new(MemoryStore::new());
        let bot = Arc::new(ClosingBot::default());
        let service = service(Arc::clone(&store), bot.clone());
        let binding = service
            .bind_room(&room(), nick("alice"), TestConn::new(false))
            .await
            .unwrap();
        *bot.room.lock().unwrap() = Some(Arc::clone(binding.room()));

        let content = MessageContent::try_from("/help").unwrap();
        let sent = service
            .send_message(&room(), &nick("alice"), content)
            .await
            .unwrap();

        assert!(binding.room().is_closed());
        let history = store.history(&room()).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].render(), sent.render());
    }
}
