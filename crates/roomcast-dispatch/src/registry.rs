//! Registry: the one place rooms are created, looked up and torn down.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use roomcast_protocol::RoomName;
use roomcast_store::{RoomStore, StoreError};
use roomcast_transport::Connection;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::room::{Room, spawn_room};
use crate::{DispatchConfig, DispatchError};

/// Owns every live room.
///
/// The map lock is held only for the lookup-or-insert; room-level
/// operations take the room's own lock. The two are never nested.
///
/// Each room's worker runs with a child of the registry's root
/// cancellation token, so [`shutdown`](Self::shutdown) stops all of them
/// and [`remove`](Self::remove) stops one.
pub struct Registry<C: Connection> {
    rooms: Mutex<HashMap<RoomName, Arc<Room<C>>>>,
    store: Arc<dyn RoomStore>,
    config: Arc<DispatchConfig>,
    shutdown: CancellationToken,
    active_workers: Arc<AtomicUsize>,
}

impl<C: Connection> Registry<C> {
    /// Creates an empty registry. `config` is validated first.
    pub fn new(store: Arc<dyn RoomStore>, config: DispatchConfig) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            store,
            config: Arc::new(config.validated()),
            shutdown: CancellationToken::new(),
            active_workers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the room called `name`, creating it and starting its
    /// worker on first use. The flag is `true` when this call created it.
    ///
    /// A created room is registered with the store. If that fails the
    /// error is returned but the room stays in memory; the next call for
    /// the same name retries the registration and never starts a second
    /// worker.
    pub async fn get_or_create(
        &self,
        name: &RoomName,
    ) -> Result<(Arc<Room<C>>, bool), DispatchError> {
        let (room, created) = {
            let mut rooms = self.rooms.lock().await;
            if self.shutdown.is_cancelled() {
                return Err(DispatchError::ShuttingDown);
            }
            match rooms.get(name) {
                Some(room) => (Arc::clone(room), false),
                None => {
                    let room = spawn_room(
                        name.clone(),
                        &self.config,
                        self.shutdown.child_token(),
                        Arc::clone(&self.active_workers),
                    );
                    rooms.insert(name.clone(), Arc::clone(&room));
                    tracing::info!(room = %name, "room created");
                    (room, true)
                }
            }
        };

        if !room.is_registered() {
            self.register(&room).await?;
        }
        Ok((room, created))
    }

    async fn register(&self, room: &Room<C>) -> Result<(), DispatchError> {
        match self.store.create_room(room.name()).await {
            Ok(()) | Err(StoreError::RoomExists(_)) => {
                room.mark_registered();
                Ok(())
            }
            Err(source) => {
                tracing::warn!(
                    room = %room.name(),
                    error = %source,
                    "failed to register room"
                );
                Err(DispatchError::Persistence {
                    room: room.name().clone(),
                    source,
                })
            }
        }
    }

    pub async fn get(&self, name: &RoomName) -> Option<Arc<Room<C>>> {
        self.rooms.lock().await.get(name).cloned()
    }

    /// Like [`get`](Self::get), but a missing room is an error.
    pub async fn require(
        &self,
        name: &RoomName,
    ) -> Result<Arc<Room<C>>, DispatchError> {
        self.get(name)
            .await
            .ok_or_else(|| DispatchError::RoomNotFound(name.clone()))
    }

    /// A snapshot of every live room.
    pub async fn rooms(&self) -> Vec<Arc<Room<C>>> {
        self.rooms.lock().await.values().cloned().collect()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Removes a room and stops its worker. Its members are not closed.
    pub async fn remove(&self, name: &RoomName) -> Option<Arc<Room<C>>> {
        let room = self.rooms.lock().await.remove(name)?;
        room.shutdown();
        tracing::info!(room = %name, "room removed");
        Some(room)
    }

    /// Stops every worker. Later calls to
    /// [`get_or_create`](Self::get_or_create) fail with
    /// [`DispatchError::ShuttingDown`].
    pub async fn shutdown(&self) {
        let rooms = self.rooms.lock().await;
        if self.shutdown.is_cancelled() {
            return;
        }
        tracing::info!(rooms = rooms.len(), "shutting down room registry");
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Number of room workers still running.
    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RoomStore> {
        &self.store
    }
}
