//! A chat room: its members and the handle to its worker.
//!
//! The member list is the only shared mutable state in a room and it is
//! guarded by the room's own lock. Deliveries never touch it; a task
//! carries a snapshot of the targets taken when it was created.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use roomcast_protocol::{Nickname, RoomName};
use roomcast_transport::{Connection, ConnectionId};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::metrics::{Counters, DeliveryMetrics};
use crate::task::{Target, Task};
use crate::worker::Worker;
use crate::{DispatchConfig, DispatchError};

/// A running room.
///
/// Rooms are created by the [`Registry`](crate::Registry) and shared as
/// `Arc<Room<C>>`. Each one owns exactly one worker task.
pub struct Room<C: Connection> {
    name: RoomName,
    members: Mutex<Vec<Target<C>>>,
    tasks: mpsc::Sender<Task<C>>,
    cancel: CancellationToken,
    counters: Arc<Counters>,
    registered: AtomicBool,
}

impl<C: Connection> Room<C> {
    pub fn name(&self) -> &RoomName {
        &self.name
    }

    /// Adds a member. The nickname check and the insert happen under one
    /// lock, so two binds racing for the same nickname cannot both win.
    pub async fn add_connection(
        &self,
        nickname: Nickname,
        conn: Arc<C>,
    ) -> Result<(), DispatchError> {
        let mut members = self.members.lock().await;
        if members.iter().any(|m| m.nickname() == &nickname) {
            return Err(DispatchError::NicknameTaken {
                room: self.name.clone(),
                nickname,
            });
        }
        tracing::info!(
            room = %self.name,
            %nickname,
            connection = %conn.id(),
            members = members.len() + 1,
            "connection added"
        );
        members.push(Target::new(nickname, conn));
        Ok(())
    }

    /// Removes the member using `id`. Returns `false` if it was not here.
    pub async fn remove_connection(&self, id: ConnectionId) -> bool {
        let mut members = self.members.lock().await;
        let Some(pos) = members.iter().position(|m| m.id() == id) else {
            return false;
        };
        let removed = members.remove(pos);
        tracing::info!(
            room = %self.name,
            nickname = %removed.nickname(),
            connection = %id,
            members = members.len(),
            "connection removed"
        );
        true
    }

    pub async fn has_nickname(&self, nickname: &Nickname) -> bool {
        self.members
            .lock()
            .await
            .iter()
            .any(|m| m.nickname() == nickname)
    }

    pub async fn connection_count(&self) -> usize {
        self.members.lock().await.len()
    }

    /// Member nicknames in join order.
    pub async fn nicknames(&self) -> Vec<Nickname> {
        self.members
            .lock()
            .await
            .iter()
            .map(|m| m.nickname().clone())
            .collect()
    }

    /// A snapshot of every member, for building a task.
    pub async fn targets(&self) -> Vec<Target<C>> {
        self.members.lock().await.clone()
    }

    /// A snapshot of every member except `nickname`.
    pub async fn targets_except(&self, nickname: &Nickname) -> Vec<Target<C>> {
        self.members
            .lock()
            .await
            .iter()
            .filter(|m| m.nickname() != nickname)
            .cloned()
            .collect()
    }

    /// Hands a task to the room's worker.
    ///
    /// Waits while the worker's queue is full. Fails with
    /// [`DispatchError::RoomClosed`] once the room has been shut down,
    /// including while waiting.
    pub async fn broadcast(&self, task: Task<C>) -> Result<(), DispatchError> {
        if self.cancel.is_cancelled() {
            return Err(DispatchError::RoomClosed(self.name.clone()));
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                Err(DispatchError::RoomClosed(self.name.clone()))
            }
            sent = self.tasks.send(task) => {
                sent.map_err(|_| DispatchError::RoomClosed(self.name.clone()))
            }
        }
    }

    /// Stops this room's worker. Pending retries are dropped.
    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!(room = %self.name, "room shutting down");
            self.cancel.cancel();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the room has been shut down.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn metrics(&self) -> DeliveryMetrics {
        self.counters.snapshot()
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    pub(crate) fn mark_registered(&self) {
        self.registered.store(true, Ordering::Release);
    }
}

impl<C: Connection> fmt::Debug for Room<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("name", &self.name)
            .field("closed", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Creates a room and spawns its worker.
pub(crate) fn spawn_room<C: Connection>(
    name: RoomName,
    config: &Arc<DispatchConfig>,
    cancel: CancellationToken,
    active_workers: Arc<AtomicUsize>,
) -> Arc<Room<C>> {
    let (tasks, receiver) = mpsc::channel(config.queue_capacity);
    let counters = Arc::new(Counters::default());

    let worker = Worker::new(
        name.clone(),
        receiver,
        Arc::clone(config),
        cancel.clone(),
        Arc::clone(&counters),
        active_workers,
    );
    worker.start();
    tokio::spawn(worker.run());

    Arc::new(Room {
        name,
        members: Mutex::new(Vec::new()),
        tasks,
        cancel,
        counters,
        registered: AtomicBool::new(false),
    })
}
