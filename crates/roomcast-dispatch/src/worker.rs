//! The per-room worker: a single consumer of the room's task queue.
//!
//! The worker owns everything it mutates (the receiver, the retry
//! queue, the tasks themselves), so nothing in here needs a lock. The
//! outside world only sees the room's channel sender and its
//! cancellation token.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::future::join_all;
use roomcast_protocol::RoomName;
use roomcast_retry::RetryQueue;
use roomcast_transport::Connection;
use tokio::sync::{Semaphore, mpsc};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::Counters;
use crate::task::{Target, Task, TaskState};
use crate::{DeliveryError, DispatchConfig, RetryScope};

pub(crate) struct Worker<C: Connection> {
    room: RoomName,
    receiver: mpsc::Receiver<Task<C>>,
    retries: RetryQueue<Task<C>>,
    config: Arc<DispatchConfig>,
    cancel: CancellationToken,
    counters: Arc<Counters>,
    writes: Semaphore,
    active: Arc<AtomicUsize>,
}

impl<C: Connection> Worker<C> {
    pub(crate) fn new(
        room: RoomName,
        receiver: mpsc::Receiver<Task<C>>,
        config: Arc<DispatchConfig>,
        cancel: CancellationToken,
        counters: Arc<Counters>,
        active: Arc<AtomicUsize>,
    ) -> Self {
        let writes = Semaphore::new(config.max_concurrent_writes);
        Self {
            room,
            receiver,
            retries: RetryQueue::new(),
            config,
            cancel,
            counters,
            writes,
            active,
        }
    }

    /// Counts the worker as active. Called before the worker is spawned;
    /// [`run`](Self::run) gives the count back when it exits.
    pub(crate) fn start(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    /// Runs until the room is cancelled or every sender is dropped.
    ///
    /// Due retries win over new tasks; cancellation wins over both.
    pub(crate) async fn run(mut self) {
        info!(room = %self.room, "room worker started");

        loop {
            let task = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    debug!(room = %self.room, "room worker cancelled");
                    break;
                }
                task = self.retries.next_due() => task,
                received = self.receiver.recv() => match received {
                    Some(task) => task,
                    None => {
                        debug!(room = %self.room, "task queue closed");
                        break;
                    }
                },
            };
            self.execute(task).await;
        }

        // Nothing queued behind the loop will ever run.
        self.receiver.close();
        let mut dropped = self.retries.drain();
        while let Ok(task) = self.receiver.try_recv() {
            dropped.push(task);
        }
        for mut task in dropped {
            self.abandon(&mut task, "room worker stopped");
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        info!(room = %self.room, "room worker stopped");
    }

    /// One delivery attempt, followed by the retry decision.
    async fn execute(&mut self, mut task: Task<C>) {
        task.transition(TaskState::Executing);
        self.counters.attempt();
        debug!(
            room = %self.room,
            task = task.id(),
            kind = %task.kind(),
            attempt = task.attempts() + 1,
            targets = task.targets().len(),
            "delivering task"
        );

        let failed = match self.fan_out(&task).await {
            Ok(failed) => failed,
            Err(err) => {
                self.abandon(&mut task, &err.to_string());
                return;
            }
        };

        if failed.is_empty() {
            task.transition(TaskState::Delivered);
            self.counters.delivered();
            debug!(room = %self.room, task = task.id(), "task delivered");
            return;
        }

        let attempts = task.record_failure();
        if attempts >= self.config.execution_limit {
            self.abandon(&mut task, "execution limit reached");
            return;
        }

        task.transition(TaskState::Retrying);
        match self.config.retry_scope {
            RetryScope::AllTargets => self.schedule(task),
            RetryScope::FailedTargets => {
                for target in failed {
                    let narrowed = task.narrowed(vec![target]);
                    self.schedule(narrowed);
                }
            }
        }
    }

    /// Writes the task's payload to every target, a bounded number at a
    /// time. Returns the targets whose write failed.
    async fn fan_out(
        &self,
        task: &Task<C>,
    ) -> Result<Vec<Target<C>>, DeliveryError> {
        let frame = task.payload().render();
        let writes = task
            .targets()
            .iter()
            .map(|target| self.write(target, frame.as_bytes()));

        let results = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(DeliveryError::Cancelled),
            results = join_all(writes) => results,
        };

        let mut failed = Vec::new();
        for (target, result) in task.targets().iter().zip(results) {
            if let Err(err) = result {
                warn!(
                    room = %self.room,
                    task = task.id(),
                    nickname = %target.nickname(),
                    error = %err,
                    "delivery to target failed"
                );
                failed.push(target.clone());
            }
        }
        Ok(failed)
    }

    async fn write(
        &self,
        target: &Target<C>,
        frame: &[u8],
    ) -> Result<(), DeliveryError> {
        let _permit = self
            .writes
            .acquire()
            .await
            .map_err(|_| DeliveryError::Cancelled)?;

        let connection = target.id();
        let after = self.config.write_timeout;
        match time::timeout(after, target.connection().send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(DeliveryError::Transport {
                connection,
                reason: err.to_string(),
            }),
            Err(_) => Err(DeliveryError::Timeout { connection, after }),
        }
    }

    fn schedule(&mut self, task: Task<C>) {
        let delay = self.config.backoff.delay_for(task.attempts());
        debug!(
            room = %self.room,
            task = task.id(),
            attempt = task.attempts(),
            delay_ms = delay.as_millis() as u64,
            targets = task.targets().len(),
            "scheduling retry"
        );
        self.counters.retried();
        self.retries.push(task, delay);
    }

    fn abandon(&self, task: &mut Task<C>, reason: &str) {
        task.transition(TaskState::Abandoned);
        self.counters.abandoned();
        warn!(
            room = %self.room,
            task = task.id(),
            kind = %task.kind(),
            attempts = task.attempts(),
            reason,
            "task abandoned"
        );
    }
}
