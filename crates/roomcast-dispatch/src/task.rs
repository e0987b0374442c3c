//! Delivery tasks: what a room worker executes.
//!
//! A [`Task`] is a tagged variant over the concrete delivery kinds. Each
//! variant carries its rendered payload, the snapshot of targets taken
//! when it was created, and its own retry state. Nothing about a task is
//! shared or mutated outside the worker that owns it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use roomcast_protocol::{Nickname, RenderedMessage};
use roomcast_transport::{Connection, ConnectionId};

/// Counter for generating task IDs (used in logs).
static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// A room member as seen by a task: a nickname and its connection.
///
/// Cheap to clone; the connection is shared.
pub struct Target<C> {
    nickname: Nickname,
    conn: Arc<C>,
}

impl<C: Connection> Target<C> {
    pub fn new(nickname: Nickname, conn: Arc<C>) -> Self {
        Self { nickname, conn }
    }

    pub fn nickname(&self) -> &Nickname {
        &self.nickname
    }

    pub fn connection(&self) -> &Arc<C> {
        &self.conn
    }

    pub fn id(&self) -> ConnectionId {
        self.conn.id()
    }
}

impl<C> Clone for Target<C> {
    fn clone(&self) -> Self {
        Self {
            nickname: self.nickname.clone(),
            conn: Arc::clone(&self.conn),
        }
    }
}

impl<C> fmt::Debug for Target<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("nickname", &self.nickname)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// TaskState
// ---------------------------------------------------------------------------

/// The lifecycle of a task.
///
/// ```text
/// Pending → Executing → Delivered
///               │  ↑
///               ↓  │
///            Retrying
///               │
///               ↓ (limit reached)
///           Abandoned
/// ```
///
/// `Delivered` and `Abandoned` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Executing,
    Retrying,
    Delivered,
    Abandoned,
}

impl TaskState {
    /// Returns `true` for `Delivered` and `Abandoned`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Abandoned)
    }

    /// Returns `true` if moving from `self` to `target` is allowed.
    pub fn can_transition_to(self, target: Self) -> bool {
        use TaskState::*;
        matches!(
            (self, target),
            (Pending, Executing)
                | (Pending, Abandoned)
                | (Executing, Delivered)
                | (Executing, Retrying)
                | (Executing, Abandoned)
                | (Retrying, Executing)
                | (Retrying, Abandoned)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Executing => write!(f, "executing"),
            Self::Retrying => write!(f, "retrying"),
            Self::Delivered => write!(f, "delivered"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

// ---------------------------------------------------------------------------
// Retry state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct RetryState {
    id: u64,
    attempts: u32,
    state: TaskState,
}

impl RetryState {
    fn fresh() -> Self {
        Self {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            attempts: 0,
            state: TaskState::Pending,
        }
    }
}

// ---------------------------------------------------------------------------
// Delivery kinds
// ---------------------------------------------------------------------------

/// A message a participant sent to the room.
pub struct UserMessageDelivery<C> {
    pub message: RenderedMessage,
    targets: Vec<Target<C>>,
    retry: RetryState,
}

/// The bot's answer to a command sent in the room.
pub struct BotReplyDelivery<C> {
    /// The command text that produced this reply.
    pub command: String,
    pub reply: RenderedMessage,
    targets: Vec<Target<C>>,
    retry: RetryState,
}

/// Which kind of delivery a task is, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    UserMessage,
    BotReply,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserMessage => write!(f, "user_message"),
            Self::BotReply => write!(f, "bot_reply"),
        }
    }
}

/// One unit of work for a room worker.
pub enum Task<C> {
    UserMessage(UserMessageDelivery<C>),
    BotReply(BotReplyDelivery<C>),
}

impl<C: Connection> Task<C> {
    /// A participant's message, addressed to `targets`.
    pub fn user_message(
        message: RenderedMessage,
        targets: Vec<Target<C>>,
    ) -> Self {
        Self::UserMessage(UserMessageDelivery {
            message,
            targets,
            retry: RetryState::fresh(),
        })
    }

    /// A bot reply to `command`, addressed to `targets`.
    pub fn bot_reply(
        command: impl Into<String>,
        reply: RenderedMessage,
        targets: Vec<Target<C>>,
    ) -> Self {
        Self::BotReply(BotReplyDelivery {
            command: command.into(),
            reply,
            targets,
            retry: RetryState::fresh(),
        })
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            Self::UserMessage(_) => TaskKind::UserMessage,
            Self::BotReply(_) => TaskKind::BotReply,
        }
    }

    /// The message every target receives.
    pub fn payload(&self) -> &RenderedMessage {
        match self {
            Self::UserMessage(d) => &d.message,
            Self::BotReply(d) => &d.reply,
        }
    }

    /// The targets captured when the task was created.
    ///
    /// Connections that join the room later are not included.
    pub fn targets(&self) -> &[Target<C>] {
        match self {
            Self::UserMessage(d) => &d.targets,
            Self::BotReply(d) => &d.targets,
        }
    }

    pub fn id(&self) -> u64 {
        self.retry().id
    }

    /// Failed attempts so far.
    pub fn attempts(&self) -> u32 {
        self.retry().attempts
    }

    pub fn state(&self) -> TaskState {
        self.retry().state
    }

    fn retry(&self) -> &RetryState {
        match self {
            Self::UserMessage(d) => &d.retry,
            Self::BotReply(d) => &d.retry,
        }
    }

    fn retry_mut(&mut self) -> &mut RetryState {
        match self {
            Self::UserMessage(d) => &mut d.retry,
            Self::BotReply(d) => &mut d.retry,
        }
    }

    /// Moves the task to `next`. Invalid transitions are ignored and
    /// logged; the state machine never moves backwards out of a
    /// terminal state.
    pub(crate) fn transition(&mut self, next: TaskState) {
        let retry = self.retry_mut();
        if retry.state.can_transition_to(next) {
            retry.state = next;
        } else {
            tracing::warn!(
                task = retry.id,
                from = %retry.state,
                to = %next,
                "ignoring invalid task transition"
            );
        }
    }

    /// Counts a failed attempt and returns the new total.
    pub(crate) fn record_failure(&mut self) -> u32 {
        let retry = self.retry_mut();
        retry.attempts += 1;
        retry.attempts
    }

    /// A copy of this task narrowed to `targets`, keeping its id and
    /// retry state.
    pub(crate) fn narrowed(&self, targets: Vec<Target<C>>) -> Self {
        match self {
            Self::UserMessage(d) => Self::UserMessage(UserMessageDelivery {
                message: d.message.clone(),
                targets,
                retry: d.retry,
            }),
            Self::BotReply(d) => Self::BotReply(BotReplyDelivery {
                command: d.command.clone(),
                reply: d.reply.clone(),
                targets,
                retry: d.retry,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomcast_protocol::RoomName;
    use roomcast_transport::TransportError;

    struct NullConn(ConnectionId);

    impl Connection for NullConn {
        type Error = TransportError;

        async fn send(&self, _data: &[u8]) -> Result<(), Self::Error> {
            Ok(())
        }

        async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
            Ok(None)
        }

        async fn close(&self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn id(&self) -> ConnectionId {
            self.0
        }
    }

    fn target(nick: &str, id: u64) -> Target<NullConn> {
        Target::new(
            Nickname::try_from(nick).unwrap(),
            Arc::new(NullConn(ConnectionId::new(id))),
        )
    }

    fn message() -> RenderedMessage {
        RenderedMessage::now(RoomName::try_from("r1").unwrap(), "alice", "hi")
    }

    #[test]
    fn test_new_task_is_pending_with_zero_attempts() {
        let task = Task::user_message(message(), vec![target("bob", 1)]);
        assert_eq!(task.state(), TaskState::Pending);
        assert_eq!(task.attempts(), 0);
        assert_eq!(task.kind(), TaskKind::UserMessage);
    }

    #[test]
    fn test_task_ids_are_unique() {
        let a = Task::<NullConn>::user_message(message(), vec![]);
        let b = Task::<NullConn>::user_message(message(), vec![]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_bot_reply_exposes_reply_as_payload() {
        let reply = RenderedMessage::now(
            RoomName::try_from("r1").unwrap(),
            roomcast_protocol::BOT_SENDER,
            "help text",
        );
        let task: Task<NullConn> = Task::bot_reply("/help", reply, vec![]);
        assert_eq!(task.kind(), TaskKind::BotReply);
        assert_eq!(task.payload().sender(), "BOT");
        match task {
            Task::BotReply(d) => assert_eq!(d.command, "/help"),
            Task::UserMessage(_) => panic!("expected bot reply"),
        }
    }

    #[test]
    fn test_transition_follows_state_machine() {
        let mut task = Task::user_message(message(), vec![target("bob", 1)]);
        task.transition(TaskState::Executing);
        task.transition(TaskState::Retrying);
        task.transition(TaskState::Executing);
        task.transition(TaskState::Delivered);
        assert_eq!(task.state(), TaskState::Delivered);

        // Terminal: nothing moves it back.
        task.transition(TaskState::Executing);
        assert_eq!(task.state(), TaskState::Delivered);
    }

    #[test]
    fn test_state_terminal_flags() {
        assert!(TaskState::Delivered.is_terminal());
        assert!(TaskState::Abandoned.is_terminal());
        assert!(!TaskState::Retrying.is_terminal());
        assert!(!TaskState::Pending.can_transition_to(TaskState::Delivered));
    }

    #[test]
    fn test_record_failure_is_monotonic() {
        let mut task = Task::<NullConn>::user_message(message(), vec![]);
        assert_eq!(task.record_failure(), 1);
        assert_eq!(task.record_failure(), 2);
        assert_eq!(task.attempts(), 2);
    }

    #[test]
    fn test_narrowed_keeps_id_and_attempts() {
        let mut task = Task::user_message(
            message(),
            vec![target("bob", 1), target("carol", 2)],
        );
        task.record_failure();

        let narrowed = task.narrowed(vec![target("carol", 2)]);
        assert_eq!(narrowed.id(), task.id());
        assert_eq!(narrowed.attempts(), 1);
        assert_eq!(narrowed.targets().len(), 1);
        assert_eq!(narrowed.targets()[0].nickname().as_str(), "carol");
    }
}
