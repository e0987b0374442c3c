//! Retry scheduling for Roomcast room workers.
//!
//! Two pieces:
//!
//! - [`Backoff`]: exponential delay with a cap and random jitter.
//! - [`RetryQueue`]: a small delay queue keyed by next-attempt time.
//!
//! A failed delivery is never pushed back into the live task channel.
//! It is parked in the worker's `RetryQueue` until its backoff elapses,
//! so it cannot block tasks queued behind it.
//!
//! # Integration
//!
//! The queue is designed to sit inside a worker's `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         biased;
//!         () = cancel.cancelled() => break,
//!         task = retries.next_due() => execute(task).await,
//!         Some(task) = rx.recv() => execute(task).await,
//!     }
//! }
//! ```

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::warn;

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Exponential backoff with a ceiling and additive jitter.
///
/// The delay before retry number `attempt` (1-based) is
/// `min(base * 2^(attempt - 1), max)` plus a uniform sample from
/// `0..jitter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay before the first retry, before jitter.
    pub base: Duration,
    /// Upper bound on the exponential part.
    pub max: Duration,
    /// Upper bound (exclusive) on the random extra delay.
    /// Spreads retries of targets that failed together.
    pub jitter: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(250),
            max: Duration::from_secs(4),
            jitter: Duration::from_secs(1),
        }
    }
}

impl Backoff {
    /// Doubling stops after this many steps; `max` applies long before.
    const MAX_SHIFT: u32 = 16;

    /// A fixed delay with no growth and no jitter.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base: delay,
            max: delay,
            jitter: Duration::ZERO,
        }
    }

    /// Returns a copy with a different jitter bound.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Fix any out-of-range values so the policy is safe to use.
    ///
    /// `max` is raised to `base` when it is smaller.
    pub fn validated(mut self) -> Self {
        if self.max < self.base {
            warn!(
                base_ms = self.base.as_millis() as u64,
                max_ms = self.max.as_millis() as u64,
                "backoff max below base, raising it"
            );
            self.max = self.base;
        }
        self
    }

    /// The delay for `attempt` without jitter. Attempt 0 is treated as 1.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(Self::MAX_SHIFT);
        self.base.saturating_mul(1 << shift).min(self.max)
    }

    /// The delay for `attempt`, including a fresh jitter sample.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay(attempt) + sample_jitter(self.jitter)
    }
}

fn sample_jitter(bound: Duration) -> Duration {
    let micros = u64::try_from(bound.as_micros()).unwrap_or(u64::MAX);
    if micros == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros(rand::rng().random_range(0..micros))
}

// ---------------------------------------------------------------------------
// RetryQueue
// ---------------------------------------------------------------------------

struct Entry<T> {
    due: Instant,
    seq: u64,
    item: T,
}

// BinaryHeap is a max-heap; invert so the earliest (due, seq) is on top.
impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

/// Items waiting for their next attempt, ordered by due time.
///
/// Entries with the same due time come out in insertion order.
pub struct RetryQueue<T> {
    heap: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

impl<T> RetryQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Schedules `item` to become due after `delay`. Returns the deadline.
    pub fn push(&mut self, item: T, delay: Duration) -> Instant {
        let due = Instant::now() + delay;
        self.push_at(item, due);
        due
    }

    /// Schedules `item` to become due at `due`.
    pub fn push_at(&mut self, item: T, due: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { due, seq, item });
    }

    /// Waits until the earliest entry is due and removes it.
    ///
    /// Pends forever while the queue is empty, so `select!` keeps
    /// serving its other branches. Cancel-safe: an entry is only
    /// removed after its deadline has passed, in the same poll that
    /// returns it.
    pub async fn next_due(&mut self) -> T {
        loop {
            let Some(due) = self.next_deadline() else {
                std::future::pending::<()>().await;
                continue;
            };
            time::sleep_until(due).await;
            if let Some(entry) = self.heap.pop() {
                return entry.item;
            }
        }
    }

    /// Deadline of the earliest entry, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.due)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Removes every entry, earliest first.
    pub fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.heap.len());
        while let Some(entry) = self.heap.pop() {
            items.push(entry.item);
        }
        items
    }
}

impl<T> Default for RetryQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
