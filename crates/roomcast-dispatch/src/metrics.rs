//! Per-room delivery counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by a room's worker.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    attempts: AtomicU64,
    delivered: AtomicU64,
    retried: AtomicU64,
    abandoned: AtomicU64,
}

impl Counters {
    pub(crate) fn attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> DeliveryMetrics {
        DeliveryMetrics {
            attempts: self.attempts.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of a room's delivery counters.
///
/// With [`RetryScope::FailedTargets`](crate::RetryScope::FailedTargets)
/// a task that fails for several targets is split, so `retried` and
/// `abandoned` count retry entries rather than original tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryMetrics {
    /// Delivery attempts started, including retries.
    pub attempts: u64,
    /// Tasks whose targets all received the payload.
    pub delivered: u64,
    /// Entries parked in the retry queue.
    pub retried: u64,
    /// Tasks dropped after the execution limit or on shutdown.
    pub abandoned: u64,
}
