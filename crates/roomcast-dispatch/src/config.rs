//! Dispatch configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use roomcast_retry::Backoff;
use tokio::sync::Semaphore;
use tracing::warn;

// ---------------------------------------------------------------------------
// RetryScope
// ---------------------------------------------------------------------------

/// Which targets a failed delivery is retried against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryScope {
    /// Retry only the targets whose write failed. Each failed target is
    /// rescheduled on its own, with its own jittered delay, so targets
    /// that already received the message never get a duplicate.
    #[default]
    FailedTargets,

    /// Retry the whole target set. Targets that succeeded on an earlier
    /// attempt receive the message again.
    AllTargets,
}

impl FromStr for RetryScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "failed" | "failed_targets" => Ok(Self::FailedTargets),
            "all" | "all_targets" => Ok(Self::AllTargets),
            other => Err(format!(
                "unknown retry scope {other:?} (expected \"failed\" or \"all\")"
            )),
        }
    }
}

impl fmt::Display for RetryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailedTargets => write!(f, "failed"),
            Self::AllTargets => write!(f, "all"),
        }
    }
}

// ---------------------------------------------------------------------------
// DispatchConfig
// ---------------------------------------------------------------------------

/// Settings shared by every room worker in a registry.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum delivery attempts before a task is abandoned.
    pub execution_limit: u32,

    /// Capacity of each room's task queue. `broadcast` waits while the
    /// queue is full. The default of 1 keeps the handoff close to
    /// synchronous.
    pub queue_capacity: usize,

    /// Cap on simultaneous connection writes within one task.
    pub max_concurrent_writes: usize,

    /// Deadline for a single connection write.
    pub write_timeout: Duration,

    /// Delay policy between attempts.
    pub backoff: Backoff,

    pub retry_scope: RetryScope,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            execution_limit: Self::DEFAULT_EXECUTION_LIMIT,
            queue_capacity: 1,
            max_concurrent_writes: 16,
            write_timeout: Duration::from_secs(5),
            backoff: Backoff::default(),
            retry_scope: RetryScope::default(),
        }
    }
}

impl DispatchConfig {
    pub const DEFAULT_EXECUTION_LIMIT: u32 = 2;

    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Called by [`Registry::new`](crate::Registry::new). Rules:
    /// - `execution_limit`, `queue_capacity` and `max_concurrent_writes`
    ///   are at least 1.
    /// - `queue_capacity` and `max_concurrent_writes` are at most
    ///   [`Semaphore::MAX_PERMITS`].
    /// - A zero `write_timeout` falls back to the default.
    /// - `backoff` is validated.
    pub fn validated(mut self) -> Self {
        if self.execution_limit == 0 {
            warn!("execution_limit of 0 would never deliver, using 1");
            self.execution_limit = 1;
        }
        if self.queue_capacity == 0 {
            warn!("queue_capacity must be at least 1, using 1");
            self.queue_capacity = 1;
        } else if self.queue_capacity > Semaphore::MAX_PERMITS {
            warn!(
                requested = self.queue_capacity,
                max = Semaphore::MAX_PERMITS,
                "queue_capacity too large, using max"
            );
            self.queue_capacity = Semaphore::MAX_PERMITS;
        }
        if self.max_concurrent_writes == 0 {
            warn!("max_concurrent_writes must be at least 1, using 1");
            self.max_concurrent_writes = 1;
        } else if self.max_concurrent_writes > Semaphore::MAX_PERMITS {
            warn!(
                requested = self.max_concurrent_writes,
                max = Semaphore::MAX_PERMITS,
                "max_concurrent_writes too large, using max"
            );
            self.max_concurrent_writes = Semaphore::MAX_PERMITS;
        }
        if self.write_timeout.is_zero() {
            let fallback = Self::default().write_timeout;
            warn!(
                fallback_ms = fallback.as_millis() as u64,
                "write_timeout of 0 would fail every write, using default"
            );
            self.write_timeout = fallback;
        }
        self.backoff = self.backoff.validated();
        self
    }
}
