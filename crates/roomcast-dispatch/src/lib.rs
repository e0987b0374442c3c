//! Room dispatch for Roomcast.
//!
//! Every room has one worker task that delivers messages to the room's
//! connections. Callers hand the worker a [`Task`] through
//! [`Room::broadcast`]; the worker fans it out, retries failed targets
//! from a delay queue and gives up after the configured number of
//! attempts.
//!
//! # Key types
//!
//! - [`Registry`]: creates rooms on first use and owns shutdown
//! - [`Room`]: members plus the handle to its worker
//! - [`Task`]: a tagged delivery, [`UserMessageDelivery`] or [`BotReplyDelivery`]
//! - [`DispatchConfig`]: execution limit, timeouts, fan-out cap, backoff
//!
//! Delivery failures never reach the caller of `broadcast`. They are
//! logged, counted in [`DeliveryMetrics`] and retried.

mod config;
mod error;
mod metrics;
mod registry;
mod room;
mod task;
mod worker;

pub use config::{DispatchConfig, RetryScope};
pub use error::{DeliveryError, DispatchError};
pub use metrics::DeliveryMetrics;
pub use registry::Registry;
pub use room::Room;
pub use task::{
    BotReplyDelivery, Target, Task, TaskKind, TaskState, UserMessageDelivery,
};
