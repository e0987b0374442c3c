//! Server configuration, read once from the environment at startup.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use roomcast_dispatch::{DispatchConfig, RetryScope};
use tracing::warn;

/// Behavior of the chat service on top of the dispatch engine.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Whether a sender receives their own message back.
    pub echo_to_sender: bool,

    /// Messages starting with this character go to the bot as well.
    pub command_prefix: char,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            echo_to_sender: true,
            command_prefix: '/',
        }
    }
}

/// Everything needed to start a server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub dispatch: DispatchConfig,
    pub service: ServiceConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            dispatch: DispatchConfig::default(),
            service: ServiceConfig::default(),
        }
    }
}

impl ServerConfig {
    pub const BIND_ADDR: &'static str = "ROOMCAST_BIND_ADDR";
    pub const EXECUTION_LIMIT: &'static str = "RETRY_EXECUTION_LIMIT";
    pub const WRITE_TIMEOUT_MS: &'static str = "ROOMCAST_WRITE_TIMEOUT_MS";
    pub const MAX_CONCURRENT_WRITES: &'static str =
        "ROOMCAST_MAX_CONCURRENT_WRITES";
    pub const RETRY_SCOPE: &'static str = "ROOMCAST_RETRY_SCOPE";
    pub const ECHO_SENDER: &'static str = "ROOMCAST_ECHO_SENDER";

    /// Reads the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from `lookup`, falling back to defaults.
    ///
    /// Values that do not parse are logged and ignored. The result is
    /// validated.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = parsed::<SocketAddr>(&lookup, Self::BIND_ADDR) {
            config.bind_addr = addr;
        }
        if let Some(limit) = parsed::<i64>(&lookup, Self::EXECUTION_LIMIT) {
            config.dispatch.execution_limit =
                u32::try_from(limit.max(0)).unwrap_or(u32::MAX);
        }
        if let Some(ms) = parsed::<u64>(&lookup, Self::WRITE_TIMEOUT_MS) {
            config.dispatch.write_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parsed::<usize>(&lookup, Self::MAX_CONCURRENT_WRITES)
        {
            config.dispatch.max_concurrent_writes = n;
        }
        if let Some(scope) = parsed::<RetryScope>(&lookup, Self::RETRY_SCOPE) {
            config.dispatch.retry_scope = scope;
        }
        if let Some(echo) = parsed::<bool>(&lookup, Self::ECHO_SENDER) {
            config.service.echo_to_sender = echo;
        }

        config.validated()
    }

    /// Clamp and fix any out-of-range values. See
    /// [`DispatchConfig::validated`].
    pub fn validated(mut self) -> Self {
        self.dispatch = self.dispatch.validated();
        self
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "ignoring invalid setting");
            None
        }
    }
}
