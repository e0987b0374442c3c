//! # Roomcast
//!
//! Multi-room chat server. Clients bind to a room over a WebSocket, send
//! messages over the socket or plain HTTP, and every message is fanned
//! out to the room's connections by that room's own worker. Commands
//! starting with `/` are answered by a bot.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roomcast::prelude::*;
//!
//! # async fn start() -> Result<(), RoomcastError> {
//! let server = RoomcastServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```
//!
//! ## Routes
//!
//! - `GET /api/v1/health`
//! - `GET /api/v1/rooms`
//! - `GET /api/v1/rooms/{room}/bind?nickname=N` (WebSocket)
//! - `GET /api/v1/rooms/{room}/{nickname}/send?content=C`

pub mod bot;
pub mod config;
mod error;
mod handler;
pub mod logging;
mod server;
pub mod service;

pub use error::RoomcastError;
pub use handler::AppState;
pub use server::{RoomcastServer, RoomcastServerBuilder, router};

/// Everything needed to run or embed a server.
pub mod prelude {
    pub use crate::bot::{
        BotError, CommandProcessor, HELP_MENU, QuoteSource, StockBot,
        StooqQuotes,
    };
    pub use crate::config::{ServerConfig, ServiceConfig};
    pub use crate::service::{Binding, CHAT_LOADED, ChatService};
    pub use crate::{RoomcastError, RoomcastServer, RoomcastServerBuilder};
    pub use roomcast_dispatch::{
        DispatchConfig, DispatchError, Registry, RetryScope,
    };
    pub use roomcast_protocol::{
        MessageContent, Nickname, RenderedMessage, RoomName, RoomSummary,
    };
    pub use roomcast_store::{MemoryStore, RoomStore};
}
