//! Chat protocol values for Roomcast.
//!
//! - **Types** ([`RoomName`], [`Nickname`], [`MessageContent`]): validated
//!   inputs taken from requests.
//! - **[`RenderedMessage`]**: the immutable chat line that is broadcast,
//!   persisted and replayed.
//! - **[`RoomSummary`]**: one row of the room listing.
//! - **Errors** ([`ProtocolError`]): input validation failures.
//!
//! The protocol crate knows nothing about connections or rooms at
//! runtime. It only defines what a message looks like.

mod error;
mod types;

pub use error::ProtocolError;
pub use types::{
    BOT_SENDER, MAX_CONTENT_LEN, MAX_NAME_LEN, MessageContent, Nickname,
    RenderedMessage, RoomName, RoomSummary,
};
