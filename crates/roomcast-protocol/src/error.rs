//! Error types for the protocol layer.
//!
//! Every value that enters the system from a request (room names,
//! nicknames, message bodies) is validated once, at the edge. A
//! `ProtocolError` always means the caller sent bad input, never that
//! the server misbehaved.

/// Validation failures for incoming chat values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The value was empty or only whitespace.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// The value was longer than the field allows.
    #[error("{field} cannot exceed {max} characters (got {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    /// The value contained a character that would break routing.
    ///
    /// Room names and nicknames become URL path segments, so `/` is
    /// rejected.
    #[error("{field} cannot contain {ch:?}")]
    InvalidChar { field: &'static str, ch: char },
}
