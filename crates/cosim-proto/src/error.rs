//! Protocol error types.

use thiserror::Error;

/// Errors from framing or decoding protocol text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtoError {
    /// The peer sent more than `max` bytes without a separator.
    #[error("unterminated message of {len} bytes exceeds limit of {max}")]
    MessageTooLarge {
        /// Bytes buffered when the limit was hit.
        len: usize,
        /// The limit.
        max: usize,
    },

    /// An outbound line without a valid `@<time>:` tag.
    #[error("malformed envelope: {0:?}")]
    MalformedEnvelope(String),

    /// An outbound body outside the grammar.
    #[error("unknown outbound message: {0:?}")]
    UnknownOutbound(String),

    /// A port announcement line that does not carry a port.
    #[error("malformed port announcement: {0:?}")]
    MalformedAnnouncement(String),
}
