//! Error types for the IRC protocol crate.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Errors raised by the line codec.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A line exceeded the configured maximum length.
    #[error("message too long: {actual} bytes (limit {limit})")]
    MessageTooLong {
        /// Length of the offending line (or partial line) in bytes.
        actual: usize,
        /// The configured limit.
        limit: usize,
    },

    /// An outbound line contained CR or LF.
    #[error("outbound line contains a line break")]
    EmbeddedLineBreak,
}

/// Errors raised while parsing a single message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum MessageParseError {
    /// The line was empty (after trimming the line terminator).
    #[error("empty message")]
    EmptyMessage,

    /// The line had a prefix or tags but no command.
    #[error("missing command in {0:?}")]
    MissingCommand(String),

    /// The command token contained characters that are not letters or digits.
    #[error("invalid command {0:?}")]
    InvalidCommand(String),
}
