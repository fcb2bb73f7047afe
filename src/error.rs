//! Error types for the Showdown client.

use thiserror::Error;

/// Errors that can occur when using the Showdown client.
#[derive(Debug, Error)]
pub enum ShowdownError {
    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to decode a JSON payload carried inside a frame.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an open connection.
    #[error("not connected to server")]
    NotConnected,

    /// The login exchange was rejected or returned an unusable answer.
    ///
    /// The connection that produced this error is closed and must not be reused.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A team description could not be parsed or validated.
    ///
    /// The roster is left untouched when this is returned.
    #[error("malformed team: {0}")]
    RosterFormat(String),

    /// The format is registered as not requiring a team and cannot be given one.
    #[error("format {format} does not accept a team")]
    NoTeamFormat {
        /// The format whose sentinel entry would have been overwritten.
        format: String,
    },

    /// A decision policy was asked to choose from an empty set of options.
    #[error("no legal choice to pick from")]
    InvalidChoice,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for Showdown client operations.
pub type Result<T> = std::result::Result<T, ShowdownError>;
