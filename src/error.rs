//! Error types for the relay server
//!
//! Defines application-level errors and outbound delivery errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers both fatal errors (connection or listener termination) and
/// handshake failures that are reported to the client before closing.
#[derive(Debug, Error)]
pub enum AppError {
    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error on a transport (fatal to that connection)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error (fatal to that connection)
    #[error("Framing error: {0}")]
    Codec(#[from] tokio_util::codec::LinesCodecError),

    /// Accepting a new connection failed (fatal to the listener)
    #[error("Accept error: {0}")]
    Accept(std::io::Error),

    /// Outbound queue closed (writer task gone)
    #[error("Channel send error")]
    ChannelSend,

    /// No channel registered under the given name
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    /// A channel with the given name already exists
    #[error("Channel already exists: {0}")]
    ChannelExists(String),

    /// Supplied password does not match the channel's password
    #[error("Wrong password for channel: {0}")]
    WrongPassword(String),

    /// Requested member name is empty
    #[error("Member name required")]
    MissingName,

    /// Channel name or member name missing from a create request
    #[error("Channel name and member name required")]
    MissingFields,

    /// First frame was not a recognised create/join request
    #[error("Unknown action")]
    UnknownAction,

    /// Peer went away before completing the handshake
    #[error("Handshake aborted: {0}")]
    Handshake(&'static str),

    /// The server answered a handshake request with a failure
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The server sent a frame the client did not expect
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Outbound delivery errors
///
/// Occurs when a broadcast cannot hand a message to a member's writer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The member's writer task has ended
    #[error("Channel closed")]
    ChannelClosed,

    /// The member's outbound queue is at capacity
    #[error("Outbound queue full")]
    Backlogged,
}
