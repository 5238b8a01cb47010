//! Error types for the SMTP client.

use std::io;

use thiserror::Error;

/// Errors raised while talking to the server.
///
/// These never reach the caller directly; the transmission task folds them
/// into a [`DeliveryFailure`].
#[derive(Error, Debug)]
pub enum ClientError {
    /// IO error occurred during network operations.
    #[error("{0}")]
    Io(#[from] io::Error),

    /// TLS/SSL error occurred.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// The server sent something that is not an SMTP reply.
    #[error("Failed to parse SMTP response: {0}")]
    ParseError(String),

    /// Connection was closed unexpectedly.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,
}

/// Specialized `Result` type for SMTP client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Why a transmission did not deliver its message.
///
/// The `Display` text of each variant is the reason reported to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// No server host was configured; nothing was attempted.
    #[error("SMTP server not configured")]
    NotConfigured,

    /// The message lacks an envelope address.
    #[error("Invalid message: {0}")]
    InvalidMessage(&'static str),

    /// The watchdog expired before the message was accepted.
    #[error("Connection timeout")]
    Timeout,

    /// The transport failed: connect, read, write or TLS handshake.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server greeting was not `220`.
    #[error("Server rejected connection")]
    Rejected { reply: String },

    /// The server answered a command with an unexpected reply.
    #[error("Failed to send email: {0}")]
    Refused(String),
}

impl From<ClientError> for DeliveryFailure {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::ParseError(_) => Self::Refused(err.to_string()),
            ClientError::Io(_) | ClientError::TlsError(_) | ClientError::ConnectionClosed => {
                Self::Connection(err.to_string())
            }
        }
    }
}

/// `send_email` was refused outright; no completion will be reported for it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// Another transmission is still in flight on this client.
    #[error("SMTP client busy: a transmission is already in progress")]
    Busy,
}
