//! Error types for streamchat
//!
//! A single `Error` enum covers every failure the client can observe, from
//! transport trouble to frames the backend should never have sent. Each
//! variant belongs to one [`ErrorClass`], which decides how the client
//! reacts:
//!
//! - **Transport**: handshake failures, socket errors. Retried with backoff.
//! - **Protocol**: frames that fail strict decoding. Surfaced, connection kept.
//! - **Backend**: `status: error` frames. Surfaced, possibly downgraded.
//! - **Terminal**: automatic reconnection gave up. Needs a manual reconnect.
//! - **Usage**: the caller asked for something the current state forbids.
//!
//! # Examples
//!
//! ```rust
//! use streamchat_core::{Error, ErrorClass};
//!
//! let error = Error::MissingChunkPayload { request_id: "r1".into() };
//! assert_eq!(error.class(), ErrorClass::Protocol);
//! assert!(!error.is_transient());
//! ```

use thiserror::Error;

/// Result type for streamchat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Application-level error type for streamchat operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Frame is not valid JSON, not an object, or lacks a required field
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// A `chunk` status frame arrived without its `chunk` object
    #[error("Chunk status missing chunk data. Request ID: {request_id}")]
    MissingChunkPayload {
        /// Request the frame claimed to belong to
        request_id: String,
    },

    /// A `status` or `chunk.type` value this client does not understand
    #[error("Unknown {field} value: {value}")]
    UnknownFrameVariant {
        /// Field that carried the unexpected value (`status`, `chunk.type`, `action`)
        field: String,
        /// The offending value, verbatim
        value: String,
    },

    /// Serialization of an outbound request failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// WebSocket transport error (handshake, read or write)
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The backend closed the connection
    #[error("Connection closed")]
    ConnectionClosed,

    /// An outbound request was attempted while not connected
    #[error("Cannot send - not connected")]
    NotConnected,

    /// No backend endpoint is configured
    #[error("No backend endpoint configured")]
    NoEndpoint,

    /// Endpoint configuration failed validation
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The backend reported an error for a request
    #[error("{message}")]
    Backend {
        /// Request the error belongs to
        request_id: String,
        /// Message reported by the backend
        message: String,
    },

    /// Automatic reconnection exhausted its attempts
    #[error("Connection failed - max retries exceeded ({attempts} attempts)")]
    MaxRetriesExceeded {
        /// Consecutive failures observed before giving up
        attempts: u32,
    },

    /// Input/output error (worker thread, runtime construction)
    #[error("IO error: {0}")]
    Io(String),

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

/// How an error should be handled, following the client's failure policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Network-level, expected to heal on retry
    Transport,
    /// The backend sent something the codec rejects
    Protocol,
    /// The backend reported a failure
    Backend,
    /// Retries are exhausted
    Terminal,
    /// Misuse of the client API or configuration
    Usage,
}

impl ErrorClass {
    /// Short label used for logs and metric attributes
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transport => "transport",
            ErrorClass::Protocol => "protocol",
            ErrorClass::Backend => "backend",
            ErrorClass::Terminal => "terminal",
            ErrorClass::Usage => "usage",
        }
    }
}

impl Error {
    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::WebSocket(_) | Error::ConnectionClosed | Error::Io(_) => ErrorClass::Transport,
            Error::MalformedFrame(_)
            | Error::MissingChunkPayload { .. }
            | Error::UnknownFrameVariant { .. } => ErrorClass::Protocol,
            Error::Backend { .. } => ErrorClass::Backend,
            Error::MaxRetriesExceeded { .. } => ErrorClass::Terminal,
            Error::Serialization(_)
            | Error::NotConnected
            | Error::NoEndpoint
            | Error::InvalidEndpoint(_)
            | Error::Internal(_) => ErrorClass::Usage,
        }
    }

    /// Whether local retry is expected to resolve this error
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transport
    }

    pub(crate) fn unknown_variant(field: &str, value: impl Into<String>) -> Self {
        Error::UnknownFrameVariant {
            field: field.to_string(),
            value: value.into(),
        }
    }
}
