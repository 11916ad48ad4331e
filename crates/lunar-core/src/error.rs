//! Unified error types for the Lunar core.
//!
//! Registry and configuration errors live next to the components that raise
//! them (`lunar-framework` and `lunar-runtime`).

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors raised while establishing or driving a transport link.
///
/// These are transient: the session reacts to them with backoff and retry.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// A single connection attempt failed.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The endpoint that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// Initial connection gave up after the configured number of attempts.
    #[error("gave up connecting to {url} after {attempts} attempt(s): {reason}")]
    RetriesExhausted {
        /// The endpoint that could not be reached.
        url: String,
        /// Number of attempts made.
        attempts: u32,
        /// Reason reported by the last attempt.
        reason: String,
    },

    /// The link was closed, by the peer or by an explicit close.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// A frame could not be written to the link.
    #[error("failed to send frame: {0}")]
    SendFailed(String),

    /// Invalid transport configuration.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// API Errors
// =============================================================================

/// Error type for outbound API calls.
///
/// Callers of an awaiting send always observe one of: a result, [`Timeout`],
/// or [`ConnectionClosed`]. They never hang past the configured deadline.
///
/// [`Timeout`]: ApiError::Timeout
/// [`ConnectionClosed`]: ApiError::ConnectionClosed
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The session has no live link to send on.
    #[error("bot is not connected")]
    NotConnected,
    /// The session was torn down while the call was pending.
    #[error("connection closed before a response arrived")]
    ConnectionClosed,
    /// No response arrived within the deadline.
    #[error("API call timed out")]
    Timeout,
    /// The peer answered with a failure status.
    #[error("API error ({retcode}): {message}")]
    Server { retcode: i64, message: String },
    /// Failed to serialize a request or interpret a response.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The event carries no user or group to answer to.
    #[error("event has no session to reply to")]
    MissingSession,
    /// Transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Decode Errors
// =============================================================================

/// A malformed inbound frame. Logged and dropped by the reader loop.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// The frame is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(String),
    /// The frame is valid JSON but not an object.
    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type for frame decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;
