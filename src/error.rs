//! Error types for the protocol engine.
//!
//! Frame-level violations carry the RFC 6455 close status they map to, so the
//! caller (or the session) can synthesize the outbound Close frame without
//! re-classifying the failure.

use thiserror::Error;

use crate::status::CloseStatus;

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during framing, handshaking, or close sequencing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Frame-level protocol violation, tagged with the close status to send.
    #[error("Protocol violation ({status}): {message}")]
    Protocol {
        /// RFC 6455 close status mapped to this violation class.
        status: CloseStatus,
        /// Human-readable detail for logging.
        message: String,
    },

    /// HTTP Upgrade handshake failure.
    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// The peer did not complete the handshake within the configured window.
    #[error("Handshake timed out")]
    HandshakeTimedOut,

    /// The peer did not answer our Close frame within the forced-close window.
    #[error("Close handshake timed out")]
    CloseTimedOut,

    /// Write attempted after a Close frame was already sent.
    #[error("Channel closed: close frame already sent")]
    ClosedChannel,

    /// Frame payload exceeds a hard limit (oversized Ping, encoder cap).
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual payload size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// I/O error from the underlying transport.
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Build a protocol violation with the given close status.
    pub fn violation(status: CloseStatus, message: impl Into<String>) -> Self {
        Error::Protocol {
            status,
            message: message.into(),
        }
    }

    /// Build a generic 1002 protocol violation.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::violation(CloseStatus::PROTOCOL_ERROR, message)
    }

    /// Build a 1007 invalid-payload violation.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::violation(CloseStatus::INVALID_PAYLOAD_DATA, message)
    }

    /// The close status attached to this error, if it is a frame-level violation.
    #[must_use]
    pub fn close_status(&self) -> Option<&CloseStatus> {
        match self {
            Error::Protocol { status, .. } => Some(status),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

/// Upgrade handshake failures, by verification step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HandshakeError {
    /// Response status line was not `101 Switching Protocols`.
    #[error("unexpected response status: {0}")]
    UnexpectedStatus(u16),

    /// A required header is absent.
    #[error("missing header: {0}")]
    MissingHeader(&'static str),

    /// `Upgrade` header present but not `websocket`.
    #[error("invalid upgrade header: {0:?}")]
    InvalidUpgrade(String),

    /// `Connection` header does not carry an `Upgrade` token.
    #[error("invalid connection header: {0:?}")]
    InvalidConnection(String),

    /// `Sec-WebSocket-Accept` did not match the expected digest.
    #[error("invalid accept key: expected {expected:?}, got {actual:?}")]
    InvalidAccept {
        /// Digest we computed from our key.
        expected: String,
        /// Digest the server returned.
        actual: String,
    },

    /// hixie-76 MD5 challenge response did not match.
    #[error("invalid challenge response")]
    InvalidChallenge,

    /// A response arrived with no request in flight.
    #[error("no handshake request in flight")]
    NoRequestInFlight,

    /// Malformed `Sec-WebSocket-Key`, `Key1`, or `Key2` value.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// `Sec-WebSocket-Version` names a version this engine does not speak.
    #[error("unsupported version: {0:?}")]
    UnsupportedVersion(String),

    /// Server selected a subprotocol the client never offered, or omitted a
    /// required one.
    #[error("invalid subprotocol: got {selected:?}, offered {offered:?}")]
    InvalidSubprotocol {
        /// What the server echoed back (empty if absent).
        selected: String,
        /// Comma-joined list the client requested.
        offered: String,
    },

    /// Handshake request used a method other than GET.
    #[error("invalid method: {0}")]
    InvalidMethod(String),

    /// Request origin is not in the configured allow-list.
    #[error("origin not allowed: {0:?}")]
    OriginNotAllowed(String),

    /// HTTP head could not be parsed.
    #[error("malformed HTTP head: {0}")]
    MalformedHead(String),

    /// A header value we were about to emit contains CR or LF.
    #[error("header {0} value contains CR or LF")]
    InvalidHeaderValue(String),

    /// HTTP head exceeded the configured size cap.
    #[error("HTTP head too large: {size} bytes (max: {max})")]
    HeadTooLarge {
        /// Observed head size.
        size: usize,
        /// Configured cap.
        max: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::FrameTooLarge {
            size: 20_000_000,
            max: 16_000_000,
        };
        assert_eq!(
            err.to_string(),
            "Frame too large: 20000000 bytes (max: 16000000)"
        );
    }

    #[test]
    fn test_violation_carries_status() {
        let err = Error::protocol("bad frame");
        assert_eq!(
            err.close_status().map(CloseStatus::code),
            Some(CloseStatus::PROTOCOL_ERROR.code())
        );

        let err = Error::invalid_payload("bytes are not UTF-8");
        assert_eq!(err.close_status().map(CloseStatus::code), Some(1007));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let ws_err: Error = io_err.into();
        assert!(matches!(ws_err, Error::Io(_)));
    }

    #[test]
    fn test_handshake_error_wraps() {
        let err: Error = HandshakeError::MissingHeader("Sec-WebSocket-Key").into();
        assert!(matches!(
            err,
            Error::Handshake(HandshakeError::MissingHeader(_))
        ));
        assert!(err.close_status().is_none());
    }

    #[test]
    fn test_error_clone_eq() {
        let err = Error::ClosedChannel;
        assert_eq!(err.clone(), err);
    }
}
