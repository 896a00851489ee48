//! Close status codes and close-frame bodies per RFC 6455 Section 7.4.
//!
//! A [`CloseStatus`] pairs a 16-bit code with an optional UTF-8 reason of at
//! most 123 bytes (so code + reason always fit a 125-byte control payload).
//! Well-known statuses are exposed as associated consts; the registry
//! predicates classify arbitrary codes against the RFC-reserved ranges.

use std::borrow::Cow;
use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::utf8::validate_utf8;

/// Longest permitted close reason, in bytes.
pub const MAX_REASON_LEN: usize = 123;

/// A close status: code plus human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CloseStatus {
    code: u16,
    reason: Cow<'static, str>,
}

impl CloseStatus {
    /// Normal closure (1000).
    pub const NORMAL_CLOSURE: CloseStatus = CloseStatus::well_known(1000, "Normal closure");
    /// Going away (1001): endpoint is shutting down or navigating away.
    pub const GOING_AWAY: CloseStatus = CloseStatus::well_known(1001, "Going away");
    /// Protocol error (1002): malformed frame or protocol violation.
    pub const PROTOCOL_ERROR: CloseStatus = CloseStatus::well_known(1002, "Protocol error");
    /// Invalid message type (1003): received data the endpoint cannot accept.
    pub const INVALID_MESSAGE_TYPE: CloseStatus =
        CloseStatus::well_known(1003, "Invalid message type");
    /// Invalid payload data (1007): e.g. non-UTF-8 bytes in a text message.
    pub const INVALID_PAYLOAD_DATA: CloseStatus =
        CloseStatus::well_known(1007, "Invalid payload data");
    /// Policy violation (1008).
    pub const POLICY_VIOLATION: CloseStatus = CloseStatus::well_known(1008, "Policy violation");
    /// Message too big (1009).
    pub const MESSAGE_TOO_BIG: CloseStatus = CloseStatus::well_known(1009, "Message too big");
    /// Mandatory extension (1010): client expected the server to negotiate one.
    pub const MANDATORY_EXTENSION: CloseStatus =
        CloseStatus::well_known(1010, "Mandatory extension");
    /// Internal server error (1011).
    pub const INTERNAL_SERVER_ERROR: CloseStatus =
        CloseStatus::well_known(1011, "Internal server error");
    /// Service restart (1012).
    pub const SERVICE_RESTART: CloseStatus = CloseStatus::well_known(1012, "Service restart");
    /// Try again later (1013).
    pub const TRY_AGAIN_LATER: CloseStatus = CloseStatus::well_known(1013, "Try again later");
    /// Bad gateway (1014).
    pub const BAD_GATEWAY: CloseStatus = CloseStatus::well_known(1014, "Bad gateway");

    const fn well_known(code: u16, reason: &'static str) -> Self {
        CloseStatus {
            code,
            reason: Cow::Borrowed(reason),
        }
    }

    /// Create a close status, rejecting codes outside the sendable ranges and
    /// reasons longer than [`MAX_REASON_LEN`] bytes.
    pub fn new(code: u16, reason: impl Into<Cow<'static, str>>) -> Result<Self> {
        if !Self::is_valid(code) {
            return Err(Error::protocol(format!("invalid close status code: {code}")));
        }
        let reason = reason.into();
        if reason.len() > MAX_REASON_LEN {
            return Err(Error::FrameTooLarge {
                size: reason.len(),
                max: MAX_REASON_LEN,
            });
        }
        Ok(CloseStatus { code, reason })
    }

    /// Replace the reason on a well-known status.
    pub fn with_reason(self, reason: impl Into<Cow<'static, str>>) -> Result<Self> {
        Self::new(self.code, reason)
    }

    /// The 16-bit status code.
    #[must_use]
    #[inline]
    pub const fn code(&self) -> u16 {
        self.code
    }

    /// The reason text (possibly empty).
    #[must_use]
    #[inline]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Check whether `code` may appear in a Close frame per RFC 6455 Section 7.4.1.
    ///
    /// Valid: 1000-1003, 1007-1014 (registered), 3000-4999
    /// (libraries/frameworks and applications). Everything else, including
    /// the reserved 1004/1005/1006/1015 and the 1016-2999 gap, is invalid.
    #[must_use]
    pub const fn is_valid(code: u16) -> bool {
        matches!(code, 1000..=1003 | 1007..=1014 | 3000..=4999)
    }

    /// Check whether `code` is reserved and must never be sent on the wire
    /// (1004, 1005 no-status, 1006 abnormal closure, 1015 TLS failure).
    #[must_use]
    pub const fn is_reserved(code: u16) -> bool {
        matches!(code, 1004..=1006 | 1015)
    }

    /// Parse a close-frame body.
    ///
    /// An empty body means "no status" (`Ok(None)`). A single-byte body is a
    /// violation: the status code needs two bytes. Longer bodies carry a
    /// big-endian code that must satisfy [`is_valid`](Self::is_valid),
    /// followed by an optional UTF-8 reason.
    pub fn parse(body: &[u8]) -> Result<Option<CloseStatus>> {
        if body.is_empty() {
            return Ok(None);
        }
        if body.len() == 1 {
            return Err(Error::invalid_payload("invalid close frame body"));
        }
        let code = u16::from_be_bytes([body[0], body[1]]);
        if !Self::is_valid(code) {
            return Err(Error::protocol(format!("invalid close status code: {code}")));
        }
        let reason = &body[2..];
        validate_utf8(reason)?;
        // Safe after validation; copied so the status owns its text.
        let reason = String::from_utf8_lossy(reason).into_owned();
        Ok(Some(CloseStatus {
            code,
            reason: Cow::Owned(reason),
        }))
    }

    /// Encode as a close-frame body: big-endian code, then the reason bytes.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut body = BytesMut::with_capacity(2 + self.reason.len());
        body.put_u16(self.code);
        body.put_slice(self.reason.as_bytes());
        body.freeze()
    }
}

impl Default for CloseStatus {
    fn default() -> Self {
        CloseStatus::NORMAL_CLOSURE
    }
}

impl fmt::Display for CloseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} {}", self.code, self.reason)
        }
    }
}
