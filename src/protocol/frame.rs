//! The frame value type shared by every wire version.
//!
//! A [`Frame`] is what the decoders emit and the encoders consume: opcode,
//! final flag, RSV bits, and a [`Bytes`] payload handle. Header layout,
//! masking, and length encoding live in the codec modules; this type only
//! carries the decoded form.

use bytes::Bytes;

use crate::error::Result;
use crate::protocol::opcode::OpCode;
use crate::status::CloseStatus;

/// Maximum payload size for control frames (RFC 6455 Section 5.5).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// RSV1 bit within the 3-bit RSV field.
pub const RSV1: u8 = 0b100;
/// RSV2 bit within the 3-bit RSV field.
pub const RSV2: u8 = 0b010;
/// RSV3 bit within the 3-bit RSV field.
pub const RSV3: u8 = 0b001;

/// A single WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    opcode: OpCode,
    fin: bool,
    rsv: u8,
    payload: Bytes,
}

impl Frame {
    /// Create a frame with the given opcode, payload, and final flag.
    #[must_use]
    pub fn new(opcode: OpCode, payload: Bytes, fin: bool) -> Self {
        Frame {
            opcode,
            fin,
            rsv: 0,
            payload,
        }
    }

    /// Set the RSV bits (masked to the low 3).
    #[must_use]
    pub fn with_rsv(mut self, rsv: u8) -> Self {
        self.rsv = rsv & 0x07;
        self
    }

    /// A final text frame.
    #[must_use]
    pub fn text(payload: impl Into<String>) -> Self {
        Frame::new(OpCode::Text, Bytes::from(payload.into()), true)
    }

    /// A final binary frame.
    #[must_use]
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Frame::new(OpCode::Binary, payload.into(), true)
    }

    /// A Close frame, optionally carrying a status code and reason.
    #[must_use]
    pub fn close(status: Option<CloseStatus>) -> Self {
        let body = status.map_or_else(Bytes::new, |s| s.encode());
        Frame::new(OpCode::Close, body, true)
    }

    /// A Ping frame.
    #[must_use]
    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Frame::new(OpCode::Ping, payload.into(), true)
    }

    /// A Pong frame.
    #[must_use]
    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Frame::new(OpCode::Pong, payload.into(), true)
    }

    /// The frame opcode.
    #[inline]
    #[must_use]
    pub const fn opcode(&self) -> OpCode {
        self.opcode
    }

    /// Whether the FIN bit is set.
    #[inline]
    #[must_use]
    pub const fn is_final(&self) -> bool {
        self.fin
    }

    /// The 3-bit RSV field.
    #[inline]
    #[must_use]
    pub const fn rsv(&self) -> u8 {
        self.rsv
    }

    /// The payload bytes.
    #[inline]
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Whether this is a control frame (Close/Ping/Pong).
    #[inline]
    #[must_use]
    pub const fn is_control(&self) -> bool {
        self.opcode.is_control()
    }

    /// Whether this is a data frame (Continuation/Text/Binary).
    #[inline]
    #[must_use]
    pub const fn is_data(&self) -> bool {
        self.opcode.is_data()
    }

    /// Consume the frame and keep only its payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Parse the close status out of a Close frame's body.
    ///
    /// Returns `Ok(None)` for an empty body or a non-Close frame.
    ///
    /// # Errors
    ///
    /// Propagates the violations raised by [`CloseStatus::parse`].
    pub fn close_status(&self) -> Result<Option<CloseStatus>> {
        if self.opcode != OpCode::Close {
            return Ok(None);
        }
        CloseStatus::parse(&self.payload)
    }
}
