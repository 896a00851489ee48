//! Codec for the pre-standard hixie-76 / hybi-00 framing.
//!
//! Two frame shapes only: a type byte with the high bit set introduces a
//! length-prefixed binary frame (length in big-endian 7-bit groups, high bit
//! as continuation), and a type byte with the high bit clear introduces a
//! 0xFF-terminated UTF-8 text frame. The `0xFF 0x00` sequence, a zero-length
//! frame of the high-bit type, is the closing signal. There is no masking and
//! no fragmentation.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::encoder::Encoded;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::protocol::{Frame, OpCode};
use crate::status::CloseStatus;

/// Longest permitted length prefix, in bytes. 8 groups of 7 bits already
/// cover any 56-bit length; more is a malicious peer.
const MAX_LENGTH_FIELD_BYTES: usize = 8;

/// Decoder for hybi-00 frames.
///
/// Input is peeked, not consumed, until a whole frame is buffered, so a call
/// that returns `Ok(None)` leaves the buffer exactly as it found it.
pub struct FrameDecoder00 {
    max_payload_len: usize,
    /// Set after the closing signal or a violation; everything after is
    /// dropped unparsed.
    discarding: bool,
}

impl FrameDecoder00 {
    /// Create a decoder honoring the size limit in `config`.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        FrameDecoder00 {
            max_payload_len: config.max_frame_payload_len,
            discarding: false,
        }
    }

    /// Whether the decoder has stopped parsing for good.
    #[must_use]
    #[inline]
    pub const fn is_discarding(&self) -> bool {
        self.discarding
    }

    /// Decode at most one frame out of `src`.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if self.discarding {
            src.clear();
            return Ok(None);
        }
        if src.is_empty() {
            return Ok(None);
        }
        if src[0] & 0x80 != 0 {
            self.decode_binary(src)
        } else {
            self.decode_text(src)
        }
    }

    fn decode_binary(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        let frame_type = src[0];
        let mut len: u64 = 0;
        let mut idx = 1;
        loop {
            if idx >= src.len() {
                return Ok(None);
            }
            let b = src[idx];
            len = (len << 7) | u64::from(b & 0x7F);
            if len > self.max_payload_len as u64 {
                let max = self.max_payload_len;
                return Err(self.corrupt(Error::violation(
                    CloseStatus::MESSAGE_TOO_BIG,
                    format!("max frame length of {max} has been exceeded"),
                )));
            }
            idx += 1;
            if idx - 1 > MAX_LENGTH_FIELD_BYTES {
                return Err(self.corrupt(Error::violation(
                    CloseStatus::MESSAGE_TOO_BIG,
                    "length field longer than 8 bytes",
                )));
            }
            if b & 0x80 == 0 {
                break;
            }
        }

        if frame_type == 0xFF && len == 0 {
            src.advance(idx);
            self.discarding = true;
            return Ok(Some(Frame::close(None)));
        }

        let len = len as usize;
        if src.len() < idx + len {
            return Ok(None);
        }
        src.advance(idx);
        let payload = src.split_to(len).freeze();
        Ok(Some(Frame::binary(payload)))
    }

    fn decode_text(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        // src[0] is the type byte; the payload runs to the 0xFF terminator.
        let Some(pos) = src[1..].iter().position(|&b| b == 0xFF) else {
            if src.len() - 1 > self.max_payload_len {
                let max = self.max_payload_len;
                return Err(self.corrupt(Error::violation(
                    CloseStatus::MESSAGE_TOO_BIG,
                    format!("max frame length of {max} has been exceeded"),
                )));
            }
            return Ok(None);
        };
        if pos > self.max_payload_len {
            let max = self.max_payload_len;
            return Err(self.corrupt(Error::violation(
                CloseStatus::MESSAGE_TOO_BIG,
                format!("max frame length of {max} has been exceeded"),
            )));
        }

        src.advance(1);
        let payload = src.split_to(pos).freeze();
        src.advance(1);
        Ok(Some(Frame::new(OpCode::Text, payload, true)))
    }

    fn corrupt(&mut self, err: Error) -> Error {
        self.discarding = true;
        err
    }
}

/// Encoder for hybi-00 frames.
///
/// Text frames use the 0x00/0xFF sentinel form, Close frames the `0xFF 0x00`
/// closing signal, and everything else the length-prefixed binary form.
#[derive(Debug, Default)]
pub struct FrameEncoder00;

impl FrameEncoder00 {
    #[must_use]
    pub fn new() -> Self {
        FrameEncoder00
    }

    /// Serialize one frame.
    pub fn encode(&mut self, frame: &Frame) -> Result<Encoded> {
        match frame.opcode() {
            OpCode::Text => {
                let mut buf = BytesMut::with_capacity(frame.len() + 2);
                buf.put_u8(0x00);
                buf.put_slice(frame.payload());
                buf.put_u8(0xFF);
                Ok(Encoded::Single(buf.freeze()))
            }
            OpCode::Close => Ok(Encoded::Single(Bytes::from_static(&[0xFF, 0x00]))),
            _ => {
                let mut buf = BytesMut::with_capacity(frame.len() + 1 + MAX_LENGTH_FIELD_BYTES);
                buf.put_u8(0x80);
                put_length(&mut buf, frame.len());
                buf.put_slice(frame.payload());
                Ok(Encoded::Single(buf.freeze()))
            }
        }
    }
}

/// Write `len` as big-endian 7-bit groups, continuation bit on all but the
/// last group.
fn put_length(buf: &mut BytesMut, len: usize) {
    let mut groups = 1;
    while len >> (7 * groups) != 0 {
        groups += 1;
    }
    for i in (0..groups).rev() {
        let septet = ((len >> (7 * i)) & 0x7F) as u8;
        if i == 0 {
            buf.put_u8(septet);
        } else {
            buf.put_u8(septet | 0x80);
        }
    }
}
