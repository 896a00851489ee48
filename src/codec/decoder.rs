//! Incremental frame decoder for wire versions 07, 08, and 13.
//!
//! The decoder is a resumable state machine over a caller-owned byte buffer.
//! Each [`FrameDecoder::decode`] call consumes as many complete fields as the
//! buffer holds and returns `Ok(None)` when it runs dry mid-frame. A field is
//! only consumed once all of its bytes are buffered, so a suspended call never
//! leaves a partially read length or masking key behind.
//!
//! Header validation happens as soon as the second header byte arrives, before
//! any payload is buffered. A violation puts the decoder into the terminal
//! [`DecoderState::Corrupt`] state: the error is surfaced once, and every
//! later call discards its input and reports that no frame is available.

use bytes::{Buf, BytesMut};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::protocol::{Frame, OpCode, apply_mask};
use crate::status::CloseStatus;

/// Decoder progress through a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Waiting for the FIN/RSV/opcode byte.
    ReadingFirst,
    /// Waiting for the mask-bit/short-length byte.
    ReadingSecond,
    /// Waiting for the extended 16- or 64-bit length field.
    ReadingSize,
    /// Waiting for the 4-byte masking key.
    MaskingKey,
    /// Waiting for the payload bytes.
    Payload,
    /// A protocol violation was detected; all further input is discarded.
    Corrupt,
}

/// Stateful decoder turning raw bytes into [`Frame`] values.
pub struct FrameDecoder {
    state: DecoderState,
    fin: bool,
    rsv: u8,
    opcode_raw: u8,
    opcode: OpCode,
    masked: bool,
    len7: u8,
    payload_len: usize,
    mask: [u8; 4],
    /// Non-final data frames seen since the last final data frame.
    fragments: u32,
    received_close: bool,
    expect_masked_frames: bool,
    allow_mask_mismatch: bool,
    allow_extensions: bool,
    max_payload_len: usize,
}

impl FrameDecoder {
    /// Create a decoder honoring the masking, extension, and size limits in
    /// `config`.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        FrameDecoder {
            state: DecoderState::ReadingFirst,
            fin: false,
            rsv: 0,
            opcode_raw: 0,
            opcode: OpCode::Continuation,
            masked: false,
            len7: 0,
            payload_len: 0,
            mask: [0; 4],
            fragments: 0,
            received_close: false,
            expect_masked_frames: config.expect_masked_frames,
            allow_mask_mismatch: config.allow_mask_mismatch,
            allow_extensions: config.allow_extensions,
            max_payload_len: config.max_frame_payload_len,
        }
    }

    /// Current position in the per-frame state machine.
    #[must_use]
    #[inline]
    pub const fn state(&self) -> DecoderState {
        self.state
    }

    /// Whether the decoder hit a violation and stopped parsing.
    #[must_use]
    #[inline]
    pub const fn is_corrupt(&self) -> bool {
        matches!(self.state, DecoderState::Corrupt)
    }

    /// Decode at most one frame out of `src`.
    ///
    /// Returns `Ok(None)` when more input is needed. On a protocol violation
    /// the error carries the close status to answer with, and the decoder
    /// stops parsing for good.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        // A Close frame ends the inbound stream. Anything the peer sends
        // after it is dropped unparsed.
        if self.received_close {
            src.clear();
            return Ok(None);
        }

        loop {
            match self.state {
                DecoderState::ReadingFirst => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let b = src.get_u8();
                    self.fin = b & 0x80 != 0;
                    self.rsv = (b & 0x70) >> 4;
                    self.opcode_raw = b & 0x0F;
                    self.state = DecoderState::ReadingSecond;
                }
                DecoderState::ReadingSecond => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let b = src.get_u8();
                    self.masked = b & 0x80 != 0;
                    self.len7 = b & 0x7F;
                    self.validate_header()?;
                    self.state = DecoderState::ReadingSize;
                }
                DecoderState::ReadingSize => {
                    match self.len7 {
                        126 => {
                            if src.len() < 2 {
                                return Ok(None);
                            }
                            let len = u64::from(src.get_u16());
                            if len < 126 {
                                return Err(self.corrupt(Error::protocol(
                                    "invalid frame length (not using minimal length encoding)",
                                )));
                            }
                            self.payload_len = self.checked_len(len)?;
                        }
                        127 => {
                            if src.len() < 8 {
                                return Ok(None);
                            }
                            let len = src.get_u64();
                            if len < 65536 {
                                return Err(self.corrupt(Error::protocol(
                                    "invalid frame length (not using minimal length encoding)",
                                )));
                            }
                            self.payload_len = self.checked_len(len)?;
                        }
                        n => {
                            self.payload_len = self.checked_len(u64::from(n))?;
                        }
                    }
                    self.state = DecoderState::MaskingKey;
                }
                DecoderState::MaskingKey => {
                    if self.masked {
                        if src.len() < 4 {
                            return Ok(None);
                        }
                        src.copy_to_slice(&mut self.mask);
                    }
                    self.state = DecoderState::Payload;
                }
                DecoderState::Payload => {
                    if src.len() < self.payload_len {
                        return Ok(None);
                    }
                    let mut payload = src.split_to(self.payload_len);
                    if self.masked {
                        apply_mask(&mut payload, self.mask);
                    }
                    self.state = DecoderState::ReadingFirst;
                    let payload = payload.freeze();

                    if self.opcode == OpCode::Close {
                        self.received_close = true;
                        if let Err(err) = CloseStatus::parse(&payload) {
                            return Err(self.corrupt(err));
                        }
                    } else if self.opcode.is_data() {
                        // Control frames may interleave a fragmented message
                        // without disturbing it.
                        if self.fin {
                            self.fragments = 0;
                        } else {
                            self.fragments += 1;
                        }
                    }

                    let frame =
                        Frame::new(self.opcode, payload, self.fin).with_rsv(self.rsv);
                    return Ok(Some(frame));
                }
                DecoderState::Corrupt => {
                    src.clear();
                    return Ok(None);
                }
            }
        }
    }

    /// Header checks run once both header bytes are in.
    fn validate_header(&mut self) -> Result<()> {
        if self.rsv != 0 && !self.allow_extensions {
            let rsv = self.rsv;
            return Err(self.corrupt(Error::protocol(format!(
                "RSV != 0 and no extension negotiated, RSV: {rsv}"
            ))));
        }

        if !self.allow_mask_mismatch && self.masked != self.expect_masked_frames {
            return Err(self.corrupt(Error::protocol(
                "received a frame that is not masked as expected",
            )));
        }

        if self.opcode_raw > 7 {
            // Control frames must be final and short.
            if !self.fin {
                return Err(self.corrupt(Error::protocol("fragmented control frame")));
            }
            if self.len7 > 125 {
                return Err(self.corrupt(Error::protocol(
                    "control frame with payload length > 125 octets",
                )));
            }
            let Some(opcode) = OpCode::from_u8(self.opcode_raw) else {
                let raw = self.opcode_raw;
                return Err(self.corrupt(Error::protocol(format!(
                    "control frame using reserved opcode {raw:#x}"
                ))));
            };
            // A close body carries a 16-bit status code when present, so a
            // single-byte body can never be valid.
            if opcode == OpCode::Close && self.len7 == 1 {
                return Err(self.corrupt(Error::protocol(
                    "received close control frame with payload len 1",
                )));
            }
            self.opcode = opcode;
        } else {
            let Some(opcode) = OpCode::from_u8(self.opcode_raw) else {
                let raw = self.opcode_raw;
                return Err(self.corrupt(Error::protocol(format!(
                    "data frame using reserved opcode {raw:#x}"
                ))));
            };
            if self.fragments == 0 && opcode == OpCode::Continuation {
                return Err(self.corrupt(Error::protocol(
                    "received continuation data frame outside fragmented message",
                )));
            }
            if self.fragments != 0 && opcode != OpCode::Continuation {
                return Err(self.corrupt(Error::protocol(
                    "received non-continuation data frame while inside fragmented message",
                )));
            }
            self.opcode = opcode;
        }
        Ok(())
    }

    fn checked_len(&mut self, len: u64) -> Result<usize> {
        if len > self.max_payload_len as u64 {
            let max = self.max_payload_len;
            return Err(self.corrupt(Error::violation(
                CloseStatus::MESSAGE_TOO_BIG,
                format!("max frame length of {max} has been exceeded"),
            )));
        }
        Ok(len as usize)
    }

    fn corrupt(&mut self, err: Error) -> Error {
        self.state = DecoderState::Corrupt;
        err
    }
}
