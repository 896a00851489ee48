//! Frame encoder for wire versions 07, 08, and 13.
//!
//! Small or masked frames are serialized into a single buffer. Large unmasked
//! payloads are left untouched and returned alongside the header so the caller
//! can issue a vectored write instead of copying.

use bytes::{BufMut, Bytes, BytesMut};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::protocol::{Frame, MAX_CONTROL_FRAME_PAYLOAD, OpCode, apply_mask};

/// Payloads at or below this size are copied into the header buffer; above
/// it, an unmasked payload is handed back as its own segment.
pub const COALESCE_THRESHOLD: usize = 1024;

/// Output of [`FrameEncoder::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encoded {
    /// Header and payload in one contiguous buffer.
    Single(Bytes),
    /// Header segment plus the original payload, for a vectored write.
    Split(Bytes, Bytes),
}

impl Encoded {
    /// Total number of bytes to put on the wire.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Encoded::Single(buf) => buf.len(),
            Encoded::Split(head, payload) => head.len() + payload.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten into one buffer. Copies only in the split case.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        match self {
            Encoded::Single(buf) => buf,
            Encoded::Split(head, payload) => {
                let mut buf = BytesMut::with_capacity(head.len() + payload.len());
                buf.put_slice(&head);
                buf.put_slice(&payload);
                buf.freeze()
            }
        }
    }
}

/// Generate a random seed for mask generation.
/// Falls back to system time if getrandom fails.
fn random_mask_seed() -> u32 {
    let mut buf = [0u8; 4];
    if getrandom::getrandom(&mut buf).is_ok() {
        u32::from_le_bytes(buf)
    } else {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u32)
            .unwrap_or(0x12345678)
    }
}

/// Stateful encoder turning [`Frame`] values into wire bytes.
///
/// Masking keys come from a per-encoder counter mixed through an avalanche
/// hash. RFC 6455 requires masks to be unpredictable to the page that
/// originated the data, not cryptographically strong, so the counter is
/// seeded once from the system RNG and never re-keyed.
pub struct FrameEncoder {
    perform_masking: bool,
    mask_counter: u32,
}

impl FrameEncoder {
    /// Create an encoder; masking follows `config.perform_masking`.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        FrameEncoder {
            perform_masking: config.perform_masking,
            mask_counter: random_mask_seed(),
        }
    }

    fn generate_mask(&mut self) -> [u8; 4] {
        self.mask_counter = self.mask_counter.wrapping_add(0x9E37_79B9);
        let a = self.mask_counter;
        let b = a.wrapping_mul(0x85EB_CA6B);
        let c = b ^ (b >> 13);
        let d = c.wrapping_mul(0xC2B2_AE35);
        d.to_le_bytes()
    }

    /// Serialize one frame.
    pub fn encode(&mut self, frame: &Frame) -> Result<Encoded> {
        let len = frame.len();
        if frame.opcode() == OpCode::Ping && len > MAX_CONTROL_FRAME_PAYLOAD {
            return Err(Error::FrameTooLarge {
                size: len,
                max: MAX_CONTROL_FRAME_PAYLOAD,
            });
        }

        let b0 = (u8::from(frame.is_final()) << 7) | (frame.rsv() << 4) | frame.opcode().as_u8();
        let mask_bit: u8 = if self.perform_masking { 0x80 } else { 0x00 };

        let header_len = if len <= 125 {
            2
        } else if len <= 0xFFFF {
            4
        } else {
            10
        };
        let mask_len = if self.perform_masking { 4 } else { 0 };
        let coalesce = self.perform_masking || len <= COALESCE_THRESHOLD;

        let capacity = header_len + mask_len + if coalesce { len } else { 0 };
        let mut buf = BytesMut::with_capacity(capacity);
        buf.put_u8(b0);
        if len <= 125 {
            buf.put_u8(mask_bit | len as u8);
        } else if len <= 0xFFFF {
            buf.put_u8(mask_bit | 126);
            buf.put_u16(len as u16);
        } else {
            buf.put_u8(mask_bit | 127);
            buf.put_u64(len as u64);
        }

        if self.perform_masking {
            let mask = self.generate_mask();
            buf.put_slice(&mask);
            let start = buf.len();
            buf.put_slice(frame.payload());
            apply_mask(&mut buf[start..], mask);
            Ok(Encoded::Single(buf.freeze()))
        } else if coalesce {
            buf.put_slice(frame.payload());
            Ok(Encoded::Single(buf.freeze()))
        } else {
            Ok(Encoded::Split(buf.freeze(), frame.payload().clone()))
        }
    }
}
