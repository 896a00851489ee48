//! Frame codecs for every supported wire version.
//!
//! [`FrameDecoder`]/[`FrameEncoder`] speak the versions 07, 08, and 13
//! framing (identical on the wire); [`FrameDecoder00`]/[`FrameEncoder00`]
//! speak the pre-standard hixie-76 framing. [`Decoder`] and [`Encoder`] wrap
//! the two so a connection can install whichever pair its handshake
//! negotiated.

mod decoder;
mod encoder;
mod v00;

pub use decoder::{DecoderState, FrameDecoder};
pub use encoder::{COALESCE_THRESHOLD, Encoded, FrameEncoder};
pub use v00::{FrameDecoder00, FrameEncoder00};

use bytes::BytesMut;

use crate::config::Config;
use crate::error::Result;
use crate::handshake::WebSocketVersion;
use crate::protocol::Frame;

/// Decoder for whichever wire version the handshake selected.
pub enum Decoder {
    /// hixie-76 framing.
    V00(FrameDecoder00),
    /// Versions 07, 08, and 13.
    V08(FrameDecoder),
}

impl Decoder {
    /// Pick the decoder matching `version`.
    #[must_use]
    pub fn for_version(version: WebSocketVersion, config: &Config) -> Self {
        match version {
            WebSocketVersion::V00 => Decoder::V00(FrameDecoder00::new(config)),
            _ => Decoder::V08(FrameDecoder::new(config)),
        }
    }

    /// Decode at most one frame out of `src`; `Ok(None)` means more input is
    /// needed.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        match self {
            Decoder::V00(decoder) => decoder.decode(src),
            Decoder::V08(decoder) => decoder.decode(src),
        }
    }
}

/// Encoder for whichever wire version the handshake selected.
pub enum Encoder {
    /// hixie-76 framing.
    V00(FrameEncoder00),
    /// Versions 07, 08, and 13.
    V08(FrameEncoder),
}

impl Encoder {
    /// Pick the encoder matching `version`.
    #[must_use]
    pub fn for_version(version: WebSocketVersion, config: &Config) -> Self {
        match version {
            WebSocketVersion::V00 => Encoder::V00(FrameEncoder00::new()),
            _ => Encoder::V08(FrameEncoder::new(config)),
        }
    }

    /// Serialize one frame.
    pub fn encode(&mut self, frame: &Frame) -> Result<Encoded> {
        match self {
            Encoder::V00(encoder) => encoder.encode(frame),
            Encoder::V08(encoder) => encoder.encode(frame),
        }
    }
}
