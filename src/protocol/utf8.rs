//! Incremental UTF-8 validation for text payloads.
//!
//! Table-driven DFA: each byte maps to a character class, and (state + class)
//! indexes the transition table. State 0 accepts; state 12 is the reject sink.
//! Because the state is a single byte, validation can resume across fragment
//! boundaries without buffering partial sequences.
//!
//! [`Utf8FrameValidator`] layers fragmentation tracking on top: the payload of
//! a fragmented text message is checked fragment by fragment and only
//! finalized when the closing fragment arrives.

use crate::error::{Error, Result};
use crate::protocol::frame::Frame;
use crate::protocol::opcode::OpCode;

const ACCEPT: u8 = 0;
const REJECT: u8 = 12;

/// Maps each byte to its character class.
#[rustfmt::skip]
const TYPES: [u8; 256] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1,
    9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9, 9,
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
    7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
    8, 8, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
   10, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 4, 3, 3,
   11, 6, 6, 6, 5, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8,
];

/// Maps (state + class) to the next state. States are multiples of 12.
#[rustfmt::skip]
const TRANSITIONS: [u8; 108] = [
     0, 12, 24, 36, 60, 96, 84, 12, 12, 12, 48, 72,
    12, 12, 12, 12, 12, 12, 12, 12, 12, 12, 12, 12,
    12,  0, 12, 12, 12, 12, 12,  0, 12,  0, 12, 12,
    12, 24, 12, 12, 12, 12, 12, 24, 12, 24, 12, 12,
    12, 12, 12, 12, 12, 12, 12, 24, 12, 12, 12, 12,
    12, 24, 12, 12, 12, 12, 12, 12, 12, 24, 12, 12,
    12, 12, 12, 12, 12, 12, 12, 36, 12, 36, 12, 12,
    12, 36, 12, 12, 12, 12, 12, 36, 12, 36, 12, 12,
    12, 36, 12, 12, 12, 12, 12, 12, 12, 12, 12, 12,
];

/// Incremental UTF-8 validator.
///
/// `check` may be called any number of times with consecutive chunks of a
/// byte stream; `finish` asserts no multi-byte sequence was left open.
#[derive(Debug, Clone)]
pub struct Utf8Validator {
    state: u8,
}

impl Utf8Validator {
    /// Create a validator in the accepting state.
    #[must_use]
    pub const fn new() -> Self {
        Utf8Validator { state: ACCEPT }
    }

    /// Fold `input` through the DFA.
    ///
    /// # Errors
    ///
    /// Returns a 1007 violation as soon as a byte makes the stream invalid
    /// UTF-8; the validator resets so it can be reused afterwards.
    pub fn check(&mut self, input: &[u8]) -> Result<()> {
        let mut state = self.state;
        for &byte in input {
            state = TRANSITIONS[(state + TYPES[byte as usize]) as usize];
            if state == REJECT {
                self.state = ACCEPT;
                return Err(Error::invalid_payload("bytes are not UTF-8"));
            }
        }
        self.state = state;
        Ok(())
    }

    /// Assert the stream ended on a codepoint boundary and reset.
    ///
    /// # Errors
    ///
    /// Returns a 1007 violation if a multi-byte sequence was truncated.
    pub fn finish(&mut self) -> Result<()> {
        let state = self.state;
        self.state = ACCEPT;
        if state != ACCEPT {
            return Err(Error::invalid_payload("bytes are not UTF-8"));
        }
        Ok(())
    }
}

impl Default for Utf8Validator {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a complete byte slice in one shot.
///
/// # Errors
///
/// Returns a 1007 violation for malformed or truncated UTF-8.
pub fn validate_utf8(input: &[u8]) -> Result<()> {
    let mut validator = Utf8Validator::new();
    validator.check(input)?;
    validator.finish()
}

/// Per-connection text validator that follows fragmentation.
///
/// The first fragment of a text message starts an incremental check that
/// subsequent continuation payloads feed; `finish` runs when the final
/// fragment lands. Pings inside a fragmented sequence are transparent; other
/// control frames reset the tracking, and their bodies never enter the text
/// stream.
#[derive(Debug, Default)]
pub struct Utf8FrameValidator {
    validator: Utf8Validator,
    fragment_count: usize,
    checking: bool,
}

impl Utf8FrameValidator {
    /// Create a fresh validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect one inbound frame, updating fragmentation state.
    ///
    /// # Errors
    ///
    /// Returns the 1007 violation raised by the underlying DFA. The
    /// fragmentation state resets on error; the decoder's corrupt state is
    /// what actually stops the stream.
    pub fn validate(&mut self, frame: &Frame) -> Result<()> {
        let result = self.validate_inner(frame);
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn validate_inner(&mut self, frame: &Frame) -> Result<()> {
        if frame.is_final() {
            // Pings may interleave a fragmented message without touching it.
            if frame.opcode() == OpCode::Ping {
                return Ok(());
            }
            if frame.is_control() {
                // Close and Pong bodies are not part of the text stream.
                self.reset();
                return Ok(());
            }
            self.fragment_count = 0;
            if frame.opcode() == OpCode::Text || self.checking {
                self.checking = false;
                self.validator.check(frame.payload())?;
                self.validator.finish()?;
            }
        } else {
            if self.fragment_count == 0 {
                if frame.opcode() == OpCode::Text {
                    self.checking = true;
                    self.validator.check(frame.payload())?;
                }
            } else if self.checking {
                self.validator.check(frame.payload())?;
            }
            self.fragment_count += 1;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.validator = Utf8Validator::new();
        self.fragment_count = 0;
        self.checking = false;
    }
}
