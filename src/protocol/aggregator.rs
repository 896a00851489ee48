//! Reassembly of fragmented messages.
//!
//! Feeds on decoded frames and buffers fragment payloads until the final
//! continuation arrives, then emits one complete frame carrying the starter's
//! opcode and RSV bits. Control frames pass straight through, even while a
//! message is in flight.

use bytes::BytesMut;

use crate::error::{Error, Result};
use crate::protocol::frame::Frame;
use crate::protocol::opcode::OpCode;
use crate::status::CloseStatus;

/// Reassembles fragmented text/binary messages into single frames.
#[derive(Debug)]
pub struct FrameAggregator {
    buffer: BytesMut,
    opcode: Option<OpCode>,
    rsv: u8,
    max_len: usize,
}

impl FrameAggregator {
    /// Create an aggregator with the given cap on the reassembled size.
    #[must_use]
    pub fn new(max_len: usize) -> Self {
        FrameAggregator {
            buffer: BytesMut::new(),
            opcode: None,
            rsv: 0,
            max_len,
        }
    }

    /// Feed one frame through the aggregator.
    ///
    /// Returns `Ok(Some(_))` for control frames (unchanged), unfragmented
    /// data frames (unchanged), and the reassembled message once its final
    /// fragment lands; `Ok(None)` while a message is still accumulating.
    ///
    /// # Errors
    ///
    /// - 1002 violation for a Continuation with no message in progress, or a
    ///   new Text/Binary start while one is in progress.
    /// - 1009 violation when the running total would exceed the cap; the
    ///   partial message is discarded.
    pub fn push(&mut self, frame: Frame) -> Result<Option<Frame>> {
        if frame.is_control() {
            return Ok(Some(frame));
        }

        if frame.opcode() == OpCode::Continuation {
            if self.opcode.is_none() {
                return Err(Error::protocol(
                    "continuation frame outside fragmented message",
                ));
            }
            self.append(&frame)?;
            if frame.is_final() {
                return Ok(Some(self.complete()));
            }
            return Ok(None);
        }

        // Text or Binary start.
        if self.opcode.is_some() {
            return Err(Error::protocol(
                "new message started while fragmented message in progress",
            ));
        }
        if frame.is_final() {
            // Unfragmented message, nothing to buffer.
            return Ok(Some(frame));
        }

        self.opcode = Some(frame.opcode());
        self.rsv = frame.rsv();
        self.append(&frame)?;
        Ok(None)
    }

    /// Whether a fragmented message is currently accumulating.
    #[must_use]
    pub fn is_aggregating(&self) -> bool {
        self.opcode.is_some()
    }

    /// Drop any partial message.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.opcode = None;
        self.rsv = 0;
    }

    fn append(&mut self, frame: &Frame) -> Result<()> {
        let total = self.buffer.len() + frame.len();
        if total > self.max_len {
            self.reset();
            return Err(Error::violation(
                CloseStatus::MESSAGE_TOO_BIG,
                format!(
                    "aggregated message would reach {total} bytes (max: {})",
                    self.max_len
                ),
            ));
        }
        self.buffer.extend_from_slice(frame.payload());
        Ok(())
    }

    fn complete(&mut self) -> Frame {
        let payload = self.buffer.split().freeze();
        let opcode = self.opcode.take().unwrap_or(OpCode::Binary);
        let rsv = self.rsv;
        self.rsv = 0;
        Frame::new(opcode, payload, true).with_rsv(rsv)
    }
}
