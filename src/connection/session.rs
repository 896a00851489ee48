//! Sans-I/O per-connection protocol orchestration.
//!
//! [`Session`] sits between a transport and the application. Inbound bytes go
//! through the version codec, the UTF-8 validator, and the fragment
//! aggregator; Ping, Pong, and Close frames are intercepted according to the
//! configured policies. Outbound frames pass the close-state checks before
//! encoding. The session never touches a socket: everything it wants written
//! lands in an output buffer the driver drains with
//! [`take_output`](Session::take_output).

use std::fmt;

use bytes::{Bytes, BytesMut};
use log::{debug, warn};

use crate::codec::{Decoder, Encoded, Encoder};
use crate::config::Config;
use crate::connection::role::Role;
use crate::connection::state::CloseState;
use crate::error::{Error, Result};
use crate::handshake::WebSocketVersion;
use crate::protocol::{Frame, FrameAggregator, OpCode, Utf8FrameValidator};
use crate::status::CloseStatus;

/// Per-connection protocol coordinator, independent of any I/O.
pub struct Session {
    role: Role,
    version: WebSocketVersion,
    decoder: Decoder,
    encoder: Encoder,
    utf8: Option<Utf8FrameValidator>,
    aggregator: FrameAggregator,
    close_state: CloseState,
    peer_close: Option<CloseStatus>,
    /// Payload of the newest ping still owed a pong.
    pending_pong: Option<Bytes>,
    output: BytesMut,
    handle_close_frames: bool,
    drop_pong_frames: bool,
    close_on_protocol_violation: bool,
}

impl Session {
    #[must_use]
    pub fn new(role: Role, version: WebSocketVersion, config: &Config) -> Self {
        Session {
            role,
            version,
            decoder: Decoder::for_version(version, config),
            encoder: Encoder::for_version(version, config),
            utf8: config.with_utf8_validator.then(Utf8FrameValidator::new),
            aggregator: FrameAggregator::new(config.max_message_len),
            close_state: CloseState::Open,
            peer_close: None,
            pending_pong: None,
            output: BytesMut::new(),
            handle_close_frames: config.handle_close_frames,
            drop_pong_frames: config.drop_pong_frames,
            close_on_protocol_violation: config.close_on_protocol_violation,
        }
    }

    /// Which side of the connection this session runs.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Wire version negotiated for this connection.
    #[must_use]
    pub fn version(&self) -> WebSocketVersion {
        self.version
    }

    /// Progress of the close-frame exchange.
    #[must_use]
    pub fn close_state(&self) -> CloseState {
        self.close_state
    }

    /// Whether both close frames have passed (or the session was torn down
    /// after a violation).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.close_state.is_closed()
    }

    /// Close status the peer sent, once a Close frame has been received.
    #[must_use]
    pub fn peer_close_status(&self) -> Option<&CloseStatus> {
        self.peer_close.as_ref()
    }

    /// Bytes the session wants written to the transport, if any.
    pub fn take_output(&mut self) -> Option<Bytes> {
        if self.output.is_empty() {
            None
        } else {
            Some(self.output.split().freeze())
        }
    }

    /// Consume inbound bytes and produce the next application-visible frame.
    ///
    /// `Ok(None)` means more input is needed. Pings are answered and
    /// swallowed, pongs are dropped when configured, fragments are absorbed
    /// until their message completes, and a Close frame is delivered once
    /// (echoed first when close handling is on). Violations synthesize the
    /// mapped close frame and surface the error; after that the decoder
    /// discards all further input.
    pub fn receive(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        let received = self.next_frame(src);
        self.flush_pending_pong()?;
        received
    }

    fn next_frame(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        loop {
            let frame = match self.decoder.decode(src) {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(None),
                Err(err) => return Err(self.on_violation(err)),
            };
            if let Some(validator) = &mut self.utf8 {
                if let Err(err) = validator.validate(&frame) {
                    return Err(self.on_violation(err));
                }
            }
            let frame = match self.aggregator.push(frame) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(err) => return Err(self.on_violation(err)),
            };
            match frame.opcode() {
                OpCode::Ping => {
                    // Only the newest unanswered ping gets a reply.
                    self.pending_pong = Some(frame.into_payload());
                }
                OpCode::Pong if self.drop_pong_frames => {
                    debug!("dropping pong frame ({} bytes)", frame.len());
                }
                OpCode::Close => {
                    self.on_peer_close(&frame)?;
                    return Ok(Some(frame));
                }
                _ => return Ok(Some(frame)),
            }
        }
    }

    /// Encode an application frame for the wire.
    ///
    /// A Close frame advances the close handshake; any send after our close
    /// has gone out fails with [`Error::ClosedChannel`].
    pub fn send(&mut self, frame: &Frame) -> Result<()> {
        if !self.close_state.can_send() {
            return Err(Error::ClosedChannel);
        }
        self.stage(frame)?;
        if frame.opcode() == OpCode::Close {
            self.close_state = match self.close_state {
                CloseState::CloseReceived => CloseState::Closed,
                _ => CloseState::CloseSent,
            };
            debug!("close sent, state now {}", self.close_state);
        }
        Ok(())
    }

    /// Send a Close frame carrying `status`.
    pub fn close(&mut self, status: Option<CloseStatus>) -> Result<()> {
        self.send(&Frame::close(status))
    }

    fn on_peer_close(&mut self, frame: &Frame) -> Result<()> {
        self.peer_close = frame.close_status()?;
        match self.close_state {
            CloseState::Open => {
                self.close_state = CloseState::CloseReceived;
                if self.handle_close_frames {
                    debug!("echoing close from peer: {:?}", self.peer_close);
                    self.stage(frame)?;
                    self.close_state = CloseState::Closed;
                }
            }
            CloseState::CloseSent => {
                debug!("peer answered our close");
                self.close_state = CloseState::Closed;
            }
            CloseState::CloseReceived | CloseState::Closed => {}
        }
        Ok(())
    }

    fn flush_pending_pong(&mut self) -> Result<()> {
        if let Some(payload) = self.pending_pong.take() {
            if self.close_state.can_send() {
                self.stage(&Frame::pong(payload))?;
            }
        }
        Ok(())
    }

    /// Synthesize the close frame mapped to a violation, when configured,
    /// and hand the error back for the caller.
    fn on_violation(&mut self, err: Error) -> Error {
        warn!("protocol violation on {} connection: {err}", self.role);
        if self.close_on_protocol_violation && self.close_state.can_send() {
            if let Some(status) = err.close_status() {
                let close = Frame::close(Some(status.clone()));
                if self.stage(&close).is_ok() {
                    self.close_state = CloseState::CloseSent;
                }
            }
        }
        err
    }

    fn stage(&mut self, frame: &Frame) -> Result<()> {
        match self.encoder.encode(frame)? {
            Encoded::Single(buf) => self.output.extend_from_slice(&buf),
            Encoded::Split(head, payload) => {
                self.output.extend_from_slice(&head);
                self.output.extend_from_slice(&payload);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("version", &self.version)
            .field("close_state", &self.close_state)
            .field("peer_close", &self.peer_close)
            .finish_non_exhaustive()
    }
}
