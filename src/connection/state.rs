//! Connection lifecycle state machines.
//!
//! Two independent progressions: [`HandshakeState`] covers the HTTP upgrade,
//! [`CloseState`] covers the close-frame exchange once frames are flowing.

/// Progress of the upgrade exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HandshakeState {
    /// Nothing sent or received yet.
    #[default]
    Idle,
    /// Client request is on the wire, awaiting the peer's reply.
    RequestSent,
    /// Upgrade completed; frames flow.
    Complete,
    /// Upgrade was rejected or malformed.
    Failed,
    /// The peer did not finish the exchange within the configured window.
    TimedOut,
}

impl HandshakeState {
    /// Whether the exchange reached a terminal state.
    #[must_use]
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            HandshakeState::Complete | HandshakeState::Failed | HandshakeState::TimedOut
        )
    }

    /// Whether frames may flow.
    #[must_use]
    #[inline]
    pub const fn is_complete(&self) -> bool {
        matches!(self, HandshakeState::Complete)
    }
}

impl std::fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandshakeState::Idle => write!(f, "Idle"),
            HandshakeState::RequestSent => write!(f, "RequestSent"),
            HandshakeState::Complete => write!(f, "Complete"),
            HandshakeState::Failed => write!(f, "Failed"),
            HandshakeState::TimedOut => write!(f, "TimedOut"),
        }
    }
}

/// Progress of the close-frame exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CloseState {
    /// No Close frame seen in either direction.
    #[default]
    Open,
    /// We sent a Close frame and are waiting for the peer's.
    CloseSent,
    /// The peer sent a Close frame; ours is still owed.
    CloseReceived,
    /// Both Close frames have passed; the connection is done.
    Closed,
}

impl CloseState {
    /// Whether the application may still send data frames.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, CloseState::Open | CloseState::CloseReceived)
    }

    /// Whether any Close frame has been seen or sent.
    #[must_use]
    #[inline]
    pub const fn is_closing(&self) -> bool {
        !matches!(self, CloseState::Open)
    }

    /// Whether the exchange is finished.
    #[must_use]
    #[inline]
    pub const fn is_closed(&self) -> bool {
        matches!(self, CloseState::Closed)
    }
}

impl std::fmt::Display for CloseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseState::Open => write!(f, "Open"),
            CloseState::CloseSent => write!(f, "CloseSent"),
            CloseState::CloseReceived => write!(f, "CloseReceived"),
            CloseState::Closed => write!(f, "Closed"),
        }
    }
}
