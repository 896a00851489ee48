//! Endpoint role and the masking rules it implies.

/// Which side of the connection this endpoint plays.
///
/// The role decides masking: clients mask every frame they send and
/// require unmasked frames from the server, servers do the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The initiating endpoint.
    Client,
    /// The accepting endpoint.
    Server,
}

impl Role {
    /// Whether outgoing frames must carry a mask.
    #[must_use]
    #[inline]
    pub const fn must_mask(&self) -> bool {
        matches!(self, Role::Client)
    }

    /// Whether incoming frames are expected to carry a mask.
    #[must_use]
    #[inline]
    pub const fn expects_masked(&self) -> bool {
        matches!(self, Role::Server)
    }

    /// The role the peer endpoint plays.
    #[must_use]
    #[inline]
    pub const fn peer(&self) -> Role {
        match self {
            Role::Client => Role::Server,
            Role::Server => Role::Client,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Server => write!(f, "server"),
        }
    }
}
