//! Connection-level protocol coordination.
//!
//! The centerpiece is [`Session`], a sans-I/O state machine that applies the
//! configured policies (auto-pong, close handling, violation handling) to a
//! decoded frame stream and stages everything it wants sent in an internal
//! output buffer. [`Role`] distinguishes the masking rules of the two
//! endpoints, and the state enums track the opening handshake and the
//! closing handshake separately.
//!
//! With the `async-tokio` feature, [`Connection`] drives a `Session` plus a
//! handshaker over any `AsyncRead + AsyncWrite` transport.

mod role;
mod session;
mod state;

pub use role::Role;
pub use session::Session;
pub use state::{CloseState, HandshakeState};

#[cfg(feature = "async-tokio")]
#[allow(clippy::module_inception)]
mod connection;

#[cfg(feature = "async-tokio")]
pub use connection::Connection;
