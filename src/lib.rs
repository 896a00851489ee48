//! # wsproto - Multi-version WebSocket protocol engine
//!
//! `wsproto` implements the WebSocket wire protocol as a sans-I/O engine:
//! framing, opening and closing handshakes, and per-connection policy for
//! RFC 6455 (version 13) plus the older drafts still seen in the wild
//! (hybi-07, hybi-08, and hixie-76/hybi-00).
//!
//! ## Features
//!
//! - **Sans-I/O core** that works with any transport and any runtime
//! - **Multi-version negotiation** across versions 00, 7, 8, and 13
//! - **Strict validation** with the RFC 6455 close-status mapping
//! - **Automatic policies** for pings, close echoes, and violations
//! - **Async driver** for tokio streams behind the `async-tokio` feature
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wsproto::{ClientHandshaker, Config, Connection, WebSocketVersion};
//!
//! let stream = tokio::net::TcpStream::connect("example.com:80").await?;
//! let handshake = ClientHandshaker::new(
//!     Config::client(),
//!     WebSocketVersion::V13,
//!     "example.com",
//!     "/chat",
//! );
//! let mut conn = Connection::client(stream, handshake).await?;
//! conn.send_text("Hello").await?;
//! ```
//!
//! Without the driver, feed bytes to a [`Session`] by hand and write out
//! whatever [`Session::take_output`] hands back.

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod handshake;
pub mod protocol;
pub mod status;

pub use codec::{Decoder, Encoder};
pub use config::Config;
#[cfg(feature = "async-tokio")]
pub use connection::Connection;
pub use connection::{CloseState, HandshakeState, Role, Session};
pub use error::{Error, HandshakeError, Result};
pub use handshake::{
    ClientHandshaker, HandshakeRequest, HandshakeResponse, ServerHandshaker, WebSocketVersion,
    compute_accept_key,
};
pub use protocol::{Frame, OpCode};
pub use status::CloseStatus;
