//! Engine configuration.
//!
//! A plain immutable struct covering the decoder, encoder, handshake, and
//! session options. [`Config::server`] and [`Config::client`] pick the
//! masking expectations for each role; everything else starts from the same
//! defaults and is adjusted with the `with_*` setters.

use std::time::Duration;

/// Default cap on a single frame payload (64 KiB).
pub const DEFAULT_MAX_FRAME_PAYLOAD_LEN: usize = 64 * 1024;

/// Default cap on an aggregated message (4x the frame cap).
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 4 * DEFAULT_MAX_FRAME_PAYLOAD_LEN;

/// Default cap on the HTTP handshake head (8 KiB).
pub const DEFAULT_MAX_HANDSHAKE_LEN: usize = 8 * 1024;

/// Default handshake timeout.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Protocol engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum payload length of a single frame; longer frames are rejected
    /// with a 1009 violation.
    ///
    /// Default: 64 KB
    pub max_frame_payload_len: usize,

    /// Maximum size of an aggregated (reassembled) message.
    ///
    /// Default: 256 KB
    pub max_message_len: usize,

    /// Maximum size of the HTTP head accepted during the handshake.
    ///
    /// Default: 8 KB
    pub max_handshake_len: usize,

    /// Whether inbound frames are expected to be masked. True on servers
    /// (clients must mask), false on clients (servers must not).
    pub expect_masked_frames: bool,

    /// Tolerate frames whose mask bit contradicts `expect_masked_frames`.
    ///
    /// Default: false
    pub allow_mask_mismatch: bool,

    /// Permit non-zero RSV bits (only meaningful once an extension has been
    /// negotiated out of band).
    ///
    /// Default: false
    pub allow_extensions: bool,

    /// Synthesize and send a Close frame when a protocol violation is
    /// detected, before tearing the connection down.
    ///
    /// Default: true
    pub close_on_protocol_violation: bool,

    /// Run the incremental UTF-8 validator over text messages.
    ///
    /// Default: true
    pub with_utf8_validator: bool,

    /// Mask outbound frames. Required of clients by RFC 6455.
    pub perform_masking: bool,

    /// How long to wait for the peer to complete the upgrade exchange.
    ///
    /// Default: 10 seconds
    pub handshake_timeout: Duration,

    /// How long to wait for the peer's Close reply after sending ours.
    /// `None` disables the forced close and waits indefinitely.
    ///
    /// Default: None
    pub force_close_timeout: Option<Duration>,

    /// Let the session consume Close frames and run the close handshake.
    /// When false, Close frames are delivered to the application instead.
    ///
    /// Default: true
    pub handle_close_frames: bool,

    /// Swallow inbound Pong frames instead of delivering them.
    ///
    /// Default: true
    pub drop_pong_frames: bool,

    /// Origins accepted by the server handshaker. `None` accepts any origin.
    pub allowed_origins: Option<Vec<String>>,

    /// Subprotocols offered by a client, or supported by a server. The server
    /// list may contain `"*"` to accept any requested subprotocol.
    pub subprotocols: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_frame_payload_len: DEFAULT_MAX_FRAME_PAYLOAD_LEN,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            max_handshake_len: DEFAULT_MAX_HANDSHAKE_LEN,
            expect_masked_frames: true,
            allow_mask_mismatch: false,
            allow_extensions: false,
            close_on_protocol_violation: true,
            with_utf8_validator: true,
            perform_masking: false,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            force_close_timeout: None,
            handle_close_frames: true,
            drop_pong_frames: true,
            allowed_origins: None,
            subprotocols: Vec::new(),
        }
    }
}

impl Config {
    /// Server-side configuration: inbound frames must be masked, outbound
    /// frames are sent in the clear.
    #[must_use]
    pub fn server() -> Self {
        Config::default()
    }

    /// Client-side configuration: outbound frames are masked, inbound frames
    /// must not be.
    #[must_use]
    pub fn client() -> Self {
        Config {
            expect_masked_frames: false,
            perform_masking: true,
            ..Config::default()
        }
    }

    /// Set the maximum single-frame payload length.
    #[must_use]
    pub fn with_max_frame_payload_len(mut self, len: usize) -> Self {
        self.max_frame_payload_len = len;
        self
    }

    /// Set the maximum aggregated message length.
    #[must_use]
    pub fn with_max_message_len(mut self, len: usize) -> Self {
        self.max_message_len = len;
        self
    }

    /// Set the maximum handshake head size.
    #[must_use]
    pub fn with_max_handshake_len(mut self, len: usize) -> Self {
        self.max_handshake_len = len;
        self
    }

    /// Tolerate mask-bit mismatches instead of failing the connection.
    #[must_use]
    pub fn with_allow_mask_mismatch(mut self, allow: bool) -> Self {
        self.allow_mask_mismatch = allow;
        self
    }

    /// Permit non-zero RSV bits.
    #[must_use]
    pub fn with_allow_extensions(mut self, allow: bool) -> Self {
        self.allow_extensions = allow;
        self
    }

    /// Control whether violations synthesize an outbound Close frame.
    #[must_use]
    pub fn with_close_on_protocol_violation(mut self, close: bool) -> Self {
        self.close_on_protocol_violation = close;
        self
    }

    /// Enable or disable the incremental UTF-8 text validator.
    #[must_use]
    pub fn with_utf8_validator(mut self, validate: bool) -> Self {
        self.with_utf8_validator = validate;
        self
    }

    /// Enable or disable outbound masking.
    #[must_use]
    pub fn with_perform_masking(mut self, mask: bool) -> Self {
        self.perform_masking = mask;
        self
    }

    /// Set the handshake timeout.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set (or disable) the forced-close timeout.
    #[must_use]
    pub fn with_force_close_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.force_close_timeout = timeout;
        self
    }

    /// Control whether the session consumes Close frames.
    #[must_use]
    pub fn with_handle_close_frames(mut self, handle: bool) -> Self {
        self.handle_close_frames = handle;
        self
    }

    /// Control whether inbound Pong frames are swallowed.
    #[must_use]
    pub fn with_drop_pong_frames(mut self, drop: bool) -> Self {
        self.drop_pong_frames = drop;
        self
    }

    /// Set the subprotocol list (client: offered; server: supported).
    #[must_use]
    pub fn with_subprotocols(mut self, subprotocols: Vec<String>) -> Self {
        self.subprotocols = subprotocols;
        self
    }

    /// Restrict accepted origins on the server side.
    #[must_use]
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = Some(origins);
        self
    }

    /// Whether `origin` passes the configured allow-list.
    #[must_use]
    pub fn origin_allowed(&self, origin: &str) -> bool {
        match &self.allowed_origins {
            None => true,
            Some(list) => list.iter().any(|allowed| allowed == origin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_presets() {
        let server = Config::server();
        assert!(server.expect_masked_frames);
        assert!(!server.perform_masking);

        let client = Config::client();
        assert!(!client.expect_masked_frames);
        assert!(client.perform_masking);
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_frame_payload_len, 64 * 1024);
        assert_eq!(config.max_message_len, 256 * 1024);
        assert!(config.close_on_protocol_violation);
        assert!(config.with_utf8_validator);
        assert!(config.handle_close_frames);
        assert!(config.drop_pong_frames);
        assert!(config.force_close_timeout.is_none());
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_fluent_setters() {
        let config = Config::client()
            .with_max_frame_payload_len(1024)
            .with_allow_extensions(true)
            .with_force_close_timeout(Some(Duration::from_secs(3)))
            .with_drop_pong_frames(false);
        assert_eq!(config.max_frame_payload_len, 1024);
        assert!(config.allow_extensions);
        assert_eq!(config.force_close_timeout, Some(Duration::from_secs(3)));
        assert!(!config.drop_pong_frames);
    }

    #[test]
    fn test_origin_allow_list() {
        let open = Config::server();
        assert!(open.origin_allowed("http://anywhere.example"));

        let restricted =
            Config::server().with_allowed_origins(vec![String::from("https://app.example")]);
        assert!(restricted.origin_allowed("https://app.example"));
        assert!(!restricted.origin_allowed("https://evil.example"));
    }
}
