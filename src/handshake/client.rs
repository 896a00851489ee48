//! Client side of the upgrade handshake.
//!
//! [`ClientHandshaker`] builds the version-appropriate upgrade request,
//! remembers the proof the server owes (accept digest or MD5 challenge
//! reply), and verifies the response byte for byte. One instance serves one
//! connection attempt.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::config::Config;
use crate::connection::HandshakeState;
use crate::error::{HandshakeError, Result};
use crate::handshake::http::{
    connection_has_upgrade, find_head_end, parse_response_head, put_header,
};
use crate::handshake::{
    HandshakeAccept, HandshakeResponse, WebSocketVersion, compute_accept_key, generate_hixie_key,
    generate_nonce,
};

/// Bytes of MD5 challenge reply that follow a hixie-76 response head.
const HIXIE_REPLY_LEN: usize = 16;

/// Proof the server must present, recorded when the request is built.
#[derive(Debug, Clone)]
enum Expected {
    /// `Sec-WebSocket-Accept` digest.
    Accept(String),
    /// MD5 body answering the hixie-76 challenge.
    Challenge([u8; 16]),
}

/// Client side of the upgrade exchange.
///
/// Call [`request`](Self::request) to produce the bytes to send, then feed
/// received bytes to [`read_response`](Self::read_response) until it yields
/// the verified response.
#[derive(Debug)]
pub struct ClientHandshaker {
    config: Config,
    version: WebSocketVersion,
    host: String,
    target: String,
    origin: Option<String>,
    extra_headers: Vec<(String, String)>,
    state: HandshakeState,
    expected: Option<Expected>,
    subprotocol: Option<String>,
}

impl ClientHandshaker {
    #[must_use]
    pub fn new(
        config: Config,
        version: WebSocketVersion,
        host: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        ClientHandshaker {
            config,
            version,
            host: host.into(),
            target: target.into(),
            origin: None,
            extra_headers: Vec::new(),
            state: HandshakeState::Idle,
            expected: None,
            subprotocol: None,
        }
    }

    /// Send an origin header with the request.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Append a custom header to the request, in the order given.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    /// Current handshake progress.
    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Configuration this handshaker was built with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Version this handshaker speaks.
    #[must_use]
    pub fn version(&self) -> WebSocketVersion {
        self.version
    }

    /// Subprotocol the server selected, once the handshake is complete.
    #[must_use]
    pub fn subprotocol(&self) -> Option<&str> {
        self.subprotocol.as_deref()
    }

    /// Build the upgrade request to send, generating a fresh key.
    pub fn request(&mut self) -> Result<Bytes> {
        match self.build_request() {
            Ok(bytes) => {
                self.state = HandshakeState::RequestSent;
                Ok(bytes)
            }
            Err(err) => {
                self.state = HandshakeState::Failed;
                Err(err)
            }
        }
    }

    fn build_request(&mut self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(256);
        buf.put_slice(b"GET ");
        buf.put_slice(self.target.as_bytes());
        buf.put_slice(b" HTTP/1.1\r\n");
        put_header(&mut buf, "Host", &self.host)?;

        let mut body: Option<[u8; 8]> = None;
        match self.version {
            WebSocketVersion::V00 => {
                buf.put_slice(b"Upgrade: WebSocket\r\n");
                buf.put_slice(b"Connection: Upgrade\r\n");
                let hixie = generate_hixie_key();
                put_header(&mut buf, "Sec-WebSocket-Key1", &hixie.key1)?;
                put_header(&mut buf, "Sec-WebSocket-Key2", &hixie.key2)?;
                if let Some(origin) = &self.origin {
                    put_header(&mut buf, "Origin", origin)?;
                }
                self.expected = Some(Expected::Challenge(hixie.expected));
                body = Some(hixie.challenge);
            }
            _ => {
                buf.put_slice(b"Upgrade: websocket\r\n");
                buf.put_slice(b"Connection: Upgrade\r\n");
                let nonce = generate_nonce();
                put_header(&mut buf, "Sec-WebSocket-Key", &nonce)?;
                if let Some(origin) = &self.origin {
                    put_header(&mut buf, self.version.origin_header_name(), origin)?;
                }
                if let Some(value) = self.version.header_value() {
                    put_header(&mut buf, "Sec-WebSocket-Version", value)?;
                }
                self.expected = Some(Expected::Accept(compute_accept_key(&nonce)));
            }
        }

        if !self.config.subprotocols.is_empty() {
            put_header(
                &mut buf,
                "Sec-WebSocket-Protocol",
                &self.config.subprotocols.join(", "),
            )?;
        }
        for (name, value) in &self.extra_headers {
            put_header(&mut buf, name, value)?;
        }
        buf.put_slice(b"\r\n");
        if let Some(challenge) = body {
            buf.put_slice(&challenge);
        }
        Ok(buf.freeze())
    }

    /// Try to read and verify the server's response from `src`.
    ///
    /// Returns `Ok(None)` until the head (and, for hixie-76, the 16-byte
    /// challenge reply) is fully buffered; nothing is consumed before that.
    /// Verification runs in order: status, `Upgrade`, `Connection`, the
    /// key proof, then the subprotocol. Errors mark the handshake failed.
    pub fn read_response(&mut self, src: &mut BytesMut) -> Result<Option<HandshakeResponse>> {
        match self.parse_response(src) {
            Ok(response) => Ok(response),
            Err(err) => {
                self.state = HandshakeState::Failed;
                Err(err)
            }
        }
    }

    fn parse_response(&mut self, src: &mut BytesMut) -> Result<Option<HandshakeResponse>> {
        let Some(expected) = &self.expected else {
            return Err(HandshakeError::NoRequestInFlight.into());
        };
        let Some(head_end) = find_head_end(src, self.config.max_handshake_len)? else {
            return Ok(None);
        };
        let head = parse_response_head(&src[..head_end])?;
        if head.code != 101 {
            return Err(HandshakeError::UnexpectedStatus(head.code).into());
        }
        let upgrade = head
            .headers
            .get("upgrade")
            .ok_or(HandshakeError::MissingHeader("Upgrade"))?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(HandshakeError::InvalidUpgrade(upgrade.to_string()).into());
        }
        let connection = head
            .headers
            .get("connection")
            .ok_or(HandshakeError::MissingHeader("Connection"))?;
        if !connection_has_upgrade(connection) {
            return Err(HandshakeError::InvalidConnection(connection.to_string()).into());
        }

        let mut consumed = head_end;
        let accept = match expected {
            Expected::Accept(digest) => {
                let actual = head
                    .headers
                    .get("sec-websocket-accept")
                    .ok_or(HandshakeError::MissingHeader("Sec-WebSocket-Accept"))?;
                if actual != digest.as_str() {
                    return Err(HandshakeError::InvalidAccept {
                        expected: digest.clone(),
                        actual: actual.to_string(),
                    }
                    .into());
                }
                HandshakeAccept::Digest(actual.to_string())
            }
            Expected::Challenge(digest) => {
                if src.len() < head_end + HIXIE_REPLY_LEN {
                    return Ok(None);
                }
                let mut reply = [0u8; HIXIE_REPLY_LEN];
                reply.copy_from_slice(&src[head_end..head_end + HIXIE_REPLY_LEN]);
                if reply != *digest {
                    return Err(HandshakeError::InvalidChallenge.into());
                }
                consumed += HIXIE_REPLY_LEN;
                HandshakeAccept::ChallengeReply(reply)
            }
        };

        // Four-way subprotocol check: silence on both sides is fine, an
        // answer must match an offer, and a one-sided answer is a failure.
        let received = head.headers.get("sec-websocket-protocol").map(str::to_string);
        let offered = &self.config.subprotocols;
        let subprotocol = match (offered.is_empty(), received) {
            (true, None) => None,
            (false, Some(candidate)) if offered.iter().any(|p| *p == candidate) => Some(candidate),
            (_, received) => {
                return Err(HandshakeError::InvalidSubprotocol {
                    selected: received.unwrap_or_default(),
                    offered: offered.join(", "),
                }
                .into());
            }
        };

        src.advance(consumed);
        self.subprotocol = subprotocol.clone();
        self.state = HandshakeState::Complete;
        Ok(Some(HandshakeResponse {
            version: self.version,
            accept,
            subprotocol,
            headers: head.headers,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::ServerHandshaker;
    use crate::handshake::http::parse_request_head;

    fn handshaker(version: WebSocketVersion) -> ClientHandshaker {
        ClientHandshaker::new(Config::client(), version, "server.example.com", "/chat")
    }

    /// Build a well-formed `101` answering `request`, with `extra` header
    /// lines spliced in before the blank line.
    fn accepted_response(request: &[u8], extra: &str) -> BytesMut {
        let head_end = find_head_end(request, 4096).unwrap().unwrap();
        let head = parse_request_head(&request[..head_end]).unwrap();
        let key = head.headers.get("sec-websocket-key").unwrap();
        let accept = compute_accept_key(key);
        BytesMut::from(
            format!(
                "HTTP/1.1 101 Switching Protocols\r\n\
                 Upgrade: websocket\r\n\
                 Connection: Upgrade\r\n\
                 Sec-WebSocket-Accept: {accept}\r\n\
                 {extra}\r\n"
            )
            .as_bytes(),
        )
    }

    #[test]
    fn test_request_contains_required_headers() {
        let mut client = handshaker(WebSocketVersion::V13).with_origin("http://example.com");
        let request = client.request().unwrap();
        assert_eq!(client.state(), HandshakeState::RequestSent);

        let head_end = find_head_end(&request, 4096).unwrap().unwrap();
        assert_eq!(head_end, request.len());
        let head = parse_request_head(&request).unwrap();
        assert_eq!(head.method, "GET");
        assert_eq!(head.target, "/chat");
        assert_eq!(head.headers.get("host"), Some("server.example.com"));
        assert_eq!(head.headers.get("upgrade"), Some("websocket"));
        assert_eq!(head.headers.get("connection"), Some("Upgrade"));
        assert_eq!(head.headers.get("sec-websocket-version"), Some("13"));
        assert_eq!(head.headers.get("origin"), Some("http://example.com"));
        assert!(head.headers.contains("sec-websocket-key"));
    }

    #[test]
    fn test_v07_and_v08_use_sec_websocket_origin() {
        for (version, value) in [(WebSocketVersion::V07, "7"), (WebSocketVersion::V08, "8")] {
            let mut client = handshaker(version).with_origin("http://example.com");
            let request = client.request().unwrap();
            let head = parse_request_head(&request).unwrap();
            assert_eq!(
                head.headers.get("sec-websocket-origin"),
                Some("http://example.com")
            );
            assert!(!head.headers.contains("origin"));
            assert_eq!(head.headers.get("sec-websocket-version"), Some(value));
        }
    }

    #[test]
    fn test_custom_headers_emitted() {
        let mut client = handshaker(WebSocketVersion::V13)
            .with_header("Authorization", "Bearer token")
            .with_header("X-Trace", "abc123");
        let request = client.request().unwrap();
        let head = parse_request_head(&request).unwrap();
        assert_eq!(head.headers.get("authorization"), Some("Bearer token"));
        assert_eq!(head.headers.get("x-trace"), Some("abc123"));
    }

    #[test]
    fn test_header_injection_rejected() {
        let mut client =
            handshaker(WebSocketVersion::V13).with_header("X-Bad", "value\r\nInjected: yes");
        assert!(client.request().is_err());
        assert_eq!(client.state(), HandshakeState::Failed);
    }

    #[test]
    fn test_v13_round_trip() {
        let mut client = ClientHandshaker::new(
            Config::client().with_subprotocols(vec![String::from("chat")]),
            WebSocketVersion::V13,
            "server.example.com",
            "/chat",
        )
        .with_origin("http://example.com");
        let request = client.request().unwrap();

        let mut server = ServerHandshaker::new(
            Config::server().with_subprotocols(vec![String::from("chat")]),
        );
        let mut buf = BytesMut::from(&request[..]);
        let parsed = server.read_request(&mut buf).unwrap().unwrap();
        assert_eq!(parsed.version, WebSocketVersion::V13);
        let response = server.respond(&parsed).unwrap();

        let mut buf = BytesMut::from(&response[..]);
        let verified = client.read_response(&mut buf).unwrap().unwrap();
        assert!(buf.is_empty());
        assert_eq!(client.state(), HandshakeState::Complete);
        assert_eq!(verified.subprotocol.as_deref(), Some("chat"));
        assert_eq!(client.subprotocol(), Some("chat"));
        assert!(matches!(verified.accept, HandshakeAccept::Digest(_)));
    }

    #[test]
    fn test_v00_round_trip() {
        let mut client = ClientHandshaker::new(
            Config::client(),
            WebSocketVersion::V00,
            "server.example.com",
            "/chat",
        )
        .with_origin("http://example.com");
        let request = client.request().unwrap();

        let mut server = ServerHandshaker::new(Config::server());
        let mut buf = BytesMut::from(&request[..]);
        let parsed = server.read_request(&mut buf).unwrap().unwrap();
        assert_eq!(parsed.version, WebSocketVersion::V00);
        let response = server.respond(&parsed).unwrap();

        let mut buf = BytesMut::from(&response[..]);
        let verified = client.read_response(&mut buf).unwrap().unwrap();
        assert!(buf.is_empty());
        assert_eq!(client.state(), HandshakeState::Complete);
        assert!(matches!(verified.accept, HandshakeAccept::ChallengeReply(_)));
    }

    #[test]
    fn test_v00_wrong_challenge_rejected() {
        let mut client = ClientHandshaker::new(
            Config::client(),
            WebSocketVersion::V00,
            "server.example.com",
            "/chat",
        );
        let request = client.request().unwrap();

        let mut server = ServerHandshaker::new(Config::server());
        let mut buf = BytesMut::from(&request[..]);
        let parsed = server.read_request(&mut buf).unwrap().unwrap();
        let response = server.respond(&parsed).unwrap();

        let mut bytes = response.to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let mut buf = BytesMut::from(&bytes[..]);
        assert!(matches!(
            client.read_response(&mut buf),
            Err(crate::error::Error::Handshake(
                HandshakeError::InvalidChallenge
            ))
        ));
        assert_eq!(client.state(), HandshakeState::Failed);
    }

    #[test]
    fn test_v00_waits_for_challenge_reply() {
        let mut client = ClientHandshaker::new(
            Config::client(),
            WebSocketVersion::V00,
            "server.example.com",
            "/chat",
        );
        let request = client.request().unwrap();

        let mut server = ServerHandshaker::new(Config::server());
        let mut buf = BytesMut::from(&request[..]);
        let parsed = server.read_request(&mut buf).unwrap().unwrap();
        let response = server.respond(&parsed).unwrap();

        let mut buf = BytesMut::from(&response[..response.len() - 4]);
        assert!(client.read_response(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&response[response.len() - 4..]);
        assert!(client.read_response(&mut buf).unwrap().is_some());
    }

    #[test]
    fn test_rejects_non_101() {
        let mut client = handshaker(WebSocketVersion::V13);
        client.request().unwrap();
        let mut buf = BytesMut::from(&b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n"[..]);
        assert!(matches!(
            client.read_response(&mut buf),
            Err(crate::error::Error::Handshake(
                HandshakeError::UnexpectedStatus(403)
            ))
        ));
        assert_eq!(client.state(), HandshakeState::Failed);
    }

    #[test]
    fn test_rejects_wrong_accept() {
        let mut client = handshaker(WebSocketVersion::V13);
        client.request().unwrap();
        let mut buf = BytesMut::from(
            &b"HTTP/1.1 101 Switching Protocols\r\n\
               Upgrade: websocket\r\n\
               Connection: Upgrade\r\n\
               Sec-WebSocket-Accept: bm90IHRoZSByaWdodCBkaWdlc3Q=\r\n\r\n"[..],
        );
        assert!(matches!(
            client.read_response(&mut buf),
            Err(crate::error::Error::Handshake(
                HandshakeError::InvalidAccept { .. }
            ))
        ));
    }

    #[test]
    fn test_rejects_missing_upgrade() {
        let mut client = handshaker(WebSocketVersion::V13);
        client.request().unwrap();
        let mut buf = BytesMut::from(
            &b"HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\n\r\n"[..],
        );
        assert!(matches!(
            client.read_response(&mut buf),
            Err(crate::error::Error::Handshake(
                HandshakeError::MissingHeader("Upgrade")
            ))
        ));
    }

    #[test]
    fn test_partial_response_returns_none() {
        let mut client = handshaker(WebSocketVersion::V13);
        let request = client.request().unwrap();
        let response = accepted_response(&request, "");
        let mut buf = BytesMut::from(&response[..20]);
        assert!(client.read_response(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 20);
        buf.extend_from_slice(&response[20..]);
        assert!(client.read_response(&mut buf).unwrap().is_some());
    }

    #[test]
    fn test_unrequested_subprotocol_rejected() {
        let mut client = handshaker(WebSocketVersion::V13);
        let request = client.request().unwrap();
        let mut buf = accepted_response(&request, "Sec-WebSocket-Protocol: chat\r\n");
        assert!(matches!(
            client.read_response(&mut buf),
            Err(crate::error::Error::Handshake(
                HandshakeError::InvalidSubprotocol { .. }
            ))
        ));
    }

    #[test]
    fn test_offered_subprotocol_must_be_answered() {
        let mut client = ClientHandshaker::new(
            Config::client().with_subprotocols(vec![String::from("chat")]),
            WebSocketVersion::V13,
            "server.example.com",
            "/chat",
        );
        let request = client.request().unwrap();
        let mut buf = accepted_response(&request, "");
        assert!(matches!(
            client.read_response(&mut buf),
            Err(crate::error::Error::Handshake(
                HandshakeError::InvalidSubprotocol { .. }
            ))
        ));
    }

    #[test]
    fn test_answer_outside_offer_rejected() {
        let mut client = ClientHandshaker::new(
            Config::client().with_subprotocols(vec![String::from("chat")]),
            WebSocketVersion::V13,
            "server.example.com",
            "/chat",
        );
        let request = client.request().unwrap();
        let mut buf = accepted_response(&request, "Sec-WebSocket-Protocol: graphql-ws\r\n");
        assert!(matches!(
            client.read_response(&mut buf),
            Err(crate::error::Error::Handshake(
                HandshakeError::InvalidSubprotocol { .. }
            ))
        ));
    }

    #[test]
    fn test_response_before_request() {
        let mut client = handshaker(WebSocketVersion::V13);
        let mut buf = BytesMut::from(&b"HTTP/1.1 101 Switching Protocols\r\n\r\n"[..]);
        assert!(matches!(
            client.read_response(&mut buf),
            Err(crate::error::Error::Handshake(
                HandshakeError::NoRequestInFlight
            ))
        ));
    }
}
