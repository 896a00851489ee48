//! Server side of the upgrade handshake.
//!
//! [`ServerHandshaker`] consumes the client's upgrade request out of a byte
//! buffer, applies the version, key, and origin policy, and emits either the
//! matching `101` response or a rejection. One instance serves one connection.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::debug;

use crate::config::Config;
use crate::connection::HandshakeState;
use crate::error::{Error, HandshakeError, Result};
use crate::handshake::http::{connection_has_upgrade, find_head_end, parse_request_head, put_header};
use crate::handshake::{
    HandshakeKey, HandshakeRequest, WebSocketVersion, compute_accept_key,
    hixie_challenge_response, hixie_key_number, select_subprotocol, split_tokens,
};

/// Bytes of challenge body that follow a hixie-76 request head.
const HIXIE_CHALLENGE_LEN: usize = 8;

/// Server side of the upgrade exchange.
///
/// Drive it with [`read_request`](Self::read_request) until a full request is
/// buffered, then [`respond`](Self::respond). Any error maps to a rejection
/// via [`rejection_response`](Self::rejection_response).
#[derive(Debug)]
pub struct ServerHandshaker {
    config: Config,
    state: HandshakeState,
    version: Option<WebSocketVersion>,
    subprotocol: Option<String>,
}

impl ServerHandshaker {
    #[must_use]
    pub fn new(config: Config) -> Self {
        ServerHandshaker {
            config,
            state: HandshakeState::Idle,
            version: None,
            subprotocol: None,
        }
    }

    /// Current handshake progress.
    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Version negotiated by [`respond`](Self::respond), once complete.
    #[must_use]
    pub fn version(&self) -> Option<WebSocketVersion> {
        self.version
    }

    /// Subprotocol selected by [`respond`](Self::respond), if any.
    #[must_use]
    pub fn subprotocol(&self) -> Option<&str> {
        self.subprotocol.as_deref()
    }

    /// Try to read one complete upgrade request from `src`.
    ///
    /// Returns `Ok(None)` until the head (and, for hixie-76, the 8-byte
    /// challenge body) is fully buffered; nothing is consumed before that.
    /// On success the request bytes are consumed and any surplus is left in
    /// `src`. Errors leave `src` untouched and mark the handshake failed.
    pub fn read_request(&mut self, src: &mut BytesMut) -> Result<Option<HandshakeRequest>> {
        match self.parse_request(src) {
            Ok(request) => Ok(request),
            Err(err) => {
                self.state = HandshakeState::Failed;
                Err(err)
            }
        }
    }

    fn parse_request(&mut self, src: &mut BytesMut) -> Result<Option<HandshakeRequest>> {
        let Some(head_end) = find_head_end(src, self.config.max_handshake_len)? else {
            return Ok(None);
        };
        let head = parse_request_head(&src[..head_end])?;
        if head.method != "GET" {
            return Err(HandshakeError::InvalidMethod(head.method).into());
        }

        let headers = &head.headers;
        let upgrade = headers
            .get("upgrade")
            .ok_or(HandshakeError::MissingHeader("Upgrade"))?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(HandshakeError::InvalidUpgrade(upgrade.to_string()).into());
        }
        let connection = headers
            .get("connection")
            .ok_or(HandshakeError::MissingHeader("Connection"))?;
        if !connection_has_upgrade(connection) {
            return Err(HandshakeError::InvalidConnection(connection.to_string()).into());
        }
        let host = headers
            .get("host")
            .ok_or(HandshakeError::MissingHeader("Host"))?
            .to_string();

        // An absent version header is how hixie-76 clients identify
        // themselves; an unrecognized value is a rejection.
        let version = match headers.get("sec-websocket-version") {
            Some(value) => WebSocketVersion::from_header_value(value)
                .ok_or_else(|| HandshakeError::UnsupportedVersion(value.to_string()))?,
            None => WebSocketVersion::V00,
        };

        let mut consumed = head_end;
        let key = match version {
            WebSocketVersion::V00 => {
                let key1 = headers
                    .get("sec-websocket-key1")
                    .ok_or(HandshakeError::MissingHeader("Sec-WebSocket-Key1"))?
                    .to_string();
                let key2 = headers
                    .get("sec-websocket-key2")
                    .ok_or(HandshakeError::MissingHeader("Sec-WebSocket-Key2"))?
                    .to_string();
                if src.len() < head_end + HIXIE_CHALLENGE_LEN {
                    return Ok(None);
                }
                let mut challenge = [0u8; HIXIE_CHALLENGE_LEN];
                challenge.copy_from_slice(&src[head_end..head_end + HIXIE_CHALLENGE_LEN]);
                consumed += HIXIE_CHALLENGE_LEN;
                HandshakeKey::Hixie {
                    key1,
                    key2,
                    challenge,
                }
            }
            _ => {
                let key = headers
                    .get("sec-websocket-key")
                    .ok_or(HandshakeError::MissingHeader("Sec-WebSocket-Key"))?
                    .to_string();
                match BASE64.decode(&key) {
                    Ok(raw) if raw.len() == 16 => {}
                    _ => return Err(HandshakeError::InvalidKey(key).into()),
                }
                HandshakeKey::Nonce(key)
            }
        };

        let origin = headers
            .get(version.origin_header_name())
            .or_else(|| headers.get("origin"))
            .map(str::to_string);
        let subprotocols = headers
            .get("sec-websocket-protocol")
            .map(split_tokens)
            .unwrap_or_default();
        let extensions = headers
            .get("sec-websocket-extensions")
            .map(split_tokens)
            .unwrap_or_default();

        src.advance(consumed);
        Ok(Some(HandshakeRequest {
            version,
            target: head.target,
            host,
            key,
            origin,
            subprotocols,
            extensions,
            headers: head.headers,
        }))
    }

    /// Build the `101` response accepting `request`.
    ///
    /// Applies the origin allow-list, selects a subprotocol, and computes the
    /// version-appropriate proof (accept digest or MD5 challenge body). On
    /// success the handshake is complete and frames may flow.
    pub fn respond(&mut self, request: &HandshakeRequest) -> Result<Bytes> {
        match self.build_response(request) {
            Ok(response) => {
                self.version = Some(request.version);
                self.state = HandshakeState::Complete;
                Ok(response)
            }
            Err(err) => {
                self.state = HandshakeState::Failed;
                Err(err)
            }
        }
    }

    fn build_response(&mut self, request: &HandshakeRequest) -> Result<Bytes> {
        if self.config.allowed_origins.is_some() {
            // With an allow-list configured, a request without an origin is
            // rejected the same as one with a foreign origin.
            let origin = request.origin.clone().unwrap_or_default();
            if !self.config.origin_allowed(&origin) {
                return Err(HandshakeError::OriginNotAllowed(origin).into());
            }
        }

        let selected = if request.subprotocols.is_empty() {
            None
        } else {
            let choice = select_subprotocol(&request.subprotocols, &self.config.subprotocols);
            if choice.is_none() {
                debug!(
                    "no overlap between requested subprotocols {:?} and supported {:?}",
                    request.subprotocols, self.config.subprotocols
                );
            }
            choice
        };

        let mut buf = BytesMut::with_capacity(256);
        match &request.key {
            HandshakeKey::Nonce(key) => {
                buf.put_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
                buf.put_slice(b"Upgrade: websocket\r\n");
                buf.put_slice(b"Connection: Upgrade\r\n");
                put_header(&mut buf, "Sec-WebSocket-Accept", &compute_accept_key(key))?;
                if let Some(protocol) = selected {
                    put_header(&mut buf, "Sec-WebSocket-Protocol", protocol)?;
                }
                buf.put_slice(b"\r\n");
            }
            HandshakeKey::Hixie {
                key1,
                key2,
                challenge,
            } => {
                let reply = hixie_challenge_response(
                    hixie_key_number(key1)?,
                    hixie_key_number(key2)?,
                    challenge,
                );
                buf.put_slice(b"HTTP/1.1 101 WebSocket Protocol Handshake\r\n");
                buf.put_slice(b"Upgrade: WebSocket\r\n");
                buf.put_slice(b"Connection: Upgrade\r\n");
                if let Some(origin) = &request.origin {
                    put_header(&mut buf, "Sec-WebSocket-Origin", origin)?;
                }
                let location = format!("ws://{}{}", request.host, request.target);
                put_header(&mut buf, "Sec-WebSocket-Location", &location)?;
                if let Some(protocol) = selected {
                    put_header(&mut buf, "Sec-WebSocket-Protocol", protocol)?;
                }
                buf.put_slice(b"\r\n");
                buf.put_slice(&reply);
            }
        }

        self.subprotocol = selected.map(str::to_string);
        Ok(buf.freeze())
    }

    /// Build the HTTP rejection for a failed handshake.
    ///
    /// An unsupported version value gets `426` advertising version 13, a
    /// disallowed origin gets `403`, and every other failure gets `400` with
    /// the error text as the body.
    pub fn rejection_response(&mut self, err: &Error) -> Bytes {
        self.state = HandshakeState::Failed;
        let (status, advertise_version, body) = match err {
            Error::Handshake(HandshakeError::UnsupportedVersion(_)) => {
                ("426 Upgrade Required", true, String::new())
            }
            Error::Handshake(HandshakeError::OriginNotAllowed(_)) => {
                ("403 Forbidden", false, err.to_string())
            }
            _ => ("400 Bad Request", false, err.to_string()),
        };

        let mut buf = BytesMut::with_capacity(128 + body.len());
        buf.put_slice(b"HTTP/1.1 ");
        buf.put_slice(status.as_bytes());
        buf.put_slice(b"\r\n");
        if advertise_version {
            buf.put_slice(b"Sec-WebSocket-Version: 13\r\n");
        }
        buf.put_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
        buf.put_slice(body.as_bytes());
        buf.freeze()
    }
}
