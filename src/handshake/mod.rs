//! HTTP Upgrade handshake for every supported protocol version.
//!
//! Versions 07, 08, and 13 authenticate with the `Sec-WebSocket-Key` nonce
//! and the SHA-1 accept digest; the pre-standard hixie-76 exchange uses two
//! space-and-digit keys plus an 8-byte body challenge answered with an MD5
//! digest. [`ClientHandshaker`] and [`ServerHandshaker`] drive the two roles;
//! this module holds the version tag, the key arithmetic, and the
//! request/response value types both roles share.

pub mod client;
pub mod http;
pub mod server;

pub use client::ClientHandshaker;
pub use server::ServerHandshaker;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use md5::Md5;
use sha1::{Digest, Sha1};

use crate::error::{HandshakeError, Result};
use crate::handshake::http::Headers;

/// GUID appended to the client key before hashing (RFC 6455 Section 1.3).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Wire protocol version, as negotiated during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WebSocketVersion {
    /// hixie-76 / hybi-00. Predates `Sec-WebSocket-Version`; selected when
    /// the header is absent.
    V00,
    /// hybi-07.
    V07,
    /// hybi-10, which reports itself as version 8.
    V08,
    /// RFC 6455.
    V13,
}

impl WebSocketVersion {
    /// Value carried in `Sec-WebSocket-Version`, if the version has one.
    #[must_use]
    pub const fn header_value(self) -> Option<&'static str> {
        match self {
            WebSocketVersion::V00 => None,
            WebSocketVersion::V07 => Some("7"),
            WebSocketVersion::V08 => Some("8"),
            WebSocketVersion::V13 => Some("13"),
        }
    }

    /// Map a `Sec-WebSocket-Version` value to a version tag.
    #[must_use]
    pub fn from_header_value(value: &str) -> Option<Self> {
        match value.trim() {
            "7" => Some(WebSocketVersion::V07),
            "8" => Some(WebSocketVersion::V08),
            "13" => Some(WebSocketVersion::V13),
            _ => None,
        }
    }

    /// Name of the origin header this version uses in requests.
    #[must_use]
    pub const fn origin_header_name(self) -> &'static str {
        match self {
            WebSocketVersion::V07 | WebSocketVersion::V08 => "Sec-WebSocket-Origin",
            _ => "Origin",
        }
    }
}

impl std::fmt::Display for WebSocketVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebSocketVersion::V00 => write!(f, "0"),
            WebSocketVersion::V07 => write!(f, "7"),
            WebSocketVersion::V08 => write!(f, "8"),
            WebSocketVersion::V13 => write!(f, "13"),
        }
    }
}

/// Version-specific client credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeKey {
    /// Base64 nonce sent as `Sec-WebSocket-Key` (versions 07+).
    Nonce(String),
    /// hixie-76 `Sec-WebSocket-Key1`/`Key2` plus the 8-byte body challenge.
    Hixie {
        key1: String,
        key2: String,
        challenge: [u8; 8],
    },
}

/// The upgrade request, as parsed by a server. Clients emit request bytes
/// directly and configure extras through [`ClientHandshaker`] builders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub version: WebSocketVersion,
    /// Request-target, e.g. `/chat`.
    pub target: String,
    pub host: String,
    pub key: HandshakeKey,
    pub origin: Option<String>,
    /// Subprotocols the client asks for, in preference order.
    pub subprotocols: Vec<String>,
    /// Raw `Sec-WebSocket-Extensions` tokens; carried, never negotiated.
    pub extensions: Vec<String>,
    /// Every header from the parsed request head.
    pub headers: Headers,
}

/// The server's reply to the upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeAccept {
    /// `Sec-WebSocket-Accept` digest (versions 07+).
    Digest(String),
    /// 16-byte MD5 body answering the hixie-76 challenge.
    ChallengeReply([u8; 16]),
}

/// The upgrade response, as parsed by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    pub version: WebSocketVersion,
    pub accept: HandshakeAccept,
    /// Subprotocol the server selected, if any.
    pub subprotocol: Option<String>,
    pub headers: Headers,
}

/// Compute the `Sec-WebSocket-Accept` value for a client key:
/// `base64(sha1(key + GUID))`.
///
/// ```
/// use wsproto::handshake::compute_accept_key;
///
/// let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate the 16-byte nonce for `Sec-WebSocket-Key`, base64-encoded.
#[must_use]
pub fn generate_nonce() -> String {
    let mut nonce = [0u8; 16];
    fill_random(&mut nonce);
    BASE64.encode(nonce)
}

/// Extract the number hidden in a hixie-76 key: the concatenated digits
/// divided by the space count.
///
/// # Errors
///
/// `InvalidKey` when the key has no digits, no spaces, or more digits than a
/// `u64` can hold.
pub fn hixie_key_number(key: &str) -> Result<u32> {
    let digits: String = key.chars().filter(char::is_ascii_digit).collect();
    let spaces = key.chars().filter(|&c| c == ' ').count();
    if digits.is_empty() || spaces == 0 {
        return Err(
            HandshakeError::InvalidKey(format!("malformed challenge key: {key:?}")).into(),
        );
    }
    let number: u64 = digits.parse().map_err(|_| {
        HandshakeError::InvalidKey(format!("challenge key digits overflow: {key:?}"))
    })?;
    // The draft guarantees the quotient fits 32 bits; hostile input is
    // truncated the same way the reference servers truncate it.
    Ok((number / spaces as u64) as u32)
}

/// Answer a hixie-76 challenge: MD5 over key1 and key2 (big-endian) followed
/// by the 8 body bytes.
#[must_use]
pub fn hixie_challenge_response(key1: u32, key2: u32, challenge: &[u8; 8]) -> [u8; 16] {
    let mut input = [0u8; 16];
    input[..4].copy_from_slice(&key1.to_be_bytes());
    input[4..8].copy_from_slice(&key2.to_be_bytes());
    input[8..].copy_from_slice(challenge);
    Md5::digest(input).into()
}

/// A freshly generated hixie-76 credential set.
#[derive(Debug, Clone)]
pub(crate) struct HixieChallenge {
    /// Value for `Sec-WebSocket-Key1`.
    pub key1: String,
    /// Value for `Sec-WebSocket-Key2`.
    pub key2: String,
    /// 8-byte request body.
    pub challenge: [u8; 8],
    /// MD5 reply the server must produce.
    pub expected: [u8; 16],
}

/// Build a hixie-76 key pair and body challenge along with the reply the
/// server must produce for them.
pub(crate) fn generate_hixie_key() -> HixieChallenge {
    let (key1, number1) = hixie_key_string();
    let (key2, number2) = hixie_key_string();
    let mut challenge = [0u8; 8];
    fill_random(&mut challenge);
    let expected = hixie_challenge_response(number1, number2, &challenge);
    HixieChallenge {
        key1,
        key2,
        challenge,
        expected,
    }
}

/// One hixie-76 key: a product of a number and a space count, with junk
/// characters and exactly that many spaces mixed in.
fn hixie_key_string() -> (String, u32) {
    let spaces = random_range(1, 12);
    let number = random_range(0, 0x7FFF_FFFF / spaces);
    let product = number * spaces;

    let mut key = product.to_string();
    // 1..=12 junk characters from the draft's two printable ranges, never
    // digits or spaces.
    for _ in 0..random_range(1, 12) {
        let junk: u8 = if random_range(0, 1) == 0 {
            0x21 + (random_range(0, 0x2F - 0x21)) as u8
        } else {
            0x3A + (random_range(0, 0x7E - 0x3A)) as u8
        };
        let pos = random_range(0, key.len() as u32) as usize;
        key.insert(pos, char::from(junk));
    }
    // Spaces go strictly inside the key, never first or last.
    for _ in 0..spaces {
        let pos = 1 + random_range(0, key.len() as u32 - 2) as usize;
        key.insert(pos, ' ');
    }
    (key, number)
}

/// Pick the subprotocol: first candidate the client listed that the server
/// supports. `"*"` in the supported list accepts any candidate. The client's
/// preference order wins over the server's list order.
#[must_use]
pub fn select_subprotocol<'a>(requested: &'a [String], supported: &[String]) -> Option<&'a str> {
    for candidate in requested {
        for pattern in supported {
            if pattern == "*" || pattern == candidate {
                return Some(candidate);
            }
        }
    }
    None
}

/// Split a comma-separated header value into trimmed, non-empty tokens.
pub(crate) fn split_tokens(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fill `buf` from the system RNG, with a time-seeded fallback.
fn fill_random(buf: &mut [u8]) {
    if getrandom::getrandom(buf).is_ok() {
        return;
    }
    use std::time::{SystemTime, UNIX_EPOCH};
    let mut state = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x12345678)
        | 1;
    for b in buf.iter_mut() {
        state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        *b = (z ^ (z >> 31)) as u8;
    }
}

/// Uniform-ish random integer in `min..=max`.
fn random_range(min: u32, max: u32) -> u32 {
    let mut buf = [0u8; 4];
    fill_random(&mut buf);
    min + u32::from_le_bytes(buf) % (max - min + 1)
}
