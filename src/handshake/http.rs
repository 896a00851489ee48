//! Minimal HTTP/1.1 head handling for the upgrade exchange.
//!
//! Only what the handshake needs: locate the end of a head in a byte stream,
//! parse request/status lines and headers, and append header lines without
//! letting attacker-controlled values split the head. Everything beyond the
//! upgrade (routing, bodies, chunking) is out of scope.

use std::collections::HashMap;

use bytes::{BufMut, BytesMut};

use crate::error::{Error, HandshakeError, Result};

/// Headers that must not repeat in a request head. A duplicate here is a
/// smuggling attempt, not sloppiness.
const REQUEST_SECURITY_HEADERS: &[&str] = &[
    "host",
    "upgrade",
    "connection",
    "origin",
    "sec-websocket-key",
    "sec-websocket-key1",
    "sec-websocket-key2",
    "sec-websocket-version",
    "sec-websocket-origin",
];

/// Headers that must not repeat in a response head.
const RESPONSE_SECURITY_HEADERS: &[&str] = &["upgrade", "connection", "sec-websocket-accept"];

/// An upgrade head has no business carrying more headers than this.
const MAX_HEADER_COUNT: usize = 64;

/// Case-insensitive header collection; names are lowercased on insert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    map: HashMap<String, String>,
}

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Headers::default()
    }

    /// Insert a header, replacing any previous value.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.map.insert(name.to_ascii_lowercase(), value.into());
    }

    /// Look a header up by name, case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(&name.to_ascii_lowercase())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse `name: value` lines. Lines without a colon are skipped; a
    /// repeated name from `security_headers` is rejected.
    fn parse<'a, I>(lines: I, security_headers: &[&str]) -> Result<Self>
    where
        I: Iterator<Item = &'a str>,
    {
        let mut headers = Headers::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                let name = name.trim().to_ascii_lowercase();
                if security_headers.contains(&name.as_str()) && headers.map.contains_key(&name) {
                    return Err(HandshakeError::MalformedHead(format!(
                        "duplicate header: {name}"
                    ))
                    .into());
                }
                if headers.map.len() >= MAX_HEADER_COUNT {
                    return Err(
                        HandshakeError::MalformedHead("too many headers".into()).into()
                    );
                }
                headers.map.insert(name, value.trim().to_string());
            }
        }
        Ok(headers)
    }
}

/// Parsed request line plus headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    /// Request-target, e.g. `/chat`.
    pub target: String,
    pub headers: Headers,
}

/// Parsed status line plus headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub code: u16,
    pub reason: String,
    pub headers: Headers,
}

/// Find the end of an HTTP head (the byte after `\r\n\r\n`).
///
/// `Ok(None)` means the terminator has not arrived yet. Exceeding `max_len`
/// without one, or with one past the cap, fails with
/// [`HandshakeError::HeadTooLarge`].
pub fn find_head_end(data: &[u8], max_len: usize) -> Result<Option<usize>> {
    if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
        let end = pos + 4;
        if end > max_len {
            return Err(HandshakeError::HeadTooLarge {
                size: end,
                max: max_len,
            }
            .into());
        }
        return Ok(Some(end));
    }
    if data.len() > max_len {
        return Err(HandshakeError::HeadTooLarge {
            size: data.len(),
            max: max_len,
        }
        .into());
    }
    Ok(None)
}

/// Parse a request head (request line through the blank line).
pub fn parse_request_head(data: &[u8]) -> Result<RequestHead> {
    let text = std::str::from_utf8(data)
        .map_err(|_| HandshakeError::MalformedHead("head is not valid UTF-8".into()))?;
    let mut lines = text.lines();

    let request_line = lines
        .next()
        .ok_or_else(|| HandshakeError::MalformedHead("empty request".into()))?;
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(HandshakeError::MalformedHead(format!(
            "bad request line: {request_line:?}"
        ))
        .into());
    }
    if !parts[2].starts_with("HTTP/1.1") {
        return Err(HandshakeError::MalformedHead(format!(
            "expected HTTP/1.1, got {}",
            parts[2]
        ))
        .into());
    }

    Ok(RequestHead {
        method: parts[0].to_string(),
        target: parts[1].to_string(),
        headers: Headers::parse(lines, REQUEST_SECURITY_HEADERS)?,
    })
}

/// Parse a response head (status line through the blank line).
pub fn parse_response_head(data: &[u8]) -> Result<ResponseHead> {
    let text = std::str::from_utf8(data)
        .map_err(|_| HandshakeError::MalformedHead("head is not valid UTF-8".into()))?;
    let mut lines = text.lines();

    let status_line = lines
        .next()
        .ok_or_else(|| HandshakeError::MalformedHead("empty response".into()))?;
    if !status_line.starts_with("HTTP/1.1 ") {
        return Err(HandshakeError::MalformedHead(format!(
            "bad status line: {status_line:?}"
        ))
        .into());
    }
    let rest = &status_line["HTTP/1.1 ".len()..];
    let (code, reason) = match rest.split_once(' ') {
        Some((code, reason)) => (code, reason),
        None => (rest, ""),
    };
    let code: u16 = code
        .parse()
        .map_err(|_| HandshakeError::MalformedHead(format!("bad status code: {code:?}")))?;

    Ok(ResponseHead {
        code,
        reason: reason.to_string(),
        headers: Headers::parse(lines, RESPONSE_SECURITY_HEADERS)?,
    })
}

/// Whether a `Connection` header value carries the `Upgrade` token.
#[must_use]
pub fn connection_has_upgrade(value: &str) -> bool {
    value
        .split(',')
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

/// Append `name: value\r\n`, refusing values that would split the head.
pub fn put_header(buf: &mut BytesMut, name: &str, value: &str) -> Result<()> {
    if value.contains('\r') || value.contains('\n') {
        return Err(Error::Handshake(HandshakeError::InvalidHeaderValue(
            name.to_string(),
        )));
    }
    buf.put_slice(name.as_bytes());
    buf.put_slice(b": ");
    buf.put_slice(value.as_bytes());
    buf.put_slice(b"\r\n");
    Ok(())
}
