use std::fmt;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::config::Config;
use crate::connection::{CloseState, Role, Session};
use crate::error::{Error, Result};
use crate::handshake::{ClientHandshaker, ServerHandshaker, WebSocketVersion};
use crate::protocol::Frame;
use crate::status::CloseStatus;

/// A WebSocket connection over an async I/O stream.
///
/// `Connection` drives a [`Session`] against a tokio transport: it performs
/// the opening handshake, pumps inbound bytes through the session, and writes
/// whatever the session stages (pongs, close echoes, application frames).
///
/// ## Type Parameters
///
/// - `T`: The underlying async I/O stream (e.g., `TcpStream`, `TlsStream`)
///
/// ## Example
///
/// ```rust,ignore
/// use wsproto::{ClientHandshaker, Config, Connection, Frame, WebSocketVersion};
///
/// let stream = tokio::net::TcpStream::connect("localhost:8080").await?;
/// let handshake = ClientHandshaker::new(
///     Config::client(),
///     WebSocketVersion::V13,
///     "localhost:8080",
///     "/chat",
/// );
/// let mut conn = Connection::client(stream, handshake).await?;
///
/// conn.send_text("Hello").await?;
/// while let Some(frame) = conn.next_frame().await? {
///     println!("Received: {:?}", frame.opcode());
/// }
/// ```
pub struct Connection<T> {
    transport: T,
    session: Session,
    read_buf: BytesMut,
    subprotocol: Option<String>,
    force_close_timeout: Option<Duration>,
}

impl<T> Connection<T> {
    /// Wrap a stream whose upgrade handshake already happened elsewhere.
    ///
    /// Use [`Connection::client`] or [`Connection::server`] to run the
    /// handshake here instead.
    pub fn new(transport: T, role: Role, version: WebSocketVersion, config: &Config) -> Self {
        Connection {
            transport,
            session: Session::new(role, version, config),
            read_buf: BytesMut::with_capacity(4096),
            subprotocol: None,
            force_close_timeout: config.force_close_timeout,
        }
    }

    /// Protocol session this connection drives.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Progress of the close-frame exchange.
    pub fn close_state(&self) -> CloseState {
        self.session.close_state()
    }

    /// Whether frames can still be sent.
    pub fn is_open(&self) -> bool {
        self.session.close_state().can_send()
    }

    /// Wire version negotiated during the handshake.
    pub fn version(&self) -> WebSocketVersion {
        self.session.version()
    }

    /// Subprotocol agreed during the handshake, if any.
    pub fn subprotocol(&self) -> Option<&str> {
        self.subprotocol.as_deref()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    /// Consume the connection, returning the underlying stream.
    pub fn into_inner(self) -> T {
        self.transport
    }
}

impl<T> fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("session", &self.session)
            .field("subprotocol", &self.subprotocol)
            .finish_non_exhaustive()
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> Connection<T> {
    /// Connect as a client: send the upgrade request, verify the response,
    /// and wrap the stream in a frame-level connection.
    ///
    /// The whole exchange is bounded by the configuration's
    /// `handshake_timeout`.
    ///
    /// ## Errors
    ///
    /// - [`Error::HandshakeTimedOut`] if the server does not answer in time
    /// - [`Error::Handshake`] if the response fails verification
    /// - I/O errors from the underlying stream
    pub async fn client(transport: T, handshake: ClientHandshaker) -> Result<Self> {
        let limit = handshake.config().handshake_timeout;
        match timeout(limit, Self::client_handshake(transport, handshake)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("client handshake timed out after {limit:?}");
                Err(Error::HandshakeTimedOut)
            }
        }
    }

    /// Accept as a server: read and validate the upgrade request, then send
    /// the 101 response.
    ///
    /// Invalid requests are answered with the mapped HTTP rejection before
    /// the error is returned. The whole exchange is bounded by the
    /// configuration's `handshake_timeout`.
    pub async fn server(transport: T, config: Config) -> Result<Self> {
        let limit = config.handshake_timeout;
        match timeout(limit, Self::server_handshake(transport, config)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("server handshake timed out after {limit:?}");
                Err(Error::HandshakeTimedOut)
            }
        }
    }

    async fn client_handshake(mut transport: T, mut handshake: ClientHandshaker) -> Result<Self> {
        let config = handshake.config().clone();
        let request = handshake.request()?;
        transport.write_all(&request).await?;
        transport.flush().await?;

        let mut buf = BytesMut::with_capacity(4096);
        let response = loop {
            if let Some(response) = handshake.read_response(&mut buf)? {
                break response;
            }
            let n = transport.read_buf(&mut buf).await?;
            if n == 0 {
                return Err(Error::Io("connection closed during handshake".into()));
            }
        };
        debug!(
            "client handshake complete, version {}, subprotocol {:?}",
            handshake.version(),
            response.subprotocol
        );

        Ok(Connection {
            session: Session::new(Role::Client, handshake.version(), &config),
            transport,
            read_buf: buf,
            subprotocol: response.subprotocol,
            force_close_timeout: config.force_close_timeout,
        })
    }

    async fn server_handshake(mut transport: T, config: Config) -> Result<Self> {
        let mut handshake = ServerHandshaker::new(config.clone());
        let mut buf = BytesMut::with_capacity(4096);
        let outcome = loop {
            match handshake.read_request(&mut buf) {
                Ok(Some(request)) => {
                    break handshake.respond(&request).map(|bytes| (request, bytes));
                }
                Ok(None) => {
                    let n = transport.read_buf(&mut buf).await?;
                    if n == 0 {
                        return Err(Error::Io("connection closed during handshake".into()));
                    }
                }
                Err(err) => break Err(err),
            }
        };
        let (request, response) = match outcome {
            Ok(accepted) => accepted,
            Err(err) => {
                // Best effort; the handshake error is what matters.
                let rejection = handshake.rejection_response(&err);
                let _ = transport.write_all(&rejection).await;
                let _ = transport.flush().await;
                return Err(err);
            }
        };
        transport.write_all(&response).await?;
        transport.flush().await?;
        debug!(
            "server handshake complete, version {}, subprotocol {:?}",
            request.version,
            handshake.subprotocol()
        );

        Ok(Connection {
            session: Session::new(Role::Server, request.version, &config),
            transport,
            read_buf: buf,
            subprotocol: handshake.subprotocol().map(str::to_owned),
            force_close_timeout: config.force_close_timeout,
        })
    }

    /// Receive the next application-visible frame.
    ///
    /// Pings are answered automatically, fragments are reassembled, and the
    /// close handshake is completed according to the configured policies.
    /// Returns `Ok(None)` once the close handshake is done.
    ///
    /// ## Errors
    ///
    /// - Protocol violations from the peer (the mapped close frame goes out
    ///   first when `close_on_protocol_violation` is set)
    /// - I/O errors, including an EOF before the close handshake finished
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            let received = self.session.receive(&mut self.read_buf);
            let flushed = self.flush_output().await;
            let frame = received?;
            flushed?;
            match frame {
                Some(frame) => return Ok(Some(frame)),
                None => {
                    if self.session.is_closed() {
                        return Ok(None);
                    }
                    let n = self.transport.read_buf(&mut self.read_buf).await?;
                    if n == 0 {
                        return if self.session.is_closed() {
                            Ok(None)
                        } else {
                            Err(Error::Io(
                                "connection reset without closing handshake".into(),
                            ))
                        };
                    }
                }
            }
        }
    }

    /// Encode and write a frame.
    ///
    /// ## Errors
    ///
    /// - [`Error::ClosedChannel`] once our close frame has gone out
    /// - I/O errors from the underlying stream
    pub async fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        self.session.send(frame)?;
        self.flush_output().await
    }

    /// Send a text frame.
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<()> {
        self.send_frame(&Frame::text(text)).await
    }

    /// Send a binary frame.
    pub async fn send_binary(&mut self, data: impl Into<Bytes>) -> Result<()> {
        self.send_frame(&Frame::binary(data)).await
    }

    /// Send a ping frame.
    pub async fn ping(&mut self, payload: impl Into<Bytes>) -> Result<()> {
        self.send_frame(&Frame::ping(payload)).await
    }

    /// Run the closing handshake.
    ///
    /// Sends a Close frame carrying `status`, then reads (and discards)
    /// frames until the peer's Close arrives or the stream ends. When the
    /// configuration sets `force_close_timeout`, waiting longer than that
    /// fails with [`Error::CloseTimedOut`]. Calling this after the close
    /// handshake has already started is a no-op.
    ///
    /// The underlying stream is not shut down; drop the connection or call
    /// [`into_inner`](Connection::into_inner) afterwards.
    pub async fn close(&mut self, status: Option<CloseStatus>) -> Result<()> {
        if !self.session.close_state().can_send() {
            return Ok(());
        }
        self.session.close(status)?;
        self.flush_output().await?;

        match self.force_close_timeout {
            Some(limit) => match timeout(limit, self.drain_until_closed()).await {
                Ok(()) => Ok(()),
                Err(_) => {
                    warn!("close handshake timed out after {limit:?}");
                    Err(Error::CloseTimedOut)
                }
            },
            None => {
                self.drain_until_closed().await;
                Ok(())
            }
        }
    }

    /// Discard frames until the peer answers our close or gives up.
    async fn drain_until_closed(&mut self) {
        while !self.session.is_closed() {
            match self.next_frame().await {
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            }
        }
    }

    async fn flush_output(&mut self) -> Result<()> {
        if let Some(bytes) = self.session.take_output() {
            self.transport.write_all(&bytes).await?;
            self.transport.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OpCode;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    struct MockStream {
        read_data: Cursor<Vec<u8>>,
        write_data: Vec<u8>,
    }

    impl MockStream {
        fn new(data: Vec<u8>) -> Self {
            Self {
                read_data: Cursor::new(data),
                write_data: Vec::new(),
            }
        }

        fn written(&self) -> &[u8] {
            &self.write_data
        }
    }

    impl AsyncRead for MockStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            let pos = self.read_data.position() as usize;
            let data = self.read_data.get_ref();
            if pos >= data.len() {
                return Poll::Ready(Ok(()));
            }
            let remaining = &data[pos..];
            let to_copy = std::cmp::min(remaining.len(), buf.remaining());
            buf.put_slice(&remaining[..to_copy]);
            self.read_data.set_position((pos + to_copy) as u64);
            Poll::Ready(Ok(()))
        }
    }

    impl AsyncWrite for MockStream {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            self.write_data.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn server_conn(data: Vec<u8>) -> Connection<MockStream> {
        Connection::new(
            MockStream::new(data),
            Role::Server,
            WebSocketVersion::V13,
            &Config::server(),
        )
    }

    #[test]
    fn test_new_connection_is_open() {
        let conn = server_conn(vec![]);
        assert!(conn.is_open());
        assert_eq!(conn.close_state(), CloseState::Open);
        assert_eq!(conn.version(), WebSocketVersion::V13);
        assert!(conn.subprotocol().is_none());
    }

    #[test]
    fn test_debug_summarizes_state() {
        // MockStream itself is not Debug; the connection still is.
        let conn = server_conn(vec![]);
        let rendered = format!("{conn:?}");
        assert!(rendered.contains("Connection"), "got: {rendered}");
        assert!(rendered.contains("Server"), "got: {rendered}");
        assert!(rendered.contains("V13"), "got: {rendered}");
    }

    #[tokio::test]
    async fn test_send_text_frame() {
        let mut conn = server_conn(vec![]);
        conn.send_text("Hello").await.unwrap();

        let written = conn.into_inner();
        assert_eq!(written.written()[0], 0x81);
        assert_eq!(written.written()[1], 0x05);
        assert_eq!(&written.written()[2..7], b"Hello");
    }

    #[tokio::test]
    async fn test_next_frame_text() {
        // Masked "Hello": mask [0x37, 0xfa, 0x21, 0x3d]
        let data = vec![
            0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
        ];
        let mut conn = server_conn(data);

        let frame = conn.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.opcode(), OpCode::Text);
        assert_eq!(frame.payload().as_ref(), b"Hello");
    }

    #[tokio::test]
    async fn test_ping_answered_before_next_frame() {
        // Masked ping "ping" then masked text "hi", both with identity masks.
        let data = vec![
            0x89, 0x84, 0x00, 0x00, 0x00, 0x00, 0x70, 0x69, 0x6e, 0x67, 0x81, 0x82, 0x00, 0x00,
            0x00, 0x00, b'h', b'i',
        ];
        let mut conn = server_conn(data);

        let frame = conn.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.opcode(), OpCode::Text);

        let written = conn.into_inner();
        assert_eq!(written.written()[0], 0x8A);
        assert_eq!(written.written()[1], 0x04);
        assert_eq!(&written.written()[2..6], b"ping");
    }

    #[tokio::test]
    async fn test_close_echoed_then_none() {
        // Masked close with code 1000, identity mask.
        let data = vec![0x88, 0x82, 0x00, 0x00, 0x00, 0x00, 0x03, 0xe8];
        let mut conn = server_conn(data);

        let frame = conn.next_frame().await.unwrap().unwrap();
        assert_eq!(frame.opcode(), OpCode::Close);
        assert_eq!(conn.close_state(), CloseState::Closed);
        assert_eq!(conn.get_ref().written()[0], 0x88);

        assert!(conn.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_without_close_errors() {
        let mut conn = server_conn(vec![]);
        assert!(matches!(conn.next_frame().await, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_close_then_send_fails() {
        let mut conn = server_conn(vec![]);
        conn.close(Some(CloseStatus::NORMAL_CLOSURE)).await.unwrap();
        assert!(matches!(
            conn.send_text("late").await,
            Err(Error::ClosedChannel)
        ));

        // A second close is a quiet no-op.
        conn.close(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_close_waits_for_peer_ack() {
        // Peer sends a text frame and then its close answer.
        let data = vec![
            0x81, 0x82, 0x00, 0x00, 0x00, 0x00, b'h', b'i', 0x88, 0x82, 0x00, 0x00, 0x00, 0x00,
            0x03, 0xe8,
        ];
        let mut conn = server_conn(data);

        conn.close(Some(CloseStatus::NORMAL_CLOSURE)).await.unwrap();
        assert_eq!(conn.close_state(), CloseState::Closed);
        assert_eq!(
            conn.session().peer_close_status().map(CloseStatus::code),
            Some(1000)
        );
    }

    #[tokio::test]
    async fn test_close_times_out_on_silent_peer() {
        let (local, _peer) = tokio::io::duplex(256);
        let config = Config::server().with_force_close_timeout(Some(Duration::from_millis(50)));
        let mut conn = Connection::new(local, Role::Server, WebSocketVersion::V13, &config);

        let result = conn.close(Some(CloseStatus::GOING_AWAY)).await;
        assert!(matches!(result, Err(Error::CloseTimedOut)));
    }

    #[tokio::test]
    async fn test_violation_surfaces_after_close_goes_out() {
        // Unmasked text breaks the server's masking requirement.
        let data = vec![0x81, 0x02, b'h', b'i'];
        let mut conn = server_conn(data);

        let err = conn.next_frame().await.unwrap_err();
        assert_eq!(err.close_status().map(CloseStatus::code), Some(1002));
        assert_eq!(conn.get_ref().written()[0], 0x88);
    }
}
