//! Accepted connections and the write side shared with response envelopes.
//!
//! The read half of an accepted stream is owned by its connection handler;
//! the write half lives in [`Connection`] so that responses produced during
//! dispatch can reach the peer immediately.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;

use super::message::MessageError;

static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Byte stream an endpoint can frame and answer on.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Sync + Unpin {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Sync + Unpin {}

/// Type-erased stream so TCP and Unix connections share one handler.
pub type BoxedStream = Box<dyn AsyncStream>;

/// Process-unique identifier for an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    fn next() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Write side and identity of one accepted connection.
pub struct Connection {
    id: ConnectionId,
    remote_addr: String,
    writer: Mutex<Option<WriteHalf<BoxedStream>>>,
    closed: AtomicBool,
}

impl Connection {
    /// Splits `stream`, keeping the write half and returning the read half.
    pub fn new<S>(stream: S, remote_addr: impl Into<String>) -> (Arc<Self>, ReadHalf<BoxedStream>)
    where
        S: AsyncStream + 'static,
    {
        let boxed: BoxedStream = Box::new(stream);
        let (reader, writer) = tokio::io::split(boxed);
        let conn = Arc::new(Self {
            id: ConnectionId::next(),
            remote_addr: remote_addr.into(),
            writer: Mutex::new(Some(writer)),
            closed: AtomicBool::new(false),
        });
        (conn, reader)
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Writes all of `buf` to the peer and flushes.
    ///
    /// # Errors
    ///
    /// Returns `MessageError::ConnectionClosed` after [`close`](Self::close),
    /// or the underlying I/O error.
    pub async fn write(&self, buf: &[u8]) -> Result<(), MessageError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(MessageError::ConnectionClosed)?;
        writer.write_all(buf).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Shuts down the write side. Returns `false` if already closed.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(mut writer) = self.writer.lock().await.take() {
            // Peer may already be gone; nothing left to report to.
            let _ = writer.shutdown().await;
        }
        true
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[test]
    fn connection_ids_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert_eq!(ConnectionId(7).to_string(), "conn-7");
    }

    #[tokio::test]
    async fn write_reaches_peer() {
        let (server, mut client) = tokio::io::duplex(64);
        let (conn, _reader) = Connection::new(server, "127.0.0.1:4000");
        assert_eq!(conn.remote_addr(), "127.0.0.1:4000");

        conn.write(b"hello\n").await.unwrap();

        let mut buf = [0u8; 6];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello\n");
    }

    #[tokio::test]
    async fn close_is_idempotent_and_signals_eof() {
        let (server, mut client) = tokio::io::duplex(64);
        let (conn, _reader) = Connection::new(server, "peer");

        assert!(conn.close().await);
        assert!(!conn.close().await);
        assert!(conn.is_closed());

        let mut buf = Vec::new();
        let n = client.read_to_end(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn write_after_close_fails() {
        let (server, _client) = tokio::io::duplex(64);
        let (conn, _reader) = Connection::new(server, "peer");
        conn.close().await;

        let err = conn.write(b"late").await.unwrap_err();
        assert!(matches!(err, MessageError::ConnectionClosed));
    }
}
