//! Stream types the transport can drive.

use std::future::Future;
use std::io::{self, SeekFrom};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncSeekExt, AsyncWrite, DuplexStream};
use tokio::net::TcpStream;

/// A duplex byte stream usable as a transport connection.
///
/// Implementors must be driven without blocking the calling thread; every
/// wait on them happens inside a deadline-bounded readiness wait.
pub trait TransportStream: AsyncRead + AsyncWrite + Unpin + Send + Sized {
    /// Dials a new connection to `host:port`.
    ///
    /// Stream types that cannot be dialed report `Unsupported`.
    fn open(host: &str, port: u16) -> impl Future<Output = io::Result<Self>> + Send {
        let target = format!("{}:{}", host, port);
        async move {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("stream type cannot dial {}", target),
            ))
        }
    }

    /// Repositions the stream at its start. Non-seekable streams ignore this.
    fn rewind(&mut self) -> impl Future<Output = io::Result<()>> + Send {
        async { Ok(()) }
    }
}

impl TransportStream for TcpStream {
    async fn open(host: &str, port: u16) -> io::Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true).ok();
        Ok(stream)
    }
}

#[cfg(unix)]
impl TransportStream for tokio::net::UnixStream {}

/// In-memory pipe, see [`tokio::io::duplex`].
impl TransportStream for DuplexStream {}

/// File-backed stream, mostly useful for replaying captured traffic.
impl TransportStream for File {
    async fn rewind(&mut self) -> io::Result<()> {
        self.seek(SeekFrom::Start(0)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_duplex_cannot_dial() {
        let err = DuplexStream::open("localhost", 9092).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        assert!(err.to_string().contains("localhost:9092"));
    }

    #[tokio::test]
    async fn test_duplex_rewind_is_noop() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(b"abc").await.unwrap();
        TransportStream::rewind(&mut b).await.unwrap();

        let mut buf = [0u8; 3];
        b.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"abc");
    }

    #[tokio::test]
    async fn test_file_rewind_seeks_to_start() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"0123456789").unwrap();

        let mut file = File::open(tmp.path()).await.unwrap();
        let mut buf = [0u8; 4];
        file.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"0123");

        TransportStream::rewind(&mut file).await.unwrap();
        file.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"0123");
    }

    #[tokio::test]
    async fn test_tcp_open_refused() {
        // Bind then drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(TcpStream::open("127.0.0.1", port).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unix_pair_roundtrip() {
        use crate::Transport;
        use tokio::net::UnixStream;

        let err = UnixStream::open("localhost", 9092).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);

        let (client, mut peer) = UnixStream::pair().unwrap();
        let mut transport = Transport::from_stream(client);
        assert!(transport.is_connected());

        assert_eq!(transport.write(b"ping").await.unwrap(), 4);
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        peer.write_all(b"pong").await.unwrap();
        let reply = transport.read(4, true).await.unwrap();
        assert_eq!(&reply[..], b"pong");

        transport.close().await;
        let n = peer.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }
}
