//! Timed single-connection transport.

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::stream::TransportStream;
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};

/// Maximum bytes a single read may request (5 MiB).
pub const READ_MAX_LEN: usize = 5 * 1024 * 1024;

/// Buffer growth step for reads; keeps short replies from allocating the full request.
const READ_CHUNK: usize = 64 * 1024;

/// A single connection with deadline-bounded reads and writes.
///
/// Every wait on the underlying stream is bounded by the configured receive or
/// send deadline. The deadline is re-armed on each loop iteration, so a peer
/// that keeps trickling bytes can stretch a call indefinitely; use
/// [`Transport::read_within`] / [`Transport::write_within`] to also bound the
/// whole call.
pub struct Transport<S: TransportStream = TcpStream> {
    config: TransportConfig,
    stream: Option<S>,
}

impl<S: TransportStream> Transport<S> {
    /// Creates a new transport (not yet connected).
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            stream: None,
        }
    }

    /// Wraps an already-open stream with placeholder host/port.
    pub fn from_stream(stream: S) -> Self {
        Self::with_stream(TransportConfig::injected(), stream)
    }

    /// Wraps an already-open stream with the given deadlines.
    pub fn with_stream(config: TransportConfig, stream: S) -> Self {
        Self {
            config,
            stream: Some(stream),
        }
    }

    /// Replaces the connection handle, releasing any previous one.
    pub fn set_stream(&mut self, stream: S) {
        if self.stream.replace(stream).is_some() {
            tracing::debug!("Replaced existing stream handle");
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Returns whether a connection is held.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Opens the connection. Does nothing if already connected.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Ok(());
        }
        if self.config.host.is_empty() {
            return Err(TransportError::NoHost);
        }
        if self.config.port == 0 {
            return Err(TransportError::NoPort);
        }

        let host = self.config.host.clone();
        let port = self.config.port;
        tracing::debug!("Connecting to {}:{}...", host, port);

        let stream = timeout(self.config.connect_timeout(), S::open(&host, port))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connection timed out"))
            .and_then(|r| r)
            .map_err(|source| {
                tracing::debug!("Connection to {}:{} failed: {}", host, port, source);
                TransportError::Connect {
                    host: host.clone(),
                    port,
                    source,
                }
            })?;

        tracing::debug!("Connected to {}:{}", host, port);
        self.stream = Some(stream);
        Ok(())
    }

    /// Closes the connection. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            tracing::debug!("Closing connection...");
            let deadline = self.config.send_deadline.as_duration();
            if let Ok(Err(e)) = timeout(deadline, stream.shutdown()).await {
                tracing::debug!("Shutdown failed: {}", e);
            }
            tracing::debug!("Connection closed");
        }
    }

    /// Repositions the stream at its start, if it supports seeking.
    pub async fn rewind(&mut self) -> Result<(), TransportError> {
        if let Some(stream) = self.stream.as_mut() {
            stream.rewind().await.map_err(TransportError::Rewind)?;
        }
        Ok(())
    }

    /// Reads up to `len` bytes.
    ///
    /// Stops early at end of stream; with `verify_exact` a short result is
    /// reported as [`TransportError::ShortRead`] instead.
    pub async fn read(&mut self, len: usize, verify_exact: bool) -> Result<Bytes, TransportError> {
        self.read_until(len, verify_exact, None).await
    }

    /// Like [`Transport::read`], but the whole call must finish within `budget`.
    pub async fn read_within(
        &mut self,
        len: usize,
        verify_exact: bool,
        budget: Duration,
    ) -> Result<Bytes, TransportError> {
        self.read_until(len, verify_exact, Some(Instant::now() + budget))
            .await
    }

    /// Writes the whole buffer, returning its length.
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        self.write_until(buf, None).await
    }

    /// Like [`Transport::write`], but the whole call must finish within `budget`.
    pub async fn write_within(
        &mut self,
        buf: &[u8],
        budget: Duration,
    ) -> Result<usize, TransportError> {
        self.write_until(buf, Some(Instant::now() + budget)).await
    }

    async fn read_until(
        &mut self,
        len: usize,
        verify_exact: bool,
        overall: Option<Instant>,
    ) -> Result<Bytes, TransportError> {
        if len > READ_MAX_LEN {
            return Err(TransportError::ReadTooLarge {
                requested: len,
                max: READ_MAX_LEN,
            });
        }
        let per_wait = self.config.recv_deadline.as_duration();
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

        let mut buf = BytesMut::with_capacity(len.min(READ_CHUNK));

        while buf.len() < len {
            let remaining = len - buf.len();
            buf.reserve(remaining.min(READ_CHUNK));
            let wait_until = next_wait(per_wait, overall);
            let mut limited = (&mut *stream).take(remaining as u64);
            let n = match timeout_at(wait_until, limited.read_buf(&mut buf)).await {
                Err(_) if buf.is_empty() => {
                    tracing::debug!("Read timed out waiting for {} bytes", len);
                    return Err(TransportError::ReadTimeout {
                        requested: len,
                        read: 0,
                    });
                }
                Err(_) => {
                    // Bytes already taken off the stream are kept for the caller.
                    tracing::debug!("Read went idle after {} of {} bytes", buf.len(), len);
                    break;
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => match e.kind() {
                    io::ErrorKind::Interrupted => continue,
                    io::ErrorKind::TimedOut => {
                        return Err(TransportError::ReadTimeout {
                            requested: len,
                            read: buf.len(),
                        })
                    }
                    io::ErrorKind::WouldBlock => {
                        return Err(TransportError::ReadStalled {
                            requested: len,
                            read: buf.len(),
                        })
                    }
                    _ => {
                        return Err(TransportError::Read {
                            remaining,
                            source: e,
                        })
                    }
                },
            };

            if n == 0 {
                tracing::trace!("End of stream after {} of {} bytes", buf.len(), len);
                break;
            }
        }

        let filled = buf.len();
        if filled < len && verify_exact {
            return Err(TransportError::ShortRead {
                requested: len,
                read: filled,
                shortfall: len - filled,
            });
        }

        Ok(buf.freeze())
    }

    async fn write_until(
        &mut self,
        buf: &[u8],
        overall: Option<Instant>,
    ) -> Result<usize, TransportError> {
        let per_wait = self.config.send_deadline.as_duration();
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

        let total = buf.len();
        let mut written = 0;

        while written < total {
            let wait_until = next_wait(per_wait, overall);
            match timeout_at(wait_until, stream.write(&buf[written..])).await {
                Err(_) => {
                    tracing::debug!("Write timed out after {} of {} bytes", written, total);
                    return Err(TransportError::WriteTimeout { total, written });
                }
                Ok(Ok(0)) => {
                    return Err(TransportError::Write {
                        total,
                        written,
                        source: io::ErrorKind::WriteZero.into(),
                    })
                }
                Ok(Ok(n)) => {
                    written += n;
                    if written < total {
                        tracing::trace!("Partial write: {} of {} bytes", written, total);
                    }
                }
                Ok(Err(e)) => {
                    write_failure(e, total, written)?;
                }
            }
        }

        // Flushing is bounded like any other wait.
        loop {
            let wait_until = next_wait(per_wait, overall);
            match timeout_at(wait_until, stream.flush()).await {
                Err(_) => return Err(TransportError::WriteTimeout { total, written }),
                Ok(Ok(())) => break,
                Ok(Err(e)) => write_failure(e, total, written)?,
            }
        }

        Ok(written)
    }
}

impl Transport<TcpStream> {
    /// Wraps an externally opened, connected std TCP stream.
    ///
    /// The handle is switched to non-blocking mode. Listening or unconnected
    /// sockets are rejected. Must be called within a Tokio runtime.
    pub fn from_std(stream: std::net::TcpStream) -> Result<Self, TransportError> {
        stream.peer_addr().map_err(|e| {
            TransportError::InvalidHandle(format!("stream is not connected: {}", e))
        })?;
        stream
            .set_nonblocking(true)
            .map_err(|e| TransportError::InvalidHandle(e.to_string()))?;
        let stream =
            TcpStream::from_std(stream).map_err(|e| TransportError::InvalidHandle(e.to_string()))?;
        Ok(Self::from_stream(stream))
    }
}

impl<S: TransportStream> fmt::Debug for Transport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl<S: TransportStream> Drop for Transport<S> {
    fn drop(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!("Transport dropped while connected, releasing connection");
        }
    }
}

/// Ends a single readiness wait at the earlier of its own deadline and the
/// whole-call budget.
fn next_wait(per_wait: Duration, overall: Option<Instant>) -> Instant {
    let own = Instant::now() + per_wait;
    match overall {
        Some(limit) => own.min(limit),
        None => own,
    }
}

/// Maps a failed write or flush; `Ok(())` means retry the wait.
fn write_failure(e: io::Error, total: usize, written: usize) -> Result<(), TransportError> {
    match e.kind() {
        io::ErrorKind::Interrupted => Ok(()),
        io::ErrorKind::TimedOut => Err(TransportError::WriteTimeout { total, written }),
        io::ErrorKind::WouldBlock => Err(TransportError::WriteStalled { total, written }),
        _ => Err(TransportError::Write {
            total,
            written,
            source: e,
        }),
    }
}
