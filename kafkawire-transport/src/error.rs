//! Transport error types.

use std::fmt;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("unable to read {requested} bytes from stream, max length is {max}")]
    ReadTooLarge { requested: usize, max: usize },

    #[error("invalid stream handle: {0}")]
    InvalidHandle(String),

    #[error("cannot open null host")]
    NoHost,

    #[error("cannot open without port")]
    NoPort,

    #[error("could not connect to {}:{} -> {}", .host, .port, describe_os_error(.source))]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("not connected")]
    NotConnected,

    #[error("error reading {remaining} bytes from stream: {source}")]
    Read {
        remaining: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("stream signalled readable but yielded no data reading {requested} bytes ({read} read)")]
    ReadStalled { requested: usize, read: usize },

    #[error("could not write {total} bytes to stream, completed writing only {written} bytes: {source}")]
    Write {
        total: usize,
        written: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to rewind stream: {0}")]
    Rewind(#[source] std::io::Error),

    #[error("could not write {total} bytes to stream, not writable after {written} bytes")]
    WriteStalled { total: usize, written: usize },

    #[error("stream timed out reading {requested} bytes ({read} read)")]
    ReadTimeout { requested: usize, read: usize },

    #[error("timed out writing {total} bytes to stream after writing {written} bytes")]
    WriteTimeout { total: usize, written: usize },

    #[error("needed to read {requested} bytes, instead read {read} bytes ({shortfall} short)")]
    ShortRead {
        requested: usize,
        read: usize,
        shortfall: usize,
    },
}

/// Broad failure categories callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid input; no I/O was attempted.
    Argument,
    /// The connection could not be established.
    Connection,
    /// Hard read/write failure or an unexpected readiness signal.
    Io,
    /// A readiness wait expired.
    Timeout,
    /// End of stream before an exact-length read completed.
    ShortRead,
}

impl TransportError {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::ReadTooLarge { .. } | TransportError::InvalidHandle(_) => {
                ErrorKind::Argument
            }
            TransportError::NoHost | TransportError::NoPort | TransportError::Connect { .. } => {
                ErrorKind::Connection
            }
            TransportError::NotConnected
            | TransportError::Read { .. }
            | TransportError::ReadStalled { .. }
            | TransportError::Rewind(_)
            | TransportError::Write { .. }
            | TransportError::WriteStalled { .. } => ErrorKind::Io,
            TransportError::ReadTimeout { .. } | TransportError::WriteTimeout { .. } => {
                ErrorKind::Timeout
            }
            TransportError::ShortRead { .. } => ErrorKind::ShortRead,
        }
    }

    /// Returns whether this error is retryable.
    ///
    /// The transport never retries on its own; this only tells the caller
    /// whether a resend or reconnect could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Connect { .. } => true,
            TransportError::NotConnected => false,
            _ => matches!(
                self.kind(),
                ErrorKind::Io | ErrorKind::Timeout | ErrorKind::ShortRead
            ),
        }
    }

    /// Returns the number of bytes moved before the failure, if the
    /// operation got that far.
    pub fn bytes_completed(&self) -> Option<usize> {
        match self {
            TransportError::ReadStalled { read, .. }
            | TransportError::ReadTimeout { read, .. }
            | TransportError::ShortRead { read, .. } => Some(*read),
            TransportError::Write { written, .. }
            | TransportError::WriteStalled { written, .. }
            | TransportError::WriteTimeout { written, .. } => Some(*written),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Argument => write!(f, "ARGUMENT"),
            ErrorKind::Connection => write!(f, "CONNECTION"),
            ErrorKind::Io => write!(f, "IO"),
            ErrorKind::Timeout => write!(f, "TIMEOUT"),
            ErrorKind::ShortRead => write!(f, "SHORT_READ"),
        }
    }
}

fn describe_os_error(err: &std::io::Error) -> String {
    match err.raw_os_error() {
        Some(errno) => format!("{} ({})", err, errno),
        None => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_kinds() {
        let err = TransportError::ReadTooLarge {
            requested: 10,
            max: 5,
        };
        assert_eq!(err.kind(), ErrorKind::Argument);
        assert_eq!(
            TransportError::InvalidHandle("listener".into()).kind(),
            ErrorKind::Argument
        );
        assert_eq!(TransportError::NoHost.kind(), ErrorKind::Connection);
        assert_eq!(TransportError::NoPort.kind(), ErrorKind::Connection);
        assert_eq!(TransportError::NotConnected.kind(), ErrorKind::Io);
        assert_eq!(
            TransportError::ReadTimeout {
                requested: 4,
                read: 0
            }
            .kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            TransportError::ShortRead {
                requested: 4,
                read: 2,
                shortfall: 2
            }
            .kind(),
            ErrorKind::ShortRead
        );
    }

    #[test]
    fn test_retryable() {
        assert!(TransportError::WriteTimeout {
            total: 8,
            written: 3
        }
        .is_retryable());
        assert!(TransportError::Connect {
            host: "broker".into(),
            port: 9092,
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        }
        .is_retryable());

        assert!(!TransportError::NoHost.is_retryable());
        assert!(!TransportError::NotConnected.is_retryable());
        assert!(!TransportError::ReadTooLarge {
            requested: 10,
            max: 5
        }
        .is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = TransportError::ShortRead {
            requested: 10,
            read: 4,
            shortfall: 6,
        };
        assert_eq!(
            err.to_string(),
            "needed to read 10 bytes, instead read 4 bytes (6 short)"
        );

        let err = TransportError::WriteTimeout {
            total: 100,
            written: 40,
        };
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("40"));

        let err = TransportError::Connect {
            host: "broker-1".into(),
            port: 9092,
            source: io::Error::from_raw_os_error(111),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("could not connect to broker-1:9092 -> "));
        assert!(msg.ends_with("(111)"));
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::Argument.to_string(), "ARGUMENT");
        assert_eq!(ErrorKind::Timeout.to_string(), "TIMEOUT");
        assert_eq!(ErrorKind::ShortRead.to_string(), "SHORT_READ");
        let err = TransportError::NoHost;
        assert_eq!(format!("[{}] {}", err.kind(), err), "[CONNECTION] cannot open null host");
    }

    #[test]
    fn test_bytes_completed() {
        let err = TransportError::Write {
            total: 10,
            written: 7,
            source: io::Error::from(io::ErrorKind::BrokenPipe),
        };
        assert_eq!(err.bytes_completed(), Some(7));
        assert_eq!(TransportError::NoPort.bytes_completed(), None);
    }
}
