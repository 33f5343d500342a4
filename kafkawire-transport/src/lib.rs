//! # kafkawire-transport
//!
//! Timeout-bounded byte transport for the kafkawire broker client.
//!
//! This crate provides:
//! - A single-connection transport with per-wait receive and send deadlines
//! - Exact-length reads capped at [`READ_MAX_LEN`] bytes
//! - Whole-buffer writes that absorb partial writes
//! - Injection of already-open stream handles
//!
//! Framing and request correlation live in the protocol layer on top of this
//! crate; the transport only moves raw bytes.

pub mod config;
pub mod error;
pub mod stream;
pub mod transport;

pub use config::{ConfigError, Deadline, TransportConfig};
pub use error::{ErrorKind, TransportError};
pub use stream::TransportStream;
pub use transport::{Transport, READ_MAX_LEN};
