//! The `error` module defines the error types used within `mom`.
//!
//! Each layer owns one enum: the wire codec, the durable log, the broker's
//! record handling and the producer/consumer clients. Broker-side errors are
//! always scoped to a single connection; the connection handler logs them and
//! closes that connection.

use std::io;
use std::path::PathBuf;

use tokio_util::codec::LinesCodecError;

/// Failure to frame or parse a record on the wire.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("frame exceeds maximum length of {max} bytes")]
    FrameTooLong { max: usize },

    #[error("malformed record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    pub(crate) fn from_lines(err: LinesCodecError, max: usize) -> Self {
        match err {
            LinesCodecError::MaxLineLengthExceeded => CodecError::FrameTooLong { max },
            LinesCodecError::Io(e) => CodecError::Io(e),
        }
    }
}

/// Failure to open or write the append-only log.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to open log at {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to append to log: {0}")]
    Append(#[source] io::Error),
}

/// Failure while the broker handles one inbound record.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl BrokerError {
    pub fn protocol(message: impl Into<String>) -> Self {
        BrokerError::Protocol(message.into())
    }
}

/// Failure while a producer or consumer sets up its connection.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("connecting to {addr} timed out after {timeout_ms}ms")]
    ConnectTimeout { addr: String, timeout_ms: u64 },

    #[error("subscribe handshake timed out after {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u64 },

    #[error("subscribe handshake failed: {0}")]
    Handshake(String),

    #[error("invalid filter expression '{0}'")]
    InvalidFilter(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("connection to broker closed")]
    Closed,
}
