//! # Error Taxonomy
//!
//! Purpose: Give every layer of the client (codec, driver, pool, facades) a
//! single closed set of failure kinds.
//!
//! ## Design Principles
//! 1. **Closed Enumeration**: Four kinds only; callers can match exhaustively.
//! 2. **Unmodified Propagation**: Low-level errors bubble up as-is.
//! 3. **Cheap Clones**: IO errors are shared behind an `Arc` so one failure
//!    can be reported against many bulk records.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Result alias used across the workspace.
pub type SonicResult<T> = Result<T, SonicError>;

/// Errors surfaced by the Sonic client.
#[derive(Debug, Clone, Error)]
pub enum SonicError {
    /// Operation attempted on an already-closed driver or pool.
    #[error("sonic connection is closed")]
    ConnectionClosed,

    /// Server replied `ERR ...` or a response line could not be parsed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Dial, read or write failure, including end-of-stream.
    #[error("io error: {0}")]
    Io(Arc<io::Error>),

    /// Unknown channel or action name, or an inconsistent argument set.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl SonicError {
    /// Builds a protocol error from any message.
    pub fn protocol(message: impl Into<String>) -> Self {
        SonicError::Protocol(message.into())
    }

    /// Builds an invalid-argument error from any message.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        SonicError::InvalidArgument(message.into())
    }

    /// Returns the server message for `ERR` replies and parse failures.
    pub fn protocol_message(&self) -> Option<&str> {
        match self {
            SonicError::Protocol(message) => Some(message),
            _ => None,
        }
    }

    /// Returns true for end-of-stream, the signal that the peer went away.
    pub fn is_eof(&self) -> bool {
        matches!(self, SonicError::Io(err) if err.kind() == io::ErrorKind::UnexpectedEof)
    }
}

impl From<io::Error> for SonicError {
    fn from(err: io::Error) -> Self {
        SonicError::Io(Arc::new(err))
    }
}

impl PartialEq for SonicError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SonicError::ConnectionClosed, SonicError::ConnectionClosed) => true,
            (SonicError::Protocol(a), SonicError::Protocol(b)) => a == b,
            (SonicError::InvalidArgument(a), SonicError::InvalidArgument(b)) => a == b,
            (SonicError::Io(a), SonicError::Io(b)) => a.kind() == b.kind(),
            _ => false,
        }
    }
}
