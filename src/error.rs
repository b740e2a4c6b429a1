//! Error taxonomy for the streaming client.
//!
//! Three failure classes cross the API boundary:
//! - [`VocalinkError::InvalidArgument`] — a required parameter is missing or
//!   empty; raised synchronously before any session state changes.
//! - [`VocalinkError::InvalidState`] — a lifecycle call arrived out of order;
//!   also raised synchronously.
//! - [`VocalinkError::Transport`] — any failure surfaced by the duplex
//!   transport, including protocol-level errors from the remote peer. Always
//!   delivered asynchronously (listener `on_error` / stream error) and to any
//!   caller blocked in `stop()`.
//!
//! The error is `Clone` so a single transport failure can reach both the
//! listener and the blocked `stop()` caller; the underlying cause is shared
//! behind an `Arc` and stays reachable through `std::error::Error::source`.

use std::fmt;
use std::sync::Arc;

/// Cloneable wrapper around an underlying transport cause.
#[derive(Debug, Clone)]
pub struct SharedCause(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl fmt::Display for SharedCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SharedCause {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Unified error type exposed by every public operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VocalinkError {
    /// A required parameter is null-equivalent (missing or empty).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A lifecycle method was called out of order.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A failure surfaced by the duplex transport.
    #[error("transport failure: {message}")]
    Transport {
        /// Error code supplied by the remote peer, when present.
        code: Option<String>,
        message: String,
        #[source]
        source: Option<SharedCause>,
    },
}

impl VocalinkError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Transport failure wrapping an underlying cause (I/O, TLS, websocket).
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            code: None,
            message: message.into(),
            source: Some(SharedCause(Arc::new(source))),
        }
    }

    /// Protocol-level failure reported by the remote peer.
    pub fn remote(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            code: Some(code.into()),
            message: message.into(),
            source: None,
        }
    }

    /// Remote error code, when the failure came from the peer.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Transport { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, VocalinkError>;

// ── Tests ──────────────────────────────────────────────────────────
