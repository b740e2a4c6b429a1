//! Duplex transport seam.
//!
//! The session controller never touches the wire directly. It opens a
//! [`DuplexTransport`], writes audio through the returned [`FrameSink`], and
//! consumes ordered [`InboundEvent`]s from the returned channel. A transport
//! must deliver events in the order the remote peer sent them and must emit
//! exactly one of [`InboundEvent::Completed`] / [`InboundEvent::Failed`] per
//! session.
//!
//! [`ws::WsTransport`] is the production WebSocket implementation; tests use
//! a scripted mock.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::{Result, VocalinkError};
use crate::params::SessionParams;
use crate::result::SessionResult;

pub mod ws;

// ── Inbound events ─────────────────────────────────────────────────

/// A server-pushed message surfaced by the transport.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// Remote peer acknowledged the session; streaming may begin.
    Started,
    /// Incremental recognition/translation payload.
    Result(SessionResult),
    /// The remote stream finished normally.
    Completed,
    /// The remote stream failed.
    Failed(VocalinkError),
}

impl InboundEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_))
    }
}

// ── Outbound sink ──────────────────────────────────────────────────

/// Write half of an open duplex connection. Both calls are non-blocking:
/// implementations hand frames to a dedicated writer task.
pub trait FrameSink: Send + Sync {
    /// Push one audio frame toward the remote peer.
    fn send(&self, frame: Vec<u8>) -> Result<()>;

    /// Signal end-of-stream. No frames are accepted afterwards.
    fn finish(&self);
}

// ── Open request / channel ─────────────────────────────────────────

/// Everything the transport needs to open one session.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    /// Correlation token generated once per session.
    pub request_id: String,
    pub params: SessionParams,
}

/// Handles for one open session: the write half plus the ordered event feed.
pub struct DuplexChannel {
    pub sink: Arc<dyn FrameSink>,
    pub events: mpsc::Receiver<InboundEvent>,
}

/// The persistent, bidirectional connection abstraction.
#[async_trait]
pub trait DuplexTransport: Send + Sync {
    /// Open a session. Resolves once the remote peer has acknowledged it.
    async fn open(&self, request: OpenRequest) -> Result<DuplexChannel>;
}
