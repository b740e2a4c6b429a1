//! Chat session variant.
//!
//! Single-utterance mode: the server closes the utterance as soon as it
//! detects the end of a sentence. Two surface differences from
//! [`RealtimeSession`](super::RealtimeSession):
//!
//! - `send_audio_frame` returns `Ok(bool)` — `Ok(false)` means the utterance
//!   already closed and the frame was not sent, which callers treat as the
//!   cue to stop pushing audio.
//! - `stop` is idempotent: only the first call per session does anything.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::SessionCore;
use crate::dispatcher::SessionListener;
use crate::error::Result;
use crate::params::SessionParams;
use crate::transport::DuplexTransport;

/// Streaming session for one server-terminated utterance.
pub struct ChatSession {
    core: SessionCore,
    /// Set by the first `stop` of the current session.
    stopped: AtomicBool,
}

impl ChatSession {
    pub fn new(transport: Arc<dyn DuplexTransport>) -> Self {
        Self {
            core: SessionCore::new(transport),
            stopped: AtomicBool::new(false),
        }
    }

    /// Start a chat session. Same contract as the realtime variant: returns
    /// immediately, frames queue until the handshake completes, and the
    /// controller is reusable once the previous session fully completed.
    pub fn start(&self, params: &SessionParams, listener: impl SessionListener) -> Result<()> {
        // Cleared before the lifecycle flips to Started so a send racing
        // with start can never observe the previous session's stop flag.
        // Harmless when `begin` then fails: the lifecycle guard still
        // rejects sends and stops while idle.
        self.stopped.store(false, Ordering::SeqCst);
        self.core.begin(params, Box::new(listener))?;
        Ok(())
    }

    /// Push one audio frame. `Ok(true)` when the frame was accepted,
    /// `Ok(false)` once the utterance has closed (sentence end seen or stop
    /// already requested) — the frame is discarded, not an error.
    pub fn send_audio_frame(&self, frame: Vec<u8>) -> Result<bool> {
        self.core.lifecycle.ensure_started("send_audio_frame")?;
        if self.stopped.load(Ordering::SeqCst)
            || self.core.sentence_ended.load(Ordering::SeqCst)
        {
            tracing::debug!("Utterance closed; dropping audio frame");
            return Ok(false);
        }
        self.core.latency.mark_start();
        self.core.bridge.push(frame)?;
        Ok(true)
    }

    /// Signal end-of-audio and block until the utterance result stream
    /// finishes. Repeated calls within one session are silent no-ops.
    pub async fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            tracing::debug!("Stop already requested; ignoring");
            return Ok(());
        }
        if let Err(error) = self.core.lifecycle.ensure_started("stop") {
            self.stopped.store(false, Ordering::SeqCst);
            return Err(error);
        }
        self.core.finish_and_wait().await
    }

    // ── Diagnostics ───────────────────────────────────────────────

    /// Stream start to first inbound result, milliseconds.
    pub fn first_package_delay(&self) -> Option<i64> {
        self.core.latency.first_package_delay()
    }

    /// Stop request to stream completion, milliseconds.
    pub fn last_package_delay(&self) -> Option<i64> {
        self.core.latency.last_package_delay()
    }

    /// Correlation token of the most recently started session.
    pub fn last_request_id(&self) -> Option<String> {
        self.core.latency.last_request_id()
    }
}

// ── Tests ──────────────────────────────────────────────────────────
