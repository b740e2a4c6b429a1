//! Session controllers.
//!
//! Orchestrates `start → send* → stop` over a [`DuplexTransport`]:
//!
//! ```text
//! caller ─▸ send_audio_frame ─▸ FrameBridge ─▸ transport sink ─▸ server
//!                                                                  │
//! listener ◂─ ResultDispatcher ◂─ inbound events ◂─────────────────┘
//!                  │
//!        CompletionGate ◂─ stop() blocks here
//! ```
//!
//! Two variants share one core and differ only where the reference behavior
//! differs:
//!
//! - [`RealtimeSession`] — the server never ends the utterance on its own;
//!   `stop()` re-validates state and errors on a second call.
//! - [`ChatSession`] — a sentence-final event closes the utterance; later
//!   frames are rejected with `Ok(false)` and `stop()` is idempotent.
//!
//! One session is active per controller at a time; `start` performs a full
//! reset so nothing leaks from the previous run.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::bridge::FrameBridge;
use crate::dispatcher::{self, Dispatch, SessionListener};
use crate::error::{Result, VocalinkError};
use crate::gate::CompletionGate;
use crate::latency::LatencyTracker;
use crate::params::SessionParams;
use crate::transport::{DuplexTransport, OpenRequest};

pub mod chat;
pub mod realtime;

pub use chat::ChatSession;
pub use realtime::{RealtimeSession, ResultStream};

// ── Lifecycle state machine ────────────────────────────────────────

/// Lifecycle state of a session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Started,
}

/// `Idle ⇄ Started` state machine shared between the caller-facing surface
/// and the dispatch task.
pub(crate) struct Lifecycle {
    state: Mutex<SessionState>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Idle),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.state() == SessionState::Idle
    }

    /// `Idle → Started`, or `InvalidState` when a session is already live.
    pub(crate) fn transition_to_started(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state == SessionState::Started {
            return Err(VocalinkError::invalid_state(
                "a session is already started on this controller",
            ));
        }
        *state = SessionState::Started;
        Ok(())
    }

    /// Reject lifecycle calls that require a live session.
    pub(crate) fn ensure_started(&self, op: &str) -> Result<()> {
        if self.is_idle() {
            return Err(VocalinkError::invalid_state(format!(
                "{op} called while the session is idle"
            )));
        }
        Ok(())
    }

    pub(crate) fn set_idle(&self) {
        *self.state.lock() = SessionState::Idle;
    }
}

// ── Shared session core ────────────────────────────────────────────

/// State and plumbing shared by both session variants.
pub(crate) struct SessionCore {
    pub(crate) transport: Arc<dyn DuplexTransport>,
    pub(crate) lifecycle: Arc<Lifecycle>,
    pub(crate) bridge: Arc<FrameBridge>,
    pub(crate) gate: Arc<CompletionGate>,
    pub(crate) latency: Arc<LatencyTracker>,
    /// Raised by the dispatcher when a sentence-final event arrives.
    pub(crate) sentence_ended: Arc<AtomicBool>,
    cancel: Mutex<CancellationToken>,
}

impl SessionCore {
    pub(crate) fn new(transport: Arc<dyn DuplexTransport>) -> Self {
        Self {
            transport,
            lifecycle: Arc::new(Lifecycle::new()),
            bridge: Arc::new(FrameBridge::new()),
            gate: Arc::new(CompletionGate::new()),
            latency: Arc::new(LatencyTracker::new()),
            sentence_ended: Arc::new(AtomicBool::new(false)),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Cancellation token of the current session.
    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.lock().clone()
    }

    /// Validate, reset, transition to `Started`, and kick off the transport
    /// open plus the dispatch task in the background. Returns the fresh
    /// request id; frames pushed before the handshake finishes are absorbed
    /// by the bridge.
    pub(crate) fn begin(
        &self,
        params: &SessionParams,
        listener: Box<dyn SessionListener>,
    ) -> Result<String> {
        params.validate()?;
        self.lifecycle.transition_to_started()?;

        let request_id = uuid::Uuid::new_v4().to_string();

        // Full reset — nothing from the previous session may leak.
        self.bridge.reset();
        self.gate.arm();
        self.latency.begin_session(&request_id);
        self.sentence_ended.store(false, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        *self.cancel.lock() = cancel.clone();

        tracing::info!(
            request_id = %request_id,
            model = %params.model,
            source = %params.source_language,
            "Starting streaming session"
        );

        let request = OpenRequest {
            request_id: request_id.clone(),
            params: params.clone(),
        };
        let transport = Arc::clone(&self.transport);
        let bridge = Arc::clone(&self.bridge);
        let gate = Arc::clone(&self.gate);
        let latency = Arc::clone(&self.latency);
        let sentence_ended = Arc::clone(&self.sentence_ended);
        let lifecycle = Arc::clone(&self.lifecycle);
        let rid = request_id.clone();

        tokio::spawn(async move {
            match transport.open(request).await {
                Ok(channel) => {
                    if let Err(e) = bridge.attach(channel.sink) {
                        // The sink died during the drain; the transport will
                        // surface the failure through its event feed.
                        tracing::warn!(request_id = %rid, error = %e, "Sink drain failed");
                    }
                    dispatcher::run(Dispatch {
                        events: channel.events,
                        listener,
                        latency,
                        gate,
                        sentence_ended,
                        lifecycle,
                        cancel,
                        request_id: rid,
                    })
                    .await;
                }
                Err(error) => {
                    tracing::error!(request_id = %rid, error = %error, "Transport open failed");
                    let mut listener = listener;
                    listener.on_error(error.clone());
                    lifecycle.set_idle();
                    gate.release(Err(error));
                }
            }
        });

        Ok(request_id)
    }

    /// Forward one frame, stamping the stream-start milestone on first use.
    pub(crate) fn push_frame(&self, frame: Vec<u8>, op: &str) -> Result<()> {
        self.lifecycle.ensure_started(op)?;
        self.latency.mark_start();
        self.bridge.push(frame)
    }

    /// Push the stop marker and block until the terminal signal.
    pub(crate) async fn finish_and_wait(&self) -> Result<()> {
        self.latency.mark_stop_requested();
        self.bridge.push_stop();
        self.gate.wait().await
    }
}

// ── Test transport ─────────────────────────────────────────────────
