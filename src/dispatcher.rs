//! Inbound event dispatch.
//!
//! Runs as one spawned task per session: consumes the transport's ordered
//! event feed, converts and filters it, and forwards to the caller through a
//! [`SessionListener`]. Lifecycle-marker pseudo-events (a completion sentinel
//! with no recognition payload) are suppressed; everything else is surfaced
//! in exact arrival order.
//!
//! The dispatcher owns the terminal contract: exactly one of `on_complete` /
//! `on_error` fires per session, the lifecycle returns to idle, and the
//! completion gate is released so a blocked `stop()` (or batch call) wakes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::VocalinkError;
use crate::gate::CompletionGate;
use crate::latency::LatencyTracker;
use crate::result::SessionResult;
use crate::session::Lifecycle;
use crate::transport::InboundEvent;

// ── Listener surface ───────────────────────────────────────────────

/// Caller-facing callback interface. Mirrors the dispatcher's decisions
/// exactly: zero or more `on_event` calls in arrival order, then exactly one
/// of `on_complete` / `on_error`.
pub trait SessionListener: Send + 'static {
    /// A non-suppressed recognition/translation result.
    fn on_event(&mut self, result: SessionResult);

    /// The server-side stream finished normally.
    fn on_complete(&mut self) {}

    /// The server-side stream failed.
    fn on_error(&mut self, _error: VocalinkError) {}
}

// ── Dispatch loop ──────────────────────────────────────────────────

/// Everything one dispatch task needs, moved in at spawn time.
pub(crate) struct Dispatch {
    pub events: mpsc::Receiver<InboundEvent>,
    pub listener: Box<dyn SessionListener>,
    pub latency: Arc<LatencyTracker>,
    pub gate: Arc<CompletionGate>,
    pub sentence_ended: Arc<AtomicBool>,
    pub lifecycle: Arc<Lifecycle>,
    /// Cancelled on error so an in-flight batch file reader stops.
    pub cancel: CancellationToken,
    pub request_id: String,
}

pub(crate) async fn run(dispatch: Dispatch) {
    let Dispatch {
        mut events,
        mut listener,
        latency,
        gate,
        sentence_ended,
        lifecycle,
        cancel,
        request_id,
    } = dispatch;

    let mut terminal = false;

    while let Some(event) = events.recv().await {
        match event {
            InboundEvent::Started => {
                tracing::debug!(request_id = %request_id, "Transport acknowledged session");
            }
            InboundEvent::Result(result) => {
                if result.is_lifecycle_marker() {
                    tracing::debug!(request_id = %request_id, "Suppressing lifecycle marker");
                    continue;
                }
                // Only results the caller actually sees count as the first
                // package.
                latency.mark_first_package();
                if result.is_sentence_end() {
                    sentence_ended.store(true, Ordering::SeqCst);
                }
                listener.on_event(result);
            }
            InboundEvent::Completed => {
                latency.mark_completed();
                tracing::info!(request_id = %request_id, "Session completed");
                listener.on_complete();
                lifecycle.set_idle();
                gate.release(Ok(()));
                terminal = true;
                break;
            }
            InboundEvent::Failed(error) => {
                tracing::error!(request_id = %request_id, error = %error, "Session failed");
                cancel.cancel();
                listener.on_error(error.clone());
                lifecycle.set_idle();
                gate.release(Err(error));
                terminal = true;
                break;
            }
        }
    }

    // Transport dropped its channel without a terminal signal — treat it
    // as a failure so the caller still gets exactly one terminal callback.
    if !terminal {
        let error = VocalinkError::transport("event stream ended without completion");
        tracing::error!(request_id = %request_id, error = %error, "Session aborted");
        cancel.cancel();
        listener.on_error(error.clone());
        lifecycle.set_idle();
        gate.release(Err(error));
    }

    tracing::debug!(request_id = %request_id, "Dispatcher terminated");
}

// ── Tests ──────────────────────────────────────────────────────────
