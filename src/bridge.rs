//! Push-to-pull bridge for the outbound audio stream.
//!
//! The caller pushes frames synchronously; the transport's write half only
//! exists once the connection handshake finishes. [`FrameBridge`] resolves
//! that race: frames pushed before the sink attaches are queued FIFO under a
//! single mutex and drained, in submission order, the moment the sink
//! arrives. After the drain, pushes forward directly.
//!
//! A stop marker always wins: once `push_stop` has been accepted, no further
//! audio is taken, and a drain that reaches the marker finishes the sink and
//! discards anything behind it. Stop never truncates audio accepted before
//! it — queued frames are delivered first, then the stream is closed.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::Result;
use crate::transport::FrameSink;

/// A queued unit of outbound work.
enum PendingFrame {
    Audio(Vec<u8>),
    Stop,
}

#[derive(Default)]
struct BridgeInner {
    sink: Option<Arc<dyn FrameSink>>,
    queue: VecDeque<PendingFrame>,
    stopped: bool,
}

/// Synchronous `push`/`push_stop` facade over a once-attached [`FrameSink`].
pub struct FrameBridge {
    inner: Mutex<BridgeInner>,
}

impl Default for FrameBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBridge {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BridgeInner::default()),
        }
    }

    /// Forward a frame to the sink, or queue it until one attaches.
    /// Frames arriving after the stop marker are silently dropped.
    pub fn push(&self, frame: Vec<u8>) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.stopped {
            return Ok(());
        }
        match inner.sink.clone() {
            Some(sink) => sink.send(frame),
            None => {
                inner.queue.push_back(PendingFrame::Audio(frame));
                Ok(())
            }
        }
    }

    /// Signal end-of-stream. Queued audio is still delivered first when the
    /// sink attaches later; repeated calls are no-ops.
    pub fn push_stop(&self) {
        let mut inner = self.inner.lock();
        if inner.stopped {
            return;
        }
        inner.stopped = true;
        match inner.sink.clone() {
            Some(sink) => sink.finish(),
            None => inner.queue.push_back(PendingFrame::Stop),
        }
    }

    /// Attach the live sink and drain the queue in submission order. Held
    /// under the bridge lock so no direct forward can interleave mid-drain.
    pub fn attach(&self, sink: Arc<dyn FrameSink>) -> Result<()> {
        let mut inner = self.inner.lock();
        let drained: Vec<PendingFrame> = inner.queue.drain(..).collect();
        inner.sink = Some(sink.clone());
        for frame in drained {
            match frame {
                PendingFrame::Audio(bytes) => sink.send(bytes)?,
                PendingFrame::Stop => {
                    // Stop wins — finish now, ignore anything queued after it.
                    sink.finish();
                    break;
                }
            }
        }
        Ok(())
    }

    /// Discard all per-session state before reuse.
    pub fn reset(&self) {
        *self.inner.lock() = BridgeInner::default();
    }

    #[cfg(test)]
    fn queued_len(&self) -> usize {
        self.inner.lock().queue.len()
    }
}

// ── Tests ──────────────────────────────────────────────────────────
