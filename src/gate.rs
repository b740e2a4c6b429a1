//! One-shot completion gate.
//!
//! Lets a caller blocked in `stop()` (or a batch call) wait until the
//! server-side stream has fully completed or errored. Built on a oneshot
//! channel, so a release that races ahead of the wait is never lost: the
//! outcome is buffered in the channel until the waiter arrives.

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::VocalinkError;

/// Terminal outcome of one session.
pub type Outcome = Result<(), VocalinkError>;

#[derive(Default)]
struct GateInner {
    tx: Option<oneshot::Sender<Outcome>>,
    rx: Option<oneshot::Receiver<Outcome>>,
}

/// Single-use, single-release synchronization point. Re-armed per session.
pub struct CompletionGate {
    inner: Mutex<GateInner>,
}

impl Default for CompletionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionGate {
    /// Create an unarmed gate; call [`arm`](Self::arm) before each session.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(GateInner::default()),
        }
    }

    /// Arm for a new session, discarding any previous channel pair.
    pub fn arm(&self) {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock();
        inner.tx = Some(tx);
        inner.rx = Some(rx);
    }

    /// Release the gate with the session outcome. The first release wins;
    /// later calls are no-ops.
    pub fn release(&self, outcome: Outcome) {
        if let Some(tx) = self.inner.lock().tx.take() {
            let _ = tx.send(outcome);
        }
    }

    /// Wait for the release. Returns immediately if the session already
    /// completed before the wait began.
    pub async fn wait(&self) -> Outcome {
        let rx = self.inner.lock().rx.take();
        match rx {
            Some(rx) => rx.await.unwrap_or_else(|_| {
                Err(VocalinkError::invalid_state(
                    "completion gate dropped without a release",
                ))
            }),
            None => Err(VocalinkError::invalid_state(
                "completion gate is not armed",
            )),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn release_before_wait_is_not_lost() {
        let gate = CompletionGate::new();
        gate.arm();
        gate.release(Ok(()));
        assert!(gate.wait().await.is_ok());
    }

    #[tokio::test]
    async fn wait_blocks_until_release() {
        let gate = Arc::new(CompletionGate::new());
        gate.arm();

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.wait().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        gate.release(Ok(()));
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn first_release_wins() {
        let gate = CompletionGate::new();
        gate.arm();
        gate.release(Err(VocalinkError::transport("boom")));
        gate.release(Ok(()));
        assert!(gate.wait().await.is_err());
    }

    #[tokio::test]
    async fn wait_without_arm_is_invalid_state() {
        let gate = CompletionGate::new();
        assert!(matches!(
            gate.wait().await,
            Err(VocalinkError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn rearm_discards_previous_release() {
        let gate = CompletionGate::new();
        gate.arm();
        gate.release(Err(VocalinkError::transport("stale")));
        gate.arm();
        gate.release(Ok(()));
        assert!(gate.wait().await.is_ok());
    }
}
