//! Client-side latency instrumentation.
//!
//! Records wall-clock timestamps for the session lifecycle milestones and
//! derives two delay metrics:
//!
//! - `first_package_delay` — stream start to first inbound result
//! - `last_package_delay`  — stop request to stream completion
//!
//! Plain timestamp differences in milliseconds; no smoothing. A metric is
//! `None` until both of its milestones exist.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const UNSET: i64 = -1;

pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Milestone timestamps for the current (or most recent) session.
pub struct LatencyTracker {
    start_ms: AtomicI64,
    first_package_ms: AtomicI64,
    stop_requested_ms: AtomicI64,
    completed_ms: AtomicI64,
    last_request_id: Mutex<Option<String>>,
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self {
            start_ms: AtomicI64::new(UNSET),
            first_package_ms: AtomicI64::new(UNSET),
            stop_requested_ms: AtomicI64::new(UNSET),
            completed_ms: AtomicI64::new(UNSET),
            last_request_id: Mutex::new(None),
        }
    }

    /// Reset all milestones and remember the new session identity.
    pub(crate) fn begin_session(&self, request_id: &str) {
        self.start_ms.store(UNSET, Ordering::SeqCst);
        self.first_package_ms.store(UNSET, Ordering::SeqCst);
        self.stop_requested_ms.store(UNSET, Ordering::SeqCst);
        self.completed_ms.store(UNSET, Ordering::SeqCst);
        *self.last_request_id.lock() = Some(request_id.to_string());
    }

    /// Record the stream start. Only the first call per session sticks.
    pub(crate) fn mark_start(&self) {
        let _ = self.start_ms.compare_exchange(
            UNSET,
            now_epoch_ms(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Record the first inbound package. Only the first call sticks.
    pub(crate) fn mark_first_package(&self) {
        let _ = self.first_package_ms.compare_exchange(
            UNSET,
            now_epoch_ms(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    pub(crate) fn mark_stop_requested(&self) {
        self.stop_requested_ms.store(now_epoch_ms(), Ordering::SeqCst);
    }

    pub(crate) fn mark_completed(&self) {
        self.completed_ms.store(now_epoch_ms(), Ordering::SeqCst);
    }

    /// Stream start to first inbound result, milliseconds.
    pub fn first_package_delay(&self) -> Option<i64> {
        delta(
            self.start_ms.load(Ordering::SeqCst),
            self.first_package_ms.load(Ordering::SeqCst),
        )
    }

    /// Stop request to stream completion, milliseconds.
    pub fn last_package_delay(&self) -> Option<i64> {
        delta(
            self.stop_requested_ms.load(Ordering::SeqCst),
            self.completed_ms.load(Ordering::SeqCst),
        )
    }

    /// Identity of the most recently started session.
    pub fn last_request_id(&self) -> Option<String> {
        self.last_request_id.lock().clone()
    }
}

fn delta(from: i64, to: i64) -> Option<i64> {
    if from == UNSET || to == UNSET {
        return None;
    }
    Some(to - from)
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_are_none_before_milestones() {
        let tracker = LatencyTracker::new();
        tracker.begin_session("r1");
        assert_eq!(tracker.first_package_delay(), None);
        assert_eq!(tracker.last_package_delay(), None);

        tracker.mark_start();
        assert_eq!(tracker.first_package_delay(), None);
    }

    #[test]
    fn first_package_delay_is_non_negative() {
        let tracker = LatencyTracker::new();
        tracker.begin_session("r1");
        tracker.mark_start();
        tracker.mark_first_package();
        assert!(tracker.first_package_delay().unwrap() >= 0);
    }

    #[test]
    fn last_package_delay_is_non_negative() {
        let tracker = LatencyTracker::new();
        tracker.begin_session("r1");
        tracker.mark_stop_requested();
        tracker.mark_completed();
        assert!(tracker.last_package_delay().unwrap() >= 0);
    }

    #[test]
    fn only_first_start_mark_sticks() {
        let tracker = LatencyTracker::new();
        tracker.begin_session("r1");
        tracker.mark_start();
        let first = tracker.start_ms.load(Ordering::SeqCst);
        std::thread::sleep(std::time::Duration::from_millis(5));
        tracker.mark_start();
        assert_eq!(tracker.start_ms.load(Ordering::SeqCst), first);
    }

    #[test]
    fn begin_session_resets_previous_run() {
        let tracker = LatencyTracker::new();
        tracker.begin_session("r1");
        tracker.mark_start();
        tracker.mark_first_package();
        assert!(tracker.first_package_delay().is_some());

        tracker.begin_session("r2");
        assert_eq!(tracker.first_package_delay(), None);
        assert_eq!(tracker.last_request_id().as_deref(), Some("r2"));
    }
}
