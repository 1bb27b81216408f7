//! The phase countdown: a serializable absolute deadline plus local one-shot
//! arming.
//!
//! The host embeds [`TimerState`] in every snapshot so that each device
//! derives the same deadline from wall-clock time instead of a
//! latency-sensitive "seconds remaining" counter. Every device (host
//! included) arms its own one-shot from the serialized state; only the host
//! acts on the fire.

use crate::phase::Phase;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// The serialized deadline carried inside the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub start_ms: u64,
    pub end_ms: u64,
    pub enabled: bool,
}

impl Default for TimerState {
    fn default() -> Self {
        Self::disabled()
    }
}

impl TimerState {
    /// A timer that never schedules anything.
    pub fn disabled() -> Self {
        Self {
            start_ms: 0,
            end_ms: 0,
            enabled: false,
        }
    }

    /// Host-side construction: `start = now + delay`,
    /// `end = start + duration - grace`. The grace offset compensates for
    /// store-propagation latency so late-arriving broadcasts still leave
    /// clients a full-looking countdown.
    pub fn armed(now_ms: u64, duration: Duration, delay: Duration, grace: Duration) -> Self {
        let start_ms = now_ms + delay.as_millis() as u64;
        let span = duration.as_millis() as u64;
        let grace_ms = (grace.as_millis() as u64).min(span.saturating_sub(1));
        Self {
            start_ms,
            end_ms: start_ms + span - grace_ms,
            enabled: true,
        }
    }

    pub fn remaining(&self, now_ms: u64) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }
        Duration::from_millis(self.end_ms.saturating_sub(now_ms))
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.enabled && now_ms >= self.end_ms
    }
}

/// Arms local one-shot callbacks from serialized timer states.
///
/// Re-arming replaces any pending callback, so repeated broadcasts during
/// the same phase cannot produce duplicate fires. Fires are delivered as the
/// phase the timer was armed for; the receiver checks it against the current
/// phase before acting, which also makes the quorum/timeout race idempotent.
#[derive(Debug)]
pub struct TimerHandle {
    tx: mpsc::UnboundedSender<Phase>,
    pending: Option<JoinHandle<()>>,
}

impl TimerHandle {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Phase>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, pending: None }, rx)
    }

    /// Schedules a fire at the serialized deadline, replacing any pending
    /// one. Disabled or already-expired states never schedule.
    pub fn arm(&mut self, state: &TimerState, phase: Phase) {
        self.disarm();
        if !state.enabled {
            return;
        }
        let now = now_ms();
        if now >= state.end_ms {
            return;
        }
        let wait = state.remaining(now);
        let tx = self.tx.clone();
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            // The receiver may be gone during shutdown; nothing to do then.
            let _ = tx.send(phase);
        }));
    }

    pub fn disarm(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.disarm();
    }
}
