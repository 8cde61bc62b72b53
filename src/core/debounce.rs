//! Delayed starts - debounced per-Playable play requests.
//!
//! When selection flickers (fast scroll across a threshold), we don't want to
//! start and stop a player on every tick. Instead a play request with a
//! configured delay is parked here and fires only if nothing cancelled it:
//! 1. Selection asks to play -> `schedule()` (no-op if already pending)
//! 2. Any pause, deactivation or teardown -> `cancel()`
//! 3. Coordinator tick -> `due(now)` returns what should start now
//!
//! Time is passed in explicitly so the coordinator loop owns the clock.

use indexmap::IndexMap;
use std::time::{Duration, Instant};

use crate::entities::PlayableId;

#[derive(Debug, Clone, Default)]
pub struct DelayedStarts {
    /// Pending starts: playable -> trigger time, in scheduling order
    pending: IndexMap<PlayableId, Instant>,
}

impl DelayedStarts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a start. An already pending start keeps its original deadline,
    /// so repeated requests from consecutive ticks do not push it back.
    pub fn schedule(&mut self, playable: PlayableId, now: Instant, delay: Duration) {
        if self.pending.contains_key(&playable) {
            return;
        }
        let trigger_at = now + delay;
        self.pending.insert(playable, trigger_at);
        log::trace!(
            "DelayedStarts: scheduled {} in {}ms",
            playable,
            delay.as_millis()
        );
    }

    /// Cancel a pending start. Returns true if one was pending.
    pub fn cancel(&mut self, playable: PlayableId) -> bool {
        let cancelled = self.pending.shift_remove(&playable).is_some();
        if cancelled {
            log::trace!("DelayedStarts: cancelled {}", playable);
        }
        cancelled
    }

    pub fn cancel_all(&mut self) {
        if !self.pending.is_empty() {
            log::trace!("DelayedStarts: cancelled {} pending", self.pending.len());
        }
        self.pending.clear();
    }

    /// Remove and return every start whose deadline has passed, in
    /// scheduling order.
    pub fn due(&mut self, now: Instant) -> Vec<PlayableId> {
        let ready: Vec<PlayableId> = self
            .pending
            .iter()
            .filter(|(_, at)| now >= **at)
            .map(|(id, _)| *id)
            .collect();
        for id in &ready {
            self.pending.shift_remove(id);
            log::trace!("DelayedStarts: triggering {}", id);
        }
        ready
    }

    pub fn is_pending(&self, playable: PlayableId) -> bool {
        self.pending.contains_key(&playable)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
