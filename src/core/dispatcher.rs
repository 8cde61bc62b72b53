//! Playable dispatcher - the single authority over play/pause calls.
//!
//! Selection says "wants to play" / "wants to pause"; the client says
//! "play this" / "pause this" through Master. The dispatcher reconciles both
//! so they never race:
//!
//! - no tag or no controller: system controlled, play/pause as asked
//! - a client-started Playable exists: every other controlled one pauses
//! - a recorded client action for the tag wins over re-deciding
//! - otherwise the controller decides (`can_start` / `can_pause`)
//!
//! Plays with a delay are parked in [`DelayedStarts`] and any pause cancels
//! them.

use indexmap::IndexSet;
use log::{debug, trace};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::core::debounce::DelayedStarts;
use crate::entities::{Controller, PlayableId, Tag};

/// Last client action recorded for a tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingAction {
    Play,
    Pause,
}

/// Outcome of a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Play,
    Pause,
    /// Leave the Playable as it is
    Keep,
}

/// What the caller must do right now after a play verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Start {
    Now,
    /// Parked until the delay elapses
    Later,
}

#[derive(Debug, Default)]
pub struct Dispatcher {
    started: bool,
    manually_started: IndexSet<Tag>,
    pending: HashMap<Tag, PendingAction>,
    delayed: DelayedStarts,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn start(&mut self) {
        if !self.started {
            debug!("Dispatcher started");
            self.started = true;
        }
    }

    /// Stop: every parked start is dropped.
    pub fn stop(&mut self) {
        if self.started {
            debug!("Dispatcher stopped");
            self.started = false;
        }
        self.delayed.cancel_all();
    }

    /// Decide what a "wants to play" request turns into.
    pub fn request_play(&self, tag: &Tag, controller: Option<&dyn Controller>) -> Verdict {
        let Some(controller) = controller.filter(|_| !tag.is_none()) else {
            return Verdict::Play;
        };
        if self.someone_else_started(tag) {
            trace!("Dispatcher: {} yields to a client-started playable", tag);
            return Verdict::Pause;
        }
        match self.pending.get(tag) {
            Some(PendingAction::Play) => Verdict::Play,
            Some(PendingAction::Pause) => Verdict::Pause,
            None if controller.can_start() => Verdict::Play,
            None => Verdict::Keep,
        }
    }

    /// Decide what a "wants to pause" request turns into. `forced` pauses
    /// (detach, removal, lifecycle stop, locks) are never declined.
    pub fn request_pause(
        &self,
        tag: &Tag,
        controller: Option<&dyn Controller>,
        forced: bool,
    ) -> Verdict {
        if forced {
            return Verdict::Pause;
        }
        let Some(controller) = controller.filter(|_| !tag.is_none()) else {
            return Verdict::Pause;
        };
        if self.someone_else_started(tag) {
            return Verdict::Pause;
        }
        if self.pending.get(tag) == Some(&PendingAction::Pause) || controller.can_pause() {
            Verdict::Pause
        } else {
            trace!("Dispatcher: {} declined system pause", tag);
            Verdict::Keep
        }
    }

    fn someone_else_started(&self, tag: &Tag) -> bool {
        !self.manually_started.is_empty() && !self.manually_started.contains(tag)
    }

    /// Route a play verdict: start now, or park it for `delay`.
    pub fn just_play(&mut self, playable: PlayableId, delay: Duration, now: Instant) -> Start {
        if delay.is_zero() {
            self.delayed.cancel(playable);
            Start::Now
        } else {
            self.delayed.schedule(playable, now, delay);
            Start::Later
        }
    }

    /// Route a pause verdict: drop any parked start.
    pub fn just_pause(&mut self, playable: PlayableId) {
        self.delayed.cancel(playable);
    }

    /// Parked starts whose delay elapsed. Nothing fires while stopped.
    pub fn due(&mut self, now: Instant) -> Vec<PlayableId> {
        if !self.started {
            return Vec::new();
        }
        self.delayed.due(now)
    }

    pub fn is_delayed(&self, playable: PlayableId) -> bool {
        self.delayed.is_pending(playable)
    }

    /// Client asked to play `tag`. With `manual` the Playable is flagged as
    /// client-started, and system pauses will be declined for it.
    pub fn on_client_play(&mut self, tag: &Tag, manual: bool) {
        if tag.is_none() {
            return;
        }
        self.pending.insert(tag.clone(), PendingAction::Play);
        if manual {
            self.manually_started.insert(tag.clone());
        }
    }

    pub fn on_client_pause(&mut self, tag: &Tag) {
        if tag.is_none() {
            return;
        }
        self.pending.insert(tag.clone(), PendingAction::Pause);
        self.manually_started.shift_remove(tag);
    }

    /// The engine paused a client-started Playable on its own (removal,
    /// detach, lifecycle stop, lock). It no longer counts as started by the
    /// client; the recorded `Play` stays so it resumes when selected again.
    pub fn clear_manual(&mut self, tag: &Tag) -> bool {
        let cleared = self.manually_started.shift_remove(tag);
        if cleared {
            debug!("Dispatcher: {} no longer client-started", tag);
        }
        cleared
    }

    pub fn is_manually_started(&self, tag: &Tag) -> bool {
        self.manually_started.contains(tag)
    }

    pub fn pending_action(&self, tag: &Tag) -> Option<PendingAction> {
        self.pending.get(tag).copied()
    }

    /// Drop everything known about a torn-down Playable.
    pub fn forget(&mut self, tag: &Tag, playable: PlayableId) {
        self.delayed.cancel(playable);
        self.pending.remove(tag);
        self.manually_started.shift_remove(tag);
    }
}
