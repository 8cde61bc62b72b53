//! Playback - the state machine joining one Playable to one slot.
//!
//! Structural states follow the container lifecycle:
//!
//! ```text
//! Created -> Added -> Attached <-> Detached -> Removed
//! ```
//!
//! Orthogonal to that, `active` tracks whether the Playback holds a renderer
//! and may receive play intents. Active implies Attached, selected and a
//! visible ratio at or above the threshold.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::time::Duration;

use crate::core::events::{PlaybackActivityEvent, PlaybackStateEvent};
use crate::core::event_bus::EventBus;
use crate::entities::{
    BucketId, Controller, ManagerId, ObjectId, PlayableId, PlaybackCallback, PlaybackId, Rect,
    RepeatMode, SlotId, VolumeInfo,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Created,
    Added,
    Attached,
    Detached,
    Removed,
}

/// Per-binding options, supplied by the client through the binder.
#[derive(Clone)]
pub struct BindConfig {
    pub threshold: f32,
    pub delay: Duration,
    pub preload: bool,
    pub repeat_mode: RepeatMode,
    pub controller: Option<Rc<dyn Controller>>,
    pub callbacks: Vec<Rc<dyn PlaybackCallback>>,
}

impl BindConfig {
    pub fn new(threshold: f32, delay: Duration) -> Self {
        Self {
            threshold,
            delay,
            preload: false,
            repeat_mode: RepeatMode::Off,
            controller: None,
            callbacks: Vec::new(),
        }
    }
}

impl std::fmt::Debug for BindConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindConfig")
            .field("threshold", &self.threshold)
            .field("delay", &self.delay)
            .field("preload", &self.preload)
            .field("repeat_mode", &self.repeat_mode)
            .field("controller", &self.controller.is_some())
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// Visibility snapshot taken on refresh.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Token {
    /// Visible fraction of the slot, 0..=1
    pub ratio: f32,
    /// Slot bounds in host coordinates
    pub bounds: Rect,
}

#[derive(Debug)]
pub struct Playback {
    pub id: PlaybackId,
    pub slot: SlotId,
    pub bucket: BucketId,
    pub manager: ManagerId,
    pub config: BindConfig,
    pub(crate) playable: Option<PlayableId>,
    state: PlaybackState,
    active: bool,
    token: Token,
    priority: u32,
    renderer: Option<ObjectId>,
    pub(crate) volume: VolumeInfo,
    pub(crate) locked: bool,
    bus: EventBus,
}

impl Playback {
    pub(crate) fn new(
        slot: SlotId,
        bucket: BucketId,
        manager: ManagerId,
        config: BindConfig,
        volume: VolumeInfo,
        bus: EventBus,
    ) -> Self {
        Self {
            id: PlaybackId::new(),
            slot,
            bucket,
            manager,
            config,
            playable: None,
            state: PlaybackState::Created,
            active: false,
            token: Token::default(),
            priority: u32::MAX,
            renderer: None,
            volume,
            locked: false,
            bus,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn playable(&self) -> Option<PlayableId> {
        self.playable
    }

    pub fn is_attached(&self) -> bool {
        self.state == PlaybackState::Attached
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn ratio(&self) -> f32 {
        self.token.ratio
    }

    /// Visible enough to be a selection candidate.
    pub fn is_eligible(&self) -> bool {
        self.is_attached() && self.token.ratio >= self.config.threshold
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn renderer(&self) -> Option<ObjectId> {
        self.renderer
    }

    pub fn volume(&self) -> VolumeInfo {
        self.volume
    }

    pub(crate) fn set_token(&mut self, token: Token) {
        self.token = token;
    }

    /// Store a new priority, returning the previous one if it changed.
    pub(crate) fn set_priority(&mut self, priority: u32) -> Option<u32> {
        let from = self.priority;
        if from == priority {
            return None;
        }
        self.priority = priority;
        Some(from)
    }

    pub(crate) fn set_renderer(&mut self, renderer: Option<ObjectId>) {
        self.renderer = renderer;
    }

    fn transition(&mut self, allowed: &[PlaybackState], to: PlaybackState) -> bool {
        if !allowed.contains(&self.state) {
            warn!(
                "Playback {}: ignoring {:?} -> {:?}",
                self.id, self.state, to
            );
            return false;
        }
        debug!("Playback {}: {:?} -> {:?}", self.id, self.state, to);
        self.state = to;
        self.bus.emit(PlaybackStateEvent {
            playback: self.id,
            slot: self.slot,
            state: to,
        });
        true
    }

    pub(crate) fn on_added(&mut self) -> bool {
        let changed = self.transition(&[PlaybackState::Created], PlaybackState::Added);
        if changed {
            self.config.callbacks.iter().for_each(|c| c.on_added(self.id));
        }
        changed
    }

    pub(crate) fn on_attached(&mut self) -> bool {
        let changed = self.transition(
            &[PlaybackState::Added, PlaybackState::Detached],
            PlaybackState::Attached,
        );
        if changed {
            self.config.callbacks.iter().for_each(|c| c.on_attached(self.id));
        }
        changed
    }

    /// Caller deactivates first.
    pub(crate) fn on_detached(&mut self) -> bool {
        let changed = self.transition(&[PlaybackState::Attached], PlaybackState::Detached);
        if changed {
            self.token = Token::default();
            self.config.callbacks.iter().for_each(|c| c.on_detached(self.id));
        }
        changed
    }

    /// Terminal. Caller deactivates and detaches first.
    pub(crate) fn on_removed(&mut self) -> bool {
        let changed = self.transition(
            &[
                PlaybackState::Created,
                PlaybackState::Added,
                PlaybackState::Detached,
            ],
            PlaybackState::Removed,
        );
        if changed {
            self.config.callbacks.iter().for_each(|c| c.on_removed(self.id));
        }
        changed
    }

    /// Flip the activity flag. Activation is only valid while attached.
    pub(crate) fn set_active(&mut self, active: bool) -> bool {
        if self.active == active || (active && !self.is_attached()) {
            return false;
        }
        debug!("Playback {}: active={}", self.id, active);
        self.active = active;
        self.bus.emit(PlaybackActivityEvent {
            playback: self.id,
            active,
        });
        if active {
            self.config.callbacks.iter().for_each(|c| c.on_active(self.id));
        } else {
            self.config.callbacks.iter().for_each(|c| c.on_inactive(self.id));
        }
        true
    }
}
