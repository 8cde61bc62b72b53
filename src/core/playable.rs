//! Playable - media plus bridge, the unit of playback intent.
//!
//! A Playable is independent of any slot: it may move between Playbacks
//! (rebinding) while keeping its bridge, and with it the player state.

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::entities::{
    Bridge, Media, ObjectId, PlayableId, PlaybackId, PlaybackInfo, PlayerState, RendererType,
    RepeatMode, Tag, VolumeInfo,
};

/// Resource lifecycle of a Playable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayableStage {
    /// Bridge exists, no player yet
    Created,
    /// Bridge prepared (player acquired)
    Bound,
    /// Player returned to the pool
    Released,
}

/// What the engine last asked the Playable to do.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    #[default]
    Idle,
    Playing,
    Paused,
    Ended,
}

pub struct Playable {
    pub id: PlayableId,
    pub tag: Tag,
    pub media: Media,
    pub renderer_type: RendererType,
    bridge: Box<dyn Bridge>,
    pub(crate) playback: Option<PlaybackId>,
    stage: PlayableStage,
    intent: Intent,
    renderer: Option<ObjectId>,
}

impl Playable {
    pub(crate) fn new(
        id: PlayableId,
        tag: Tag,
        media: Media,
        renderer_type: RendererType,
        bridge: Box<dyn Bridge>,
    ) -> Self {
        debug!("Playable {} created: tag={}, uri={}", id, tag, media.uri);
        Self {
            id,
            tag,
            media,
            renderer_type,
            bridge,
            playback: None,
            stage: PlayableStage::Created,
            intent: Intent::Idle,
            renderer: None,
        }
    }

    pub fn playback(&self) -> Option<PlaybackId> {
        self.playback
    }

    pub fn stage(&self) -> PlayableStage {
        self.stage
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn renderer(&self) -> Option<ObjectId> {
        self.renderer
    }

    pub fn is_playing(&self) -> bool {
        self.bridge.is_playing()
    }

    pub fn player_state(&self) -> PlayerState {
        self.bridge.player_state()
    }

    pub fn volume(&self) -> VolumeInfo {
        self.bridge.volume()
    }

    pub fn playback_info(&self) -> PlaybackInfo {
        self.bridge.playback_info()
    }

    pub(crate) fn prepare(&mut self, load_source: bool) {
        trace!("Playable {}: prepare(load_source={})", self.id, load_source);
        self.bridge.prepare(load_source);
        self.stage = PlayableStage::Bound;
    }

    pub(crate) fn play(&mut self) {
        if self.intent == Intent::Playing && self.bridge.is_playing() {
            return;
        }
        debug!("Playable {}: play", self.id);
        self.bridge.play();
        self.stage = PlayableStage::Bound;
        self.intent = Intent::Playing;
    }

    /// Pause if anything is (or is about to be) playing. Returns true when a
    /// pause was issued to the bridge.
    pub(crate) fn pause(&mut self) -> bool {
        if self.intent != Intent::Playing && !self.bridge.is_playing() {
            return false;
        }
        debug!("Playable {}: pause", self.id);
        self.bridge.pause();
        // Ended stays ended until the client asks again
        if self.intent != Intent::Ended {
            self.intent = Intent::Paused;
        }
        true
    }

    pub(crate) fn reset(&mut self) {
        trace!("Playable {}: reset", self.id);
        self.bridge.reset(false);
        if self.intent == Intent::Ended {
            self.intent = Intent::Idle;
        }
    }

    /// Give back the player. Callers pause first. No-op unless prepared.
    pub(crate) fn release(&mut self) {
        if self.stage != PlayableStage::Bound {
            return;
        }
        debug!("Playable {}: release", self.id);
        self.bridge.release();
        self.stage = PlayableStage::Released;
        if self.intent == Intent::Playing {
            self.intent = Intent::Paused;
        }
    }

    pub(crate) fn set_renderer(&mut self, renderer: Option<ObjectId>) {
        self.renderer = renderer;
        self.bridge.set_renderer(renderer);
    }

    pub(crate) fn set_volume(&mut self, volume: VolumeInfo) {
        self.bridge.set_volume(volume);
    }

    pub(crate) fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.bridge.set_repeat_mode(mode);
    }

    pub(crate) fn restore_info(&mut self, info: PlaybackInfo) {
        self.bridge.set_playback_info(info);
    }

    pub(crate) fn mark_ended(&mut self) {
        self.intent = Intent::Ended;
    }

    /// Client asked to play again after the end.
    pub(crate) fn rewind_if_ended(&mut self) {
        if self.intent == Intent::Ended {
            self.bridge.seek_to(0);
            self.intent = Intent::Idle;
        }
    }
}

impl std::fmt::Debug for Playable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Playable")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("uri", &self.media.uri)
            .field("playback", &self.playback)
            .field("stage", &self.stage)
            .field("intent", &self.intent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CallLog, RecordingBridge, calls};

    fn playable(log: &CallLog) -> Playable {
        let media = Media::new("a.mp4");
        let bridge = RecordingBridge::new(&media, log);
        Playable::new(
            PlayableId::new(),
            Tag::from("a"),
            media,
            RendererType::from("video"),
            Box::new(bridge),
        )
    }

    #[test]
    fn test_play_is_not_repeated() {
        let log = CallLog::default();
        let mut p = playable(&log);
        p.play();
        p.play();
        assert_eq!(calls(&log), vec!["a.mp4:play"]);
        assert_eq!(p.intent(), Intent::Playing);
    }

    #[test]
    fn test_pause_only_when_playing() {
        let log = CallLog::default();
        let mut p = playable(&log);
        assert!(!p.pause());
        p.play();
        assert!(p.pause());
        assert!(!p.pause());
        assert_eq!(calls(&log), vec!["a.mp4:play", "a.mp4:pause"]);
    }

    #[test]
    fn test_release_once() {
        let log = CallLog::default();
        let mut p = playable(&log);
        // Never prepared: nothing to give back
        p.release();
        p.prepare(false);
        p.release();
        p.release();
        assert_eq!(calls(&log), vec!["a.mp4:prepare", "a.mp4:release"]);
        assert_eq!(p.stage(), PlayableStage::Released);
    }

    #[test]
    fn test_ended_rewinds_on_request() {
        let log = CallLog::default();
        let mut p = playable(&log);
        p.play();
        p.mark_ended();
        assert_eq!(p.intent(), Intent::Ended);
        p.rewind_if_ended();
        assert_eq!(p.intent(), Intent::Idle);
        assert!(calls(&log).contains(&"a.mp4:seek 0".to_string()));
    }
}
