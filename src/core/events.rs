//! Events published on a Group's bus.

use crate::core::playback::PlaybackState;
use crate::entities::{GroupId, PlayableId, PlaybackId, PlayerState, SlotId, Tag};

// === Selection ===

/// Batched selection change of one Group. `selected` is the full new
/// selection in rank order, so observers never need to fold deltas.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectionChangedEvent {
    pub group: GroupId,
    pub added: Vec<PlaybackId>,
    pub removed: Vec<PlaybackId>,
    pub selected: Vec<PlaybackId>,
}

// === Playback structure ===

#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackStateEvent {
    pub playback: PlaybackId,
    pub slot: SlotId,
    pub state: PlaybackState,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackActivityEvent {
    pub playback: PlaybackId,
    pub active: bool,
}

/// A Playable moved between Playbacks (bound, rebound or unbound).
#[derive(Clone, Debug, PartialEq)]
pub struct PlayableChangedEvent {
    pub tag: Tag,
    pub playable: PlayableId,
    pub from: Option<PlaybackId>,
    pub to: Option<PlaybackId>,
}

// === Player ===

#[derive(Clone, Debug, PartialEq)]
pub struct PlayerStateEvent {
    pub playable: PlayableId,
    pub tag: Tag,
    pub play_when_ready: bool,
    pub state: PlayerState,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderedFirstFrameEvent {
    pub playable: PlayableId,
    pub tag: Tag,
}

#[derive(Clone, Debug, PartialEq)]
pub struct VideoSizeChangedEvent {
    pub playable: PlayableId,
    pub width: u32,
    pub height: u32,
}

/// Backend failure reported by a bridge. The engine does not retry.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayableErrorEvent {
    pub playable: PlayableId,
    pub tag: Tag,
    pub message: String,
}
