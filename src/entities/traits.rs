//! Abstract traits for dependency inversion.
//!
//! These are the narrow interfaces through which the engine talks to the
//! outside world: the media engine (`Bridge`, `Player`), the host view
//! system (`HostView`) and client policy hooks (`Controller`,
//! `PlaybackCallback`). Implementations live with the host application;
//! `core` only depends on these traits.

use crossbeam_channel::Sender;

use super::geometry::Rect;
use super::ids::{ObjectId, PlayableId, PlaybackId, SlotId};
use super::media::{Media, PlaybackInfo, PlayerState, RepeatMode, VolumeInfo};

/// Per-Playable adapter to the media engine.
///
/// All calls are treated as synchronous, non-blocking posts. Asynchronous
/// notifications go back through the [`BridgeEvents`] handle the bridge was
/// created with.
pub trait Bridge {
    /// Acquire a player (if needed) and optionally start loading the source.
    fn prepare(&mut self, load_source: bool);

    /// Make sure everything is in place for an imminent `play()`.
    fn ready(&mut self);

    fn play(&mut self);

    fn pause(&mut self);

    /// Stop and rewind. With `reset_player` the underlying player drops its
    /// loaded source as well.
    fn reset(&mut self, reset_player: bool);

    /// Give back every backend resource (the player returns to its pool).
    fn release(&mut self);

    fn seek_to(&mut self, position_ms: u64);

    fn is_playing(&self) -> bool;

    fn player_state(&self) -> PlayerState;

    fn volume(&self) -> VolumeInfo;

    fn set_volume(&mut self, volume: VolumeInfo);

    fn set_repeat_mode(&mut self, mode: RepeatMode);

    fn playback_info(&self) -> PlaybackInfo;

    fn set_playback_info(&mut self, info: PlaybackInfo);

    /// Point output at a renderer (surface) handed out by the renderer pool,
    /// or detach output with `None`.
    fn set_renderer(&mut self, renderer: Option<ObjectId>);
}

/// Backend player instance, recycled through the player pool.
pub trait Player {
    fn prepare(&mut self, media: &Media, load_source: bool);

    fn play(&mut self);

    fn pause(&mut self);

    /// Drop loaded source and return to idle.
    fn stop(&mut self);

    fn seek_to(&mut self, position_ms: u64);

    fn position_ms(&self) -> u64;

    fn state(&self) -> PlayerState;

    fn is_playing(&self) -> bool;

    fn volume(&self) -> VolumeInfo;

    fn set_volume(&mut self, volume: VolumeInfo);

    fn set_repeat_mode(&mut self, mode: RepeatMode);

    fn set_renderer(&mut self, renderer: Option<ObjectId>);
}

/// On-screen output surface, recycled through the renderer pool.
pub trait Renderer {
    /// Place the renderer into a slot, or take it out with `None`.
    fn place(&mut self, slot: Option<SlotId>);
}

/// Creates, recycles and destroys pooled objects of type `T` keyed by `K`.
pub trait PoolFactory<K, T> {
    /// Create a fresh object. `None` means the backend cannot create one right
    /// now (treated as transient exhaustion).
    fn create(&mut self, key: &K) -> Option<T>;

    /// Destroy an object that leaves the pool for good.
    fn destroy(&mut self, item: T);

    /// Return an object to a neutral state before it becomes resident.
    fn reset(&mut self, _item: &mut T) {}

    /// Objects for keys that are not recyclable are never kept in the pool.
    fn recyclable(&self, _key: &K) -> bool {
        true
    }
}

/// Host view system as seen by one Bucket.
pub trait HostView {
    /// Visible area of the host, in host coordinates.
    fn viewport(&self) -> Rect;

    /// Current bounds of a slot in host coordinates, `None` when the slot is
    /// not laid out in this host (detached, recycled away).
    fn slot_bounds(&self, slot: SlotId) -> Option<Rect>;

    /// Whether the slot lives inside this host.
    fn contains(&self, slot: SlotId) -> bool;
}

/// Client policy for manually controlled Playables.
pub trait Controller {
    /// Whether the engine may pause a Playable the client started.
    fn can_pause(&self) -> bool {
        true
    }

    /// Whether the engine may start this Playable without client action.
    fn can_start(&self) -> bool {
        false
    }
}

/// Per-Playback structural callbacks, invoked synchronously on transition.
pub trait PlaybackCallback {
    fn on_added(&self, _playback: PlaybackId) {}
    fn on_removed(&self, _playback: PlaybackId) {}
    fn on_attached(&self, _playback: PlaybackId) {}
    fn on_detached(&self, _playback: PlaybackId) {}
    fn on_active(&self, _playback: PlaybackId) {}
    fn on_inactive(&self, _playback: PlaybackId) {}
}

/// Asynchronous notification from a bridge.
#[derive(Clone, Debug, PartialEq)]
pub enum BridgeEventKind {
    StateChanged { play_when_ready: bool, state: PlayerState },
    RenderedFirstFrame,
    VideoSizeChanged { width: u32, height: u32 },
    Error(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct BridgeEvent {
    pub playable: PlayableId,
    pub kind: BridgeEventKind,
}

/// Sending half handed to a bridge at creation. Cloneable and `Send`, so
/// media engine threads can post from anywhere; the coordinator drains the
/// receiving half on its own thread.
#[derive(Clone, Debug)]
pub struct BridgeEvents {
    playable: PlayableId,
    tx: Sender<BridgeEvent>,
}

impl BridgeEvents {
    pub(crate) fn new(playable: PlayableId, tx: Sender<BridgeEvent>) -> Self {
        Self { playable, tx }
    }

    pub fn playable(&self) -> PlayableId {
        self.playable
    }

    pub fn emit(&self, kind: BridgeEventKind) {
        // Receiver gone means the engine was torn down; late events are dropped
        let _ = self.tx.send(BridgeEvent {
            playable: self.playable,
            kind,
        });
    }
}
