//! Entities module - ids, geometry, media values and the host-facing traits
//!
//! Nothing here knows about selection or lifecycles; `core` builds on these.

pub mod geometry;
pub mod ids;
pub mod media;
pub mod traits;

pub use geometry::Rect;
pub use ids::{
    BucketId, ContextKey, GroupId, HostId, ManagerId, NO_TAG, ObjectId, PlayableId, PlaybackId,
    RendererType, ScopeKey, SlotId, Tag,
};
pub use media::{
    Media, MediaDrm, PlaybackInfo, PlayerKey, PlayerState, RepeatMode, VolumeInfo,
};
pub use traits::{
    Bridge, BridgeEvent, BridgeEventKind, BridgeEvents, Controller, HostView, PlaybackCallback,
    Player, PoolFactory, Renderer,
};
