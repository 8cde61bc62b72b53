//! Usage errors surfaced by the engine.
//!
//! Only caller mistakes are errors. Transient exhaustion (no renderer, no
//! player) is retried on the next tick, backend failures travel as
//! `PlayableErrorEvent`, and events for torn-down scopes are dropped.

use thiserror::Error;

use crate::entities::{
    BucketId, GroupId, HostId, ManagerId, ObjectId, PlaybackId, RendererType, SlotId, Tag,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("pool capacity must be positive, got {0}")]
    InvalidPoolCapacity(usize),

    #[error("{0} is not checked out of this pool (double release?)")]
    NotCheckedOut(ObjectId),

    #[error("{slot} is already owned by {owner}, cannot bind it to {requested}")]
    SlotOwnedByOtherHost {
        slot: SlotId,
        owner: HostId,
        requested: HostId,
    },

    #[error("host {0} is already registered")]
    HostAlreadyRegistered(HostId),

    #[error("tag '{0}' is already bound to different media")]
    TagMediaMismatch(Tag),

    #[error("no playable creator registered for renderer type '{0}'")]
    NoCreator(RendererType),

    #[error("a rebinder needs a real tag, not the no-tag sentinel")]
    RebindWithoutTag,

    #[error("no playable registered under tag '{0}'")]
    UnknownTag(Tag),

    #[error("unknown group {0}")]
    UnknownGroup(GroupId),

    #[error("unknown manager {0}")]
    UnknownManager(ManagerId),

    #[error("unknown bucket {0}")]
    UnknownBucket(BucketId),

    #[error("unknown playback {0}")]
    UnknownPlayback(PlaybackId),

    #[error("only managers, buckets and playbacks can be sticky, not {0}")]
    NotStickable(&'static str),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
