//! Identity types for engine entities.
//!
//! Engine-owned entities (groups, managers, buckets, playbacks, playables) live in
//! arenas inside `Master` and are referenced everywhere else by these ids, never
//! by owning pointers. Host-owned handles (slots, hosts, scopes) are opaque
//! values supplied by the client.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! engine_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(Uuid);

        impl $name {
            pub(crate) fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Short form keeps log lines readable
                let s = self.0.simple().to_string();
                write!(f, "{}:{}", $prefix, &s[..8])
            }
        }
    };
}

engine_id!(
    /// One Group per top-level lifecycle context.
    GroupId, "group"
);
engine_id!(
    /// One Manager per lifecycle scope inside a Group.
    ManagerId, "manager"
);
engine_id!(
    /// One Bucket per scrollable host registered with a Manager.
    BucketId, "bucket"
);
engine_id!(
    /// Binding of one Playable to one slot.
    PlaybackId, "playback"
);
engine_id!(PlayableId, "playable");

/// Identity of an object handed out by a resource pool (player or renderer).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj:{}", self.0)
    }
}

/// Client handle for a slot (container) in the host view hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId(pub u64);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot:{}", self.0)
    }
}

/// Client handle for a scrollable host (list, pager, scroll region).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostId(pub u64);

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host:{}", self.0)
    }
}

/// Client key of a lifecycle context. Managers registered under the same
/// context key share one Group.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextKey(pub String);

impl From<&str> for ContextKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Client key of a lifecycle scope (one screen / host lifecycle owner).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeKey(pub String);

impl From<&str> for ScopeKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Sentinel value for Playables without a client identity.
pub const NO_TAG: &str = "no-tag";

/// Client-supplied identity of a Playable.
///
/// At most one Playable exists per tag at a time. The sentinel [`NO_TAG`] opts
/// out of identity: such Playables are never shared, never rebound and never
/// subject to manual arbitration.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag(String);

impl Tag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn none() -> Self {
        Self(NO_TAG.to_string())
    }

    pub fn is_none(&self) -> bool {
        self.0 == NO_TAG
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Tag {
    fn default() -> Self {
        Self::none()
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Tag {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of renderer a Playable draws into. Selects the `PlayableCreator`
/// (and therefore the bridge and pools) responsible for it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RendererType(pub String);

impl RendererType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl From<&str> for RendererType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for RendererType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
