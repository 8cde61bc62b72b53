//! Group - the unit selection is computed for.
//!
//! All Managers under one lifecycle context share a Group, and the Group
//! computes one selection per refresh across all of them. Two Managers
//! therefore can never both select a play target.
//!
//! Selection itself is a pure function over candidate snapshots, see
//! [`select`].

use indexmap::IndexMap;
use std::cmp::Ordering;

use crate::core::event_bus::EventBus;
use crate::entities::{BucketId, ContextKey, GroupId, ManagerId, PlaybackId, VolumeInfo};

pub struct Group {
    pub id: GroupId,
    pub context: ContextKey,
    pub(crate) managers: Vec<ManagerId>,
    /// Current selection in rank order
    pub(crate) selection: Vec<PlaybackId>,
    pub(crate) bus: EventBus,
    pub(crate) dirty: bool,
    /// Whether any selection (even an empty one) was published yet
    pub(crate) published: bool,
    pub(crate) volume: VolumeInfo,
    pub(crate) locked: bool,
    /// Manager whose Playbacks alone are selected while set
    pub(crate) sticky: Option<ManagerId>,
}

impl Group {
    pub(crate) fn new(context: ContextKey, bus: EventBus, volume: VolumeInfo) -> Self {
        Self {
            id: GroupId::new(),
            context,
            managers: Vec::new(),
            selection: Vec::new(),
            bus,
            dirty: false,
            published: false,
            volume,
            locked: false,
            sticky: None,
        }
    }

    pub fn managers(&self) -> &[ManagerId] {
        &self.managers
    }

    pub fn selection(&self) -> &[PlaybackId] {
        &self.selection
    }

    /// Handle to this Group's event bus.
    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn sticky(&self) -> Option<ManagerId> {
        self.sticky
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("id", &self.id)
            .field("context", &self.context)
            .field("managers", &self.managers.len())
            .field("selection", &self.selection)
            .finish()
    }
}

/// Snapshot of one attached, bound Playback at refresh time.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub playback: PlaybackId,
    pub bucket: BucketId,
    pub ratio: f32,
    pub threshold: f32,
    /// Normalized center distance, lower is better
    pub distance: f32,
    /// Started by client action
    pub manual: bool,
    /// In the sticky bucket of its manager
    pub sticky: bool,
    /// Locked at any scope, or its manager is not started
    pub locked: bool,
    /// Per-host selection bound (pagers)
    pub limit: Option<usize>,
}

impl Candidate {
    pub fn is_eligible(&self) -> bool {
        !self.locked && self.ratio >= self.threshold
    }
}

/// Rank eligible candidates and keep at most `cap`.
///
/// Candidates are expected in traversal order; ties keep that order.
/// Client-started Playables rank first, then those of a sticky bucket.
pub fn select(candidates: &[Candidate], cap: usize) -> Vec<PlaybackId> {
    let mut eligible: Vec<&Candidate> = candidates.iter().filter(|c| c.is_eligible()).collect();
    // Stable sort: equal keys keep traversal order
    eligible.sort_by(|a, b| {
        b.manual
            .cmp(&a.manual)
            .then_with(|| b.sticky.cmp(&a.sticky))
            .then_with(|| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal))
    });

    let mut per_bucket: IndexMap<BucketId, usize> = IndexMap::new();
    let mut selected = Vec::new();
    for c in eligible {
        if selected.len() >= cap {
            break;
        }
        let taken = per_bucket.entry(c.bucket).or_insert(0);
        if c.limit.is_some_and(|limit| *taken >= limit) {
            continue;
        }
        *taken += 1;
        selected.push(c.playback);
    }
    selected
}
