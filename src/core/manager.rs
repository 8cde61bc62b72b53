//! Manager - the Buckets and Playables of one lifecycle scope.

use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;

use crate::core::bucket::{Bucket, HostLayout};
use crate::core::group::Candidate;
use crate::core::memory::MemoryMode;
use crate::core::playback::Playback;
use crate::entities::{
    BucketId, GroupId, HostId, ManagerId, PlayableId, PlaybackId, ScopeKey, SlotId, VolumeInfo,
};

#[derive(Debug)]
pub struct Manager {
    pub id: ManagerId,
    pub group: GroupId,
    pub scope: ScopeKey,
    pub memory_mode: MemoryMode,
    /// Host -> bucket, in registration order
    pub(crate) buckets: IndexMap<HostId, BucketId>,
    /// Playables bound through this scope
    pub(crate) playables: IndexSet<PlayableId>,
    pub(crate) started: bool,
    pub(crate) volume: VolumeInfo,
    pub(crate) locked: bool,
    /// Bucket ranked ahead of the others
    pub(crate) sticky: Option<BucketId>,
}

impl Manager {
    pub(crate) fn new(group: GroupId, scope: ScopeKey, memory_mode: MemoryMode, volume: VolumeInfo) -> Self {
        Self {
            id: ManagerId::new(),
            group,
            scope,
            memory_mode,
            buckets: IndexMap::new(),
            playables: IndexSet::new(),
            started: false,
            volume,
            locked: false,
            sticky: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn bucket_for(&self, host: HostId) -> Option<BucketId> {
        self.buckets.get(&host).copied()
    }

    pub fn buckets(&self) -> impl Iterator<Item = BucketId> + '_ {
        self.buckets.values().copied()
    }

    pub fn sticky(&self) -> Option<BucketId> {
        self.sticky
    }

    /// Selection candidates of this scope: every attached Playback with a
    /// Playable, bucket by bucket in traversal order. `outer_locked` carries
    /// global and group locks; `manual` tells client-started Playables.
    pub(crate) fn candidates(
        &self,
        buckets: &IndexMap<BucketId, Bucket>,
        playbacks: &IndexMap<PlaybackId, Playback>,
        slots: &HashMap<SlotId, PlaybackId>,
        outer_locked: bool,
        manual: &dyn Fn(&Playback) -> bool,
    ) -> Vec<Candidate> {
        let scope_locked = outer_locked || self.locked || !self.started;
        let mut out = Vec::new();
        for bucket_id in self.buckets.values() {
            let Some(bucket) = buckets.get(bucket_id) else {
                continue;
            };
            for slot in bucket.slots() {
                let Some(playback) = slots.get(&slot).and_then(|id| playbacks.get(id)) else {
                    continue;
                };
                if !playback.is_attached() || playback.playable.is_none() {
                    continue;
                }
                let token = playback.token();
                out.push(Candidate {
                    playback: playback.id,
                    bucket: bucket.id,
                    ratio: token.ratio,
                    threshold: playback.config.threshold,
                    distance: bucket.distance(&token.bounds),
                    manual: manual(playback),
                    sticky: self.sticky == Some(bucket.id),
                    locked: scope_locked || bucket.locked || playback.locked,
                    limit: bucket.kind.strategy().limit(),
                });
            }
        }
        out
    }
}
