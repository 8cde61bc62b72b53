//! Group refresh - turning a selection into play/pause/release calls.
//!
//! One refresh of a Group runs, in order:
//! 1. visibility tokens are updated, attaching and detaching Playbacks
//! 2. candidates are collected manager by manager, bucket by bucket (only
//!    from the sticky Manager when the Group has one)
//! 3. the selection is computed under the tightest memory-mode cap
//! 4. everything not selected is paused and deactivated
//! 5. priorities are reassigned, preparing, resetting or releasing players
//! 6. the selection is activated and started in rank order
//! 7. a `SelectionChangedEvent` is published if anything changed
//!
//! Pausing (4) always precedes releasing (5), so a player is never handed
//! back to its pool while playing.

use log::{debug, error, trace};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::Instant;

use crate::core::dispatcher::{Start, Verdict};
use crate::core::events::SelectionChangedEvent;
use crate::core::group::{Candidate, select};
use crate::core::master::Master;
use crate::core::memory::MemoryMode;
use crate::core::playable::Intent;
use crate::core::playback::Playback;
use crate::entities::{GroupId, PlayableId, PlaybackId, Rect};

impl Master {
    pub(crate) fn refresh_group(&mut self, id: GroupId, now: Instant) {
        let Some(group) = self.groups.get_mut(&id) else {
            return;
        };
        group.dirty = false;
        let managers = group.managers.clone();
        let outer_locked = self.locked || group.locked;
        // A sticky Manager is the only source of candidates
        let sources: Vec<_> = match group.sticky.filter(|m| managers.contains(m)) {
            Some(sticky) => vec![sticky],
            None => managers.clone(),
        };

        for playback in self.traverse(&managers) {
            self.update_token(playback);
        }

        let candidates: Vec<Candidate> = {
            let manual = |p: &Playback| {
                p.playable
                    .and_then(|id| self.playables.get(&id))
                    .is_some_and(|p| self.dispatcher.is_manually_started(&p.tag))
            };
            sources
                .iter()
                .filter_map(|m| self.managers.get(m))
                .flat_map(|m| {
                    m.candidates(&self.buckets, &self.playbacks, &self.slots, outer_locked, &manual)
                })
                .collect()
        };

        let mut cap: Option<usize> = None;
        for manager in managers.iter().filter_map(|m| self.managers.get(m)) {
            if !manager.started {
                continue;
            }
            let mode = self.gauge.resolve(manager.memory_mode);
            let manager_cap = self.config.memory.cap(mode);
            cap = Some(cap.map_or(manager_cap, |c| c.min(manager_cap)));
        }
        let selection = select(&candidates, cap.unwrap_or(0));
        trace!(
            "Group {}: {} candidates, cap {:?}, selected {:?}",
            id,
            candidates.len(),
            cap,
            selection
        );

        let locked: HashSet<PlaybackId> = candidates
            .iter()
            .filter(|c| c.locked)
            .map(|c| c.playback)
            .collect();
        let playbacks = self.traverse(&managers);
        for playback in playbacks.iter().filter(|p| !selection.contains(p)) {
            self.pause_playback(*playback, locked.contains(playback));
        }

        self.update_priorities(&playbacks, &selection);

        for playback in &selection {
            self.start_playback(*playback, now);
        }

        let Some(group) = self.groups.get_mut(&id) else {
            return;
        };
        let previous = std::mem::replace(&mut group.selection, selection.clone());
        if previous != selection || !group.published {
            group.published = true;
            let added: Vec<PlaybackId> = selection
                .iter()
                .filter(|p| !previous.contains(p))
                .copied()
                .collect();
            let removed: Vec<PlaybackId> = previous
                .iter()
                .filter(|p| !selection.contains(p))
                .copied()
                .collect();
            debug!(
                "Group {}: selection +{} -{} = {}",
                id,
                added.len(),
                removed.len(),
                selection.len()
            );
            group.bus.emit(SelectionChangedEvent {
                group: id,
                added,
                removed,
                selected: selection,
            });
        }
    }

    /// Re-read the slot's layout: attach, detach, or remove the Playback
    /// when its host no longer has the slot.
    fn update_token(&mut self, id: PlaybackId) {
        let Some(playback) = self.playbacks.get(&id) else {
            return;
        };
        let slot = playback.slot;
        let Some(bucket) = self.buckets.get(&playback.bucket) else {
            return;
        };
        if !bucket.accepts(slot) {
            debug!("Playback {}: {} left its host", id, slot);
            self.remove_playback(id, true);
            return;
        }
        match bucket.token(slot) {
            Some(token) => {
                if let Some(playback) = self.playbacks.get_mut(&id) {
                    if !playback.is_attached() {
                        playback.on_attached();
                    }
                    playback.set_token(token);
                }
            }
            None => {
                if playback.is_attached() {
                    self.pause_playback(id, true);
                    if let Some(playback) = self.playbacks.get_mut(&id) {
                        playback.on_detached();
                    }
                }
            }
        }
    }

    /// Ask the dispatcher to pause and leave the active state. Parked
    /// starts are cancelled either way; the renderer goes back before the
    /// Playback turns inactive.
    pub(crate) fn pause_playback(&mut self, id: PlaybackId, forced: bool) {
        let Some(playback) = self.playbacks.get(&id) else {
            return;
        };
        let controller = playback.config.controller.clone();
        if let Some(playable_id) = playback.playable {
            if let Some(playable) = self.playables.get_mut(&playable_id) {
                self.dispatcher.just_pause(playable_id);
                let verdict =
                    self.dispatcher
                        .request_pause(&playable.tag, controller.as_deref(), forced);
                if verdict == Verdict::Pause {
                    playable.pause();
                    if forced {
                        self.dispatcher.clear_manual(&playable.tag);
                    }
                }
            }
        }
        self.deactivate(id);
    }

    fn deactivate(&mut self, id: PlaybackId) {
        let Some(playback) = self.playbacks.get_mut(&id) else {
            return;
        };
        if !playback.is_active() && playback.renderer().is_none() {
            return;
        }
        if let Some(renderer) = playback.renderer() {
            playback.set_renderer(None);
            if let Some(playable) = playback.playable.and_then(|p| self.playables.get_mut(&p)) {
                playable.set_renderer(None);
                if let Some(creator) = self.creators.get_mut(&playable.renderer_type) {
                    let released = creator.release_renderer(renderer);
                    if let Err(err) = &released {
                        error!("Playback {}: renderer release failed: {}", id, err);
                    }
                    debug_assert!(released.is_ok(), "renderer {} released twice", renderer);
                }
            }
        }
        playback.set_active(false);
    }

    /// Priority 0 for the selection, 1.. by distance to the selection for
    /// other attached Playbacks, `u32::MAX` for detached ones.
    fn update_priorities(&mut self, playbacks: &[PlaybackId], selection: &[PlaybackId]) {
        let cover = selection
            .iter()
            .filter_map(|id| self.playbacks.get(id))
            .map(|p| p.token().bounds)
            .reduce(|a, b| a.union(&b));

        let mut others: Vec<(PlaybackId, f32)> = Vec::new();
        let mut changes: Vec<(PlaybackId, u32)> = Vec::new();
        for id in playbacks {
            let Some(playback) = self.playbacks.get(id) else {
                continue;
            };
            if selection.contains(id) {
                changes.push((*id, 0));
            } else if !playback.is_attached() {
                changes.push((*id, u32::MAX));
            } else if let Some(cover) = &cover {
                others.push((*id, center_gap(&playback.token().bounds, cover)));
            }
        }
        // Stable: equal gaps keep traversal order
        others.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        for (rank, (id, _)) in others.into_iter().enumerate() {
            changes.push((id, rank as u32 + 1));
        }

        for (id, priority) in changes {
            let changed = self
                .playbacks
                .get_mut(&id)
                .and_then(|p| p.set_priority(priority));
            if let Some(from) = changed {
                trace!("Playback {}: priority {} -> {}", id, from, priority);
                self.on_priority_changed(id, priority);
            }
        }
    }

    fn on_priority_changed(&mut self, id: PlaybackId, priority: u32) {
        let Some(playback) = self.playbacks.get(&id) else {
            return;
        };
        let Some(playable_id) = playback.playable else {
            return;
        };
        let preload = playback.config.preload;
        let manager = playback.manager;
        let mode = match self.managers.get(&manager) {
            Some(m) => self.gauge.resolve(m.memory_mode),
            None => return,
        };

        if priority == 0 {
            self.restore_info(playable_id);
            if let Some(playable) = self.playables.get_mut(&playable_id) {
                playable.prepare(preload);
            }
            return;
        }

        let Some(playable) = self.playables.get(&playable_id) else {
            return;
        };
        // Client-started Playables keep their player wherever they are
        if self.dispatcher.is_manually_started(&playable.tag) {
            return;
        }
        if priority >= self.config.memory.release_distance(mode) {
            if playable.is_playing() {
                self.pause_playback(id, true);
            }
            self.save_info(playable_id);
            if let Some(playable) = self.playables.get_mut(&playable_id) {
                playable.release();
            }
        } else if mode != MemoryMode::Balanced {
            if let Some(playable) = self.playables.get_mut(&playable_id) {
                playable.reset();
            }
        }
    }

    /// Activate a selected Playback and route its play intent. Without a
    /// renderer the Playback stays inactive and the Group is retried on the
    /// next tick.
    fn start_playback(&mut self, id: PlaybackId, now: Instant) {
        let Some(playback) = self.playbacks.get_mut(&id) else {
            return;
        };
        let Some(playable_id) = playback.playable else {
            return;
        };
        let Some(playable) = self.playables.get_mut(&playable_id) else {
            return;
        };

        if !playback.is_active() {
            let Some(creator) = self.creators.get_mut(&playable.renderer_type) else {
                return;
            };
            let Some(renderer) = creator.acquire_renderer(playback.slot, &playable.media) else {
                debug!("Playback {}: no renderer available, retrying", id);
                let manager = playback.manager;
                self.mark_manager_dirty(manager);
                return;
            };
            playable.set_renderer(Some(renderer));
            playback.set_renderer(Some(renderer));
            playback.set_active(true);
        }

        if playable.intent() == Intent::Ended {
            return;
        }
        let controller = playback.config.controller.clone();
        let delay = playback.config.delay;
        match self
            .dispatcher
            .request_play(&playable.tag, controller.as_deref())
        {
            Verdict::Play => {
                if playable.intent() == Intent::Playing && playable.is_playing() {
                    return;
                }
                if self.dispatcher.just_play(playable_id, delay, now) == Start::Now {
                    playable.play();
                }
            }
            Verdict::Pause => {
                self.dispatcher.just_pause(playable_id);
                playable.pause();
            }
            Verdict::Keep => {}
        }
    }

    /// A parked start came due: play if its Playback is still active.
    pub(crate) fn start_due(&mut self, playable_id: PlayableId) {
        let Some(playable) = self.playables.get_mut(&playable_id) else {
            return;
        };
        let active = playable
            .playback
            .and_then(|id| self.playbacks.get(&id))
            .is_some_and(|p| p.is_active());
        if active {
            playable.play();
        } else {
            trace!("Delayed start of {} dropped, no longer active", playable_id);
        }
    }
}

/// Manhattan distance between the centers of two rects.
fn center_gap(a: &Rect, b: &Rect) -> f32 {
    (a.center_x() - b.center_x()).abs() + (a.center_y() - b.center_y()).abs()
}

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::core::bucket::HostKind;
    use crate::core::events::{PlaybackStateEvent, SelectionChangedEvent};
    use crate::core::memory::MemoryMode;
    use crate::core::playback::PlaybackState;
    use crate::entities::{HostId, Media, Rect, RendererType, SlotId, Tag};
    use crate::testing::{FakeHost, Harness, position};

    fn selections(h: &Harness) -> Vec<SelectionChangedEvent> {
        h.master
            .group_of(h.manager)
            .unwrap()
            .bus()
            .poll()
            .iter()
            .filter_map(|e| e.get::<SelectionChangedEvent>().cloned())
            .collect()
    }

    #[test]
    fn test_threshold_selection() {
        let mut h = Harness::new(MemoryMode::Balanced);
        for (slot, (tag, ratio)) in [("a", 0.9), ("b", 0.3), ("c", 0.95)].iter().enumerate() {
            h.place(slot as u64, *ratio);
            h.bind(slot as u64, tag);
        }
        h.tick();

        assert!(h.is_active(0));
        assert!(!h.is_active(1));
        assert!(h.is_active(2));
        assert!(h.is_playing("a"));
        assert!(!h.is_playing("b"));
        assert!(h.is_playing("c"));
        let selected = &h.master.group_of(h.manager).unwrap().selection;
        // Closest to the viewport center first
        let c = h.master.playback_at(SlotId(2)).unwrap().id;
        let a = h.master.playback_at(SlotId(0)).unwrap().id;
        assert_eq!(*selected, vec![c, a]);
    }

    #[test]
    #[should_panic(expected = "released twice")]
    fn test_double_renderer_release_is_fatal() {
        let mut h = Harness::new(MemoryMode::Balanced);
        h.place(0, 1.0);
        h.bind(0, "a");
        h.tick();
        let renderer = h.master.playback_at(SlotId(0)).unwrap().renderer().unwrap();
        h.master
            .creators
            .get_mut(&RendererType::from("video"))
            .unwrap()
            .release_renderer(renderer)
            .unwrap();
        h.host.remove_slot(SlotId(0));
        h.relayout();
    }

    #[test]
    fn test_low_mode_plays_one() {
        let mut h = Harness::new(MemoryMode::Low);
        for (slot, tag) in ["a", "b", "c"].iter().enumerate() {
            h.place(slot as u64, 1.0);
            h.bind(slot as u64, tag);
        }
        h.tick();
        assert!(h.is_playing("a"));
        assert!(!h.is_playing("b"));
        assert!(!h.is_playing("c"));

        h.place(0, 0.5);
        h.relayout();
        assert!(!h.is_playing("a"));
        assert!(h.is_playing("b"));
        assert!(!h.is_playing("c"));
        assert!(!h.is_active(0));
        // Paused, renderer back, then player released
        let pause = position(&h.log, "a.mp4:pause").unwrap();
        let renderer = position(&h.log, "renderer- obj:1").unwrap();
        let release = position(&h.log, "a.mp4:release").unwrap();
        assert!(pause < renderer && renderer < release);
    }

    #[test]
    fn test_cap_follows_memory_mode() {
        for (mode, expected) in [
            (MemoryMode::Low, 1),
            (MemoryMode::Normal, 2),
            (MemoryMode::Balanced, 3),
            (MemoryMode::High, 4),
        ] {
            let mut h = Harness::new(mode);
            for (slot, tag) in ["a", "b", "c", "d"].iter().enumerate() {
                h.place(slot as u64, 1.0);
                h.bind(slot as u64, tag);
            }
            h.tick();
            let playing = ["a", "b", "c", "d"]
                .iter()
                .filter(|t| h.is_playing(t))
                .count();
            assert_eq!(playing, expected, "{:?}", mode);
        }
    }

    #[test]
    fn test_removed_slot_pauses_before_release() {
        let mut h = Harness::new(MemoryMode::Balanced);
        h.place(0, 1.0);
        h.bind(0, "a");
        h.tick();
        assert!(h.is_playing("a"));

        h.host.remove_slot(SlotId(0));
        h.relayout();
        assert!(h.master.playback_at(SlotId(0)).is_none());
        let pause = position(&h.log, "a.mp4:pause").unwrap();
        let renderer = position(&h.log, "renderer- obj:1").unwrap();
        let release = position(&h.log, "a.mp4:release").unwrap();
        assert!(pause < renderer && renderer < release);
        // Unbound but still known by tag
        let playable = h.master.playable(&Tag::from("a")).unwrap();
        assert!(playable.playback().is_none());
    }

    #[test]
    fn test_detach_and_reattach() {
        let mut h = Harness::new(MemoryMode::Balanced);
        h.place(0, 1.0);
        h.bind(0, "a");
        h.tick();

        h.host.detach_slot(SlotId(0));
        h.relayout();
        let playback = h.master.playback_at(SlotId(0)).unwrap();
        assert_eq!(playback.state(), PlaybackState::Detached);
        assert_eq!(playback.priority(), u32::MAX);
        assert!(!h.is_playing("a"));
        assert!(position(&h.log, "a.mp4:pause").unwrap() < position(&h.log, "a.mp4:release").unwrap());
        assert!(h.master.saved_info(&Tag::from("a")).is_some());

        h.clear();
        h.place(0, 1.0);
        h.master.on_slot_attached(SlotId(0));
        h.tick();
        assert!(h.is_playing("a"));
        assert_eq!(h.calls()[0], "a.mp4:prepare");
        assert!(h.master.saved_info(&Tag::from("a")).is_none());
    }

    #[test]
    fn test_renderer_exhaustion_retries() {
        let mut h = Harness::new(MemoryMode::Balanced);
        h.renderers.set(false);
        h.place(0, 1.0);
        h.bind(0, "a");
        h.tick();
        assert!(!h.is_active(0));
        assert!(!h.is_playing("a"));
        assert!(h.master.group_of(h.manager).unwrap().is_dirty());

        h.renderers.set(true);
        h.tick();
        assert!(h.is_active(0));
        assert!(h.is_playing("a"));
        assert!(position(&h.log, "renderer+ slot:0").unwrap() < position(&h.log, "a.mp4:play").unwrap());
    }

    #[test]
    fn test_delayed_start() {
        let config = EngineConfig {
            start_delay_ms: 100,
            ..EngineConfig::default()
        };
        let mut h = Harness::with_config(MemoryMode::Balanced, config, 0.1);
        h.place(0, 1.0);
        h.bind(0, "a");
        h.tick_at(0);
        assert!(h.is_active(0));
        assert!(!h.is_playing("a"));
        h.tick_at(50);
        assert!(!h.is_playing("a"));
        h.tick_at(100);
        assert!(h.is_playing("a"));
    }

    #[test]
    fn test_delayed_start_cancelled_by_scroll() {
        let config = EngineConfig {
            start_delay_ms: 100,
            ..EngineConfig::default()
        };
        let mut h = Harness::with_config(MemoryMode::Balanced, config, 0.1);
        h.place(0, 1.0);
        h.bind(0, "a");
        h.tick_at(0);

        h.place(0, 0.2);
        h.master.on_host_changed(HostId(1));
        h.tick_at(50);
        h.tick_at(500);
        assert!(!h.is_playing("a"));
        assert!(!h.calls().contains(&"a.mp4:play".to_string()));
    }

    #[test]
    fn test_selection_published_after_structure_events() {
        let mut h = Harness::new(MemoryMode::Balanced);
        h.place(0, 1.0);
        h.place(1, 1.0);
        h.bind(0, "a");
        h.bind(1, "b");
        h.tick();

        let events = h.master.group_of(h.manager).unwrap().bus().poll();
        let attached: Vec<u64> = events
            .iter()
            .filter(|e| {
                e.get::<PlaybackStateEvent>()
                    .is_some_and(|s| s.state == PlaybackState::Attached)
            })
            .map(|e| e.seq)
            .collect();
        let selection: Vec<&SelectionChangedEvent> = events
            .iter()
            .filter_map(|e| e.get::<SelectionChangedEvent>())
            .collect();
        let selection_seq = events
            .iter()
            .find(|e| e.get::<SelectionChangedEvent>().is_some())
            .unwrap()
            .seq;

        assert_eq!(attached.len(), 2);
        assert!(attached.iter().all(|seq| *seq < selection_seq));
        // One batched event for both additions
        assert_eq!(selection.len(), 1);
        assert_eq!(selection[0].added.len(), 2);
        assert!(events.windows(2).all(|w| w[0].seq < w[1].seq));
    }

    #[test]
    fn test_refresh_is_idempotent() {
        let mut h = Harness::new(MemoryMode::Balanced);
        h.place(0, 1.0);
        h.bind(0, "a");
        h.tick();
        selections(&h);
        h.clear();

        h.relayout();
        h.relayout();
        assert!(selections(&h).is_empty());
        assert!(h.calls().is_empty());
    }

    #[test]
    fn test_empty_selection_published() {
        let mut h = Harness::new(MemoryMode::Balanced);
        h.place(0, 0.1);
        h.bind(0, "a");
        h.tick();
        let first = selections(&h);
        assert_eq!(first.len(), 1);
        assert!(first[0].selected.is_empty());

        h.place(0, 1.0);
        h.relayout();
        let id = h.master.playback_at(SlotId(0)).unwrap().id;
        assert_eq!(selections(&h)[0].added, vec![id]);

        h.host.scroll_to(0, 1000);
        h.relayout();
        let last = selections(&h);
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].removed, vec![id]);
        assert!(last[0].selected.is_empty());
        assert!(!h.is_playing("a"));
    }

    #[test]
    fn test_pager_selects_one_page() {
        let mut h = Harness::new(MemoryMode::Balanced);
        let pager = FakeHost::new(Rect::from_size(0, 0, 100, 100));
        h.master
            .add_bucket(h.manager, HostId(2), HostKind::pager(), Box::new(pager.clone()))
            .unwrap();
        for slot in [10, 11] {
            pager.set_slot(SlotId(slot), Rect::from_size(0, 0, 100, 100));
            h.master
                .set_up(Media::new(format!("{}.mp4", slot)))
                .bind(&mut h.master, SlotId(slot))
                .unwrap();
        }
        h.tick();
        let active = [10, 11].iter().filter(|s| h.is_active(**s)).count();
        assert_eq!(active, 1);
    }

    #[test]
    fn test_auto_mode_follows_pressure() {
        let mut relaxed = Harness::with_config(MemoryMode::Auto, EngineConfig::default(), 0.2);
        let mut pressed = Harness::with_config(MemoryMode::Auto, EngineConfig::default(), 0.95);
        for h in [&mut relaxed, &mut pressed] {
            for (slot, tag) in ["a", "b", "c"].iter().enumerate() {
                h.place(slot as u64, 1.0);
                h.bind(slot as u64, tag);
            }
            h.tick();
        }
        let count = |h: &Harness| ["a", "b", "c"].iter().filter(|t| h.is_playing(t)).count();
        assert_eq!(count(&relaxed), 3);
        assert_eq!(count(&pressed), 1);
    }

    #[test]
    fn test_normal_mode_resets_neighbours() {
        let mut h = Harness::new(MemoryMode::Normal);
        for (slot, tag) in ["a", "b", "c"].iter().enumerate() {
            h.place(slot as u64, 1.0);
            h.bind(slot as u64, tag);
        }
        h.tick();
        assert!(h.calls().contains(&"c.mp4:reset".to_string()));

        let mut b = Harness::new(MemoryMode::Balanced);
        for (slot, tag) in ["a", "b", "c", "d"].iter().enumerate() {
            b.place(slot as u64, 1.0);
            b.bind(slot as u64, tag);
        }
        b.tick();
        assert!(!b.calls().iter().any(|c| c.ends_with(":reset")));
    }
}
