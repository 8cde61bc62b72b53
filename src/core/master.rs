//! Master - owner of every engine entity and the single coordinator.
//!
//! Groups, Managers, Buckets, Playbacks and Playables live in arenas keyed
//! by id; everything else refers to them by id. All mutation happens on the
//! thread that owns the Master. Player backends report back through a
//! channel that is drained at the start of every [`Master::tick`].
//!
//! Tick order:
//! 1. bridge events are republished on the owning Group's bus
//! 2. pending binds are retried against the current hosts
//! 3. dirty Groups are refreshed, in creation order
//! 4. delayed starts whose deadline passed are played

use crossbeam_channel::{Receiver, Sender, unbounded};
use indexmap::IndexMap;
use log::{debug, info, trace, warn};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Instant;

use crate::config::EngineConfig;
use crate::core::binder::{BindRequest, Binder};
use crate::core::bucket::{Bucket, HostKind, HostLayout};
use crate::core::creator::PlayableCreator;
use crate::core::dispatcher::Dispatcher;
use crate::core::event_bus::EventBus;
use crate::core::events::{
    PlayableChangedEvent, PlayableErrorEvent, PlayerStateEvent, RenderedFirstFrameEvent,
    VideoSizeChangedEvent,
};
use crate::core::group::Group;
use crate::core::manager::Manager;
use crate::core::memory::{MemoryGauge, MemoryMode, MemoryPressure, SystemMemory, TrimLevel};
use crate::core::playable::Playable;
use crate::core::playback::Playback;
use crate::entities::{
    BridgeEvent, BridgeEventKind, BucketId, ContextKey, Controller, GroupId, HostId, HostView,
    ManagerId, Media, PlayableId, PlaybackId, PlaybackInfo, PlayerState, RendererType, ScopeKey,
    SlotId, Tag, VolumeInfo,
};
use crate::error::{Error, Result};

/// Callback run whenever the Playable of a tag changes Playback.
pub type PlayableObserver = Box<dyn Fn(&PlayableChangedEvent)>;

/// Target of a lock or volume change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    Global,
    Group(GroupId),
    Manager(ManagerId),
    Bucket(BucketId),
    Playback(PlaybackId),
}

pub struct Master {
    pub(crate) config: EngineConfig,
    pub(crate) groups: IndexMap<GroupId, Group>,
    contexts: HashMap<ContextKey, GroupId>,
    pub(crate) managers: IndexMap<ManagerId, Manager>,
    scopes: HashMap<ScopeKey, ManagerId>,
    pub(crate) buckets: IndexMap<BucketId, Bucket>,
    pub(crate) hosts: HashMap<HostId, BucketId>,
    pub(crate) playbacks: IndexMap<PlaybackId, Playback>,
    /// Slot -> the Playback bound to it
    pub(crate) slots: HashMap<SlotId, PlaybackId>,
    pub(crate) playables: IndexMap<PlayableId, Playable>,
    /// Tag -> Playable, real tags only
    pub(crate) tags: HashMap<Tag, PlayableId>,
    pub(crate) creators: IndexMap<RendererType, Box<dyn PlayableCreator>>,
    pub(crate) dispatcher: Dispatcher,
    /// Binds waiting for a host that accepts their slot, one per slot
    pub(crate) pending_binds: IndexMap<SlotId, BindRequest>,
    /// Resume state of released Playables, by tag
    pub(crate) info_store: HashMap<Tag, PlaybackInfo>,
    pub(crate) observers: HashMap<Tag, Vec<PlayableObserver>>,
    pub(crate) gauge: MemoryGauge,
    pub(crate) volume: VolumeInfo,
    pub(crate) locked: bool,
    pub(crate) events_tx: Sender<BridgeEvent>,
    events_rx: Receiver<BridgeEvent>,
}

impl Master {
    /// Master measuring memory pressure with `sysinfo`.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_memory_probe(config, Box::new(SystemMemory::new()))
    }

    pub fn with_memory_probe(config: EngineConfig, probe: Box<dyn MemoryPressure>) -> Result<Self> {
        config.validate()?;
        let gauge = MemoryGauge::new(probe, config.memory.critical_fraction);
        let (events_tx, events_rx) = unbounded();
        info!(
            "Master created: threshold={}, start_delay={}ms",
            config.threshold, config.start_delay_ms
        );
        Ok(Self {
            config,
            groups: IndexMap::new(),
            contexts: HashMap::new(),
            managers: IndexMap::new(),
            scopes: HashMap::new(),
            buckets: IndexMap::new(),
            hosts: HashMap::new(),
            playbacks: IndexMap::new(),
            slots: HashMap::new(),
            playables: IndexMap::new(),
            tags: HashMap::new(),
            creators: IndexMap::new(),
            dispatcher: Dispatcher::new(),
            pending_binds: IndexMap::new(),
            info_store: HashMap::new(),
            observers: HashMap::new(),
            gauge,
            volume: VolumeInfo::default(),
            locked: false,
            events_tx,
            events_rx,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register the creator for its renderer type, replacing any previous one.
    pub fn register_creator(&mut self, creator: Box<dyn PlayableCreator>) {
        let renderer_type = creator.renderer_type().clone();
        info!("Creator registered for '{}'", renderer_type);
        if let Some(mut old) = self.creators.insert(renderer_type, creator) {
            old.clean_up();
        }
    }

    /// Start building a bind of `media`. The renderer type defaults to the
    /// first registered creator.
    pub fn set_up(&self, media: Media) -> Binder {
        let renderer_type = self
            .creators
            .keys()
            .next()
            .cloned()
            .unwrap_or_else(|| RendererType::from("video"));
        Binder::new(media, renderer_type, &self.config)
    }

    // === Lifecycle ===

    /// Register a lifecycle scope under a context. Scopes of one context
    /// share a Group. Registering a known scope returns its Manager.
    pub fn register(
        &mut self,
        context: impl Into<ContextKey>,
        scope: impl Into<ScopeKey>,
        memory_mode: MemoryMode,
    ) -> ManagerId {
        let scope = scope.into();
        if let Some(&id) = self.scopes.get(&scope) {
            return id;
        }
        let context = context.into();
        let group_id = match self.contexts.get(&context) {
            Some(&id) => id,
            None => {
                let bus = EventBus::new(self.config.event_queue_bound);
                let group = Group::new(context.clone(), bus, self.volume);
                let id = group.id;
                info!("Group {} created for {}", id, context.0);
                self.contexts.insert(context, id);
                self.groups.insert(id, group);
                id
            }
        };
        let volume = self.groups.get(&group_id).map_or(self.volume, |g| g.volume);
        let manager = Manager::new(group_id, scope.clone(), memory_mode, volume);
        let id = manager.id;
        if let Some(group) = self.groups.get_mut(&group_id) {
            group.managers.push(id);
        }
        info!("Manager {} registered: scope={}, mode={:?}", id, scope.0, memory_mode);
        self.scopes.insert(scope, id);
        self.managers.insert(id, manager);
        id
    }

    pub fn on_scope_started(&mut self, scope: &ScopeKey) {
        let Some(manager) = self.scopes.get(scope).and_then(|id| self.managers.get_mut(id)) else {
            trace!("start of unknown scope {} ignored", scope.0);
            return;
        };
        if manager.started {
            return;
        }
        manager.started = true;
        let (id, group) = (manager.id, manager.group);
        debug!("Manager {} started", id);
        self.dispatcher.start();
        self.mark_dirty(group);
    }

    /// Scope went to the background: everything it plays is paused now.
    pub fn on_scope_stopped(&mut self, scope: &ScopeKey) {
        let Some(&id) = self.scopes.get(scope) else {
            trace!("stop of unknown scope {} ignored", scope.0);
            return;
        };
        self.stop_manager(id);
    }

    fn stop_manager(&mut self, id: ManagerId) {
        let Some(manager) = self.managers.get_mut(&id) else {
            return;
        };
        if manager.started {
            manager.started = false;
            debug!("Manager {} stopped", id);
            for playback in self.traverse(&[id]) {
                self.pause_playback(playback, true);
            }
            self.mark_manager_dirty(id);
        }
        if !self.managers.values().any(|m| m.started) {
            self.dispatcher.stop();
        }
    }

    /// Scope ended: its hosts and Playbacks go away, and Playables it bound
    /// that were not rebound elsewhere are torn down.
    pub fn on_scope_destroyed(&mut self, scope: &ScopeKey) {
        let Some(&id) = self.scopes.get(scope) else {
            trace!("destroy of unknown scope {} ignored", scope.0);
            return;
        };
        self.stop_manager(id);
        self.scopes.remove(scope);

        let hosts: Vec<HostId> = self
            .managers
            .get(&id)
            .map(|m| m.buckets.keys().copied().collect())
            .unwrap_or_default();
        for host in &hosts {
            self.remove_bucket(*host);
        }
        self.pending_binds
            .retain(|_, request| request.host.is_none_or(|h| !hosts.contains(&h)));

        let Some(manager) = self.managers.shift_remove(&id) else {
            return;
        };
        for playable in manager.playables {
            if self.playables.get(&playable).is_some_and(|p| p.playback.is_none()) {
                self.tear_down_playable(playable);
            }
        }

        let group_id = manager.group;
        let now_empty = match self.groups.get_mut(&group_id) {
            Some(group) => {
                group.managers.retain(|m| *m != id);
                if group.sticky == Some(id) {
                    group.sticky = None;
                }
                group.managers.is_empty()
            }
            None => false,
        };
        info!("Manager {} destroyed", id);
        if now_empty {
            if let Some(group) = self.groups.shift_remove(&group_id) {
                self.contexts.remove(&group.context);
                info!("Group {} removed", group_id);
            }
        }
    }

    // === Hosts ===

    pub fn add_bucket(
        &mut self,
        manager: ManagerId,
        host: HostId,
        kind: HostKind,
        view: Box<dyn HostView>,
    ) -> Result<BucketId> {
        if self.hosts.contains_key(&host) {
            return Err(Error::HostAlreadyRegistered(host));
        }
        let owner = self
            .managers
            .get_mut(&manager)
            .ok_or(Error::UnknownManager(manager))?;
        let bucket = Bucket::new(host, manager, kind, view, owner.volume);
        let id = bucket.id;
        owner.buckets.insert(host, id);
        let group = owner.group;
        debug!("Bucket {} added for {} ({})", id, host, bucket.kind.kind_name());
        self.hosts.insert(host, id);
        self.buckets.insert(id, bucket);
        self.mark_dirty(group);
        self.resolve_pending_binds();
        Ok(id)
    }

    /// Unregister a host. Its Playbacks are removed, their Playables paused
    /// and released.
    pub fn remove_bucket(&mut self, host: HostId) {
        let Some(id) = self.hosts.remove(&host) else {
            trace!("removal of unknown {} ignored", host);
            return;
        };
        let slots: Vec<SlotId> = self
            .buckets
            .get(&id)
            .map(|b| b.slots().collect())
            .unwrap_or_default();
        for slot in slots {
            if let Some(&playback) = self.slots.get(&slot) {
                self.remove_playback(playback, true);
            }
        }
        if let Some(bucket) = self.buckets.shift_remove(&id) {
            debug!("Bucket {} removed", id);
            if let Some(manager) = self.managers.get_mut(&bucket.manager) {
                manager.buckets.shift_remove(&host);
                if manager.sticky == Some(id) {
                    manager.sticky = None;
                }
            }
            self.mark_manager_dirty(bucket.manager);
        }
    }

    /// Host scrolled or re-laid out.
    pub fn on_host_changed(&mut self, host: HostId) {
        let Some(manager) = self
            .hosts
            .get(&host)
            .and_then(|id| self.buckets.get(id))
            .map(|b| b.manager)
        else {
            trace!("change of unknown {} ignored", host);
            return;
        };
        self.mark_manager_dirty(manager);
    }

    /// Slot entered a host's layout.
    pub fn on_slot_attached(&mut self, slot: SlotId) {
        if self.pending_binds.contains_key(&slot) {
            self.resolve_pending_binds();
        }
        match self.slots.get(&slot).copied() {
            Some(playback) => self.mark_playback_dirty(playback),
            None => trace!("attach of unbound {} ignored", slot),
        }
    }

    /// Slot left a host's layout. The next refresh pauses and detaches.
    pub fn on_slot_detached(&mut self, slot: SlotId) {
        match self.slots.get(&slot).copied() {
            Some(playback) => self.mark_playback_dirty(playback),
            None => trace!("detach of unbound {} ignored", slot),
        }
    }

    // === Client control ===

    /// Client asked to play `tag`. A Playable whose controller refuses
    /// system pauses becomes client-started and outranks everything else.
    pub fn play(&mut self, tag: &Tag) -> Result<()> {
        let id = *self.tags.get(tag).ok_or_else(|| Error::UnknownTag(tag.clone()))?;
        let controller = self.controller_of(id);
        let manual = controller.as_ref().is_some_and(|c| !c.can_pause());
        if let Some(playable) = self.playables.get_mut(&id) {
            playable.rewind_if_ended();
        }
        debug!("Client play {} (manual={})", tag, manual);
        self.dispatcher.on_client_play(tag, manual);
        self.mark_playable_dirty(id);
        Ok(())
    }

    pub fn pause(&mut self, tag: &Tag) -> Result<()> {
        let id = *self.tags.get(tag).ok_or_else(|| Error::UnknownTag(tag.clone()))?;
        debug!("Client pause {}", tag);
        self.dispatcher.on_client_pause(tag);
        self.mark_playable_dirty(id);
        Ok(())
    }

    pub(crate) fn controller_of(&self, playable: PlayableId) -> Option<Rc<dyn Controller>> {
        self.playables
            .get(&playable)
            .and_then(|p| p.playback)
            .and_then(|id| self.playbacks.get(&id))
            .and_then(|p| p.config.controller.clone())
    }

    /// Locked scopes select nothing; their Playables pause on the next tick.
    pub fn lock(&mut self, scope: Scope) -> Result<()> {
        self.set_locked(scope, true)
    }

    pub fn unlock(&mut self, scope: Scope) -> Result<()> {
        self.set_locked(scope, false)
    }

    fn set_locked(&mut self, scope: Scope, locked: bool) -> Result<()> {
        let group = match scope {
            Scope::Global => {
                self.locked = locked;
                None
            }
            Scope::Group(id) => {
                let group = self.groups.get_mut(&id).ok_or(Error::UnknownGroup(id))?;
                group.locked = locked;
                Some(id)
            }
            Scope::Manager(id) => {
                let manager = self.managers.get_mut(&id).ok_or(Error::UnknownManager(id))?;
                manager.locked = locked;
                Some(manager.group)
            }
            Scope::Bucket(id) => {
                let bucket = self.buckets.get_mut(&id).ok_or(Error::UnknownBucket(id))?;
                bucket.locked = locked;
                let manager = bucket.manager;
                self.managers.get(&manager).map(|m| m.group)
            }
            Scope::Playback(id) => {
                let playback = self.playbacks.get_mut(&id).ok_or(Error::UnknownPlayback(id))?;
                playback.locked = locked;
                let manager = playback.manager;
                self.managers.get(&manager).map(|m| m.group)
            }
        };
        debug!("{:?} locked={}", scope, locked);
        match group {
            Some(group) => self.mark_dirty(group),
            None => self.mark_all_dirty(),
        }
        Ok(())
    }

    /// Pin a scope at the head of selection. A sticky Manager is the only
    /// one of its Group that selects anything; a sticky Bucket ranks ahead
    /// of the other Buckets of its Manager. Sticking a Playback sticks both
    /// its Bucket and its Manager. One of each per Group/Manager at a time.
    pub fn stick(&mut self, scope: Scope) -> Result<()> {
        let (manager, bucket) = match scope {
            Scope::Global => return Err(Error::NotStickable("the global scope")),
            Scope::Group(_) => return Err(Error::NotStickable("a group")),
            Scope::Manager(id) => (id, None),
            Scope::Bucket(id) => {
                let bucket = self.buckets.get(&id).ok_or(Error::UnknownBucket(id))?;
                (bucket.manager, Some(id))
            }
            Scope::Playback(id) => {
                let playback = self.playbacks.get(&id).ok_or(Error::UnknownPlayback(id))?;
                (playback.manager, Some(playback.bucket))
            }
        };
        let owner = self
            .managers
            .get_mut(&manager)
            .ok_or(Error::UnknownManager(manager))?;
        let group = owner.group;
        match (scope, bucket) {
            (Scope::Bucket(_), Some(bucket)) => owner.sticky = Some(bucket),
            (Scope::Playback(_), Some(bucket)) => {
                owner.sticky = Some(bucket);
                self.set_sticky_manager(group, manager);
            }
            _ => self.set_sticky_manager(group, manager),
        }
        debug!("{:?} stuck", scope);
        self.mark_dirty(group);
        Ok(())
    }

    /// Undo [`Master::stick`]. Unsticking a Group or the global scope clears
    /// every sticky Manager and Bucket under it. Scopes that are not sticky
    /// are left alone.
    pub fn unstick(&mut self, scope: Scope) -> Result<()> {
        let groups: Vec<GroupId> = match scope {
            Scope::Global => self.groups.keys().copied().collect(),
            Scope::Group(id) => {
                if !self.groups.contains_key(&id) {
                    return Err(Error::UnknownGroup(id));
                }
                vec![id]
            }
            Scope::Manager(id) => {
                let group = self.managers.get(&id).ok_or(Error::UnknownManager(id))?.group;
                if let Some(g) = self.groups.get_mut(&group) {
                    if g.sticky == Some(id) {
                        g.sticky = None;
                    }
                }
                self.mark_dirty(group);
                return Ok(());
            }
            Scope::Bucket(id) => {
                let manager = self.buckets.get(&id).ok_or(Error::UnknownBucket(id))?.manager;
                self.unstick_bucket(manager, id);
                return Ok(());
            }
            Scope::Playback(id) => {
                let playback = self.playbacks.get(&id).ok_or(Error::UnknownPlayback(id))?;
                let (manager, bucket) = (playback.manager, playback.bucket);
                if let Some(group) = self.managers.get(&manager).map(|m| m.group) {
                    if let Some(g) = self.groups.get_mut(&group) {
                        if g.sticky == Some(manager) {
                            g.sticky = None;
                        }
                    }
                }
                self.unstick_bucket(manager, bucket);
                return Ok(());
            }
        };
        for group in groups {
            let Some(g) = self.groups.get_mut(&group) else {
                continue;
            };
            g.sticky = None;
            for manager in g.managers.clone() {
                if let Some(m) = self.managers.get_mut(&manager) {
                    m.sticky = None;
                }
            }
            self.mark_dirty(group);
        }
        debug!("{:?} unstuck", scope);
        Ok(())
    }

    fn set_sticky_manager(&mut self, group: GroupId, manager: ManagerId) {
        if let Some(g) = self.groups.get_mut(&group) {
            g.sticky = Some(manager);
        }
    }

    fn unstick_bucket(&mut self, manager: ManagerId, bucket: BucketId) {
        let Some(m) = self.managers.get_mut(&manager) else {
            return;
        };
        if m.sticky == Some(bucket) {
            m.sticky = None;
        }
        let group = m.group;
        self.mark_dirty(group);
    }

    /// Set the volume of a scope. Everything below it inherits the value and
    /// the Playables bound there get it immediately.
    pub fn apply_volume(&mut self, volume: VolumeInfo, scope: Scope) -> Result<()> {
        let targets = match scope {
            Scope::Global => {
                self.volume = volume;
                for group in self.groups.values_mut() {
                    group.volume = volume;
                }
                let managers: Vec<ManagerId> = self.managers.keys().copied().collect();
                for manager in &managers {
                    self.set_manager_volume(*manager, volume);
                }
                self.traverse(&managers)
            }
            Scope::Group(id) => {
                let group = self.groups.get_mut(&id).ok_or(Error::UnknownGroup(id))?;
                group.volume = volume;
                let managers = group.managers.clone();
                for manager in &managers {
                    self.set_manager_volume(*manager, volume);
                }
                self.traverse(&managers)
            }
            Scope::Manager(id) => {
                if !self.managers.contains_key(&id) {
                    return Err(Error::UnknownManager(id));
                }
                self.set_manager_volume(id, volume);
                self.traverse(&[id])
            }
            Scope::Bucket(id) => {
                let bucket = self.buckets.get_mut(&id).ok_or(Error::UnknownBucket(id))?;
                bucket.volume = volume;
                bucket
                    .slots()
                    .filter_map(|slot| self.slots.get(&slot).copied())
                    .collect()
            }
            Scope::Playback(id) => {
                if !self.playbacks.contains_key(&id) {
                    return Err(Error::UnknownPlayback(id));
                }
                vec![id]
            }
        };
        debug!("{:?} volume={:?} ({} playbacks)", scope, volume, targets.len());
        for id in targets {
            let Some(playback) = self.playbacks.get_mut(&id) else {
                continue;
            };
            playback.volume = volume;
            if let Some(playable) = playback.playable.and_then(|p| self.playables.get_mut(&p)) {
                playable.set_volume(volume);
            }
        }
        Ok(())
    }

    fn set_manager_volume(&mut self, id: ManagerId, volume: VolumeInfo) {
        let Some(manager) = self.managers.get_mut(&id) else {
            return;
        };
        manager.volume = volume;
        for bucket in manager.buckets.values() {
            if let Some(bucket) = self.buckets.get_mut(bucket) {
                bucket.volume = volume;
            }
        }
    }

    /// Host memory callback. Critical pressure also drops idle pooled objects.
    pub fn on_trim_memory(&mut self, level: Option<TrimLevel>) {
        self.gauge.set_trim_level(level);
        if level == Some(TrimLevel::Critical) {
            warn!("Critical memory pressure, cleaning up creators");
            for creator in self.creators.values_mut() {
                creator.clean_up();
            }
        }
        self.mark_all_dirty();
    }

    /// Watch which Playback the Playable of `tag` is bound to.
    pub fn observe(&mut self, tag: impl Into<Tag>, observer: impl Fn(&PlayableChangedEvent) + 'static) {
        self.observers
            .entry(tag.into())
            .or_default()
            .push(Box::new(observer));
    }

    pub fn unobserve(&mut self, tag: &Tag) {
        self.observers.remove(tag);
    }

    // === Tick ===

    pub fn tick(&mut self, now: Instant) {
        self.drain_bridge_events();
        self.resolve_pending_binds();
        let dirty: Vec<GroupId> = self
            .groups
            .values()
            .filter(|g| g.dirty)
            .map(|g| g.id)
            .collect();
        for group in dirty {
            self.refresh_group(group, now);
        }
        for playable in self.dispatcher.due(now) {
            self.start_due(playable);
        }
    }

    /// Refresh every Group now.
    pub fn refresh_all(&mut self) {
        self.mark_all_dirty();
        self.tick(Instant::now());
    }

    fn drain_bridge_events(&mut self) {
        let events: Vec<BridgeEvent> = self.events_rx.try_iter().collect();
        for event in events {
            let bus = self.bus_of_playable(event.playable);
            let Some(playable) = self.playables.get_mut(&event.playable) else {
                trace!("event for torn down {} dropped", event.playable);
                continue;
            };
            let tag = playable.tag.clone();
            match event.kind {
                BridgeEventKind::StateChanged {
                    play_when_ready,
                    state,
                } => {
                    if state == PlayerState::Ended {
                        playable.mark_ended();
                    }
                    if let Some(bus) = bus {
                        bus.emit(PlayerStateEvent {
                            playable: event.playable,
                            tag,
                            play_when_ready,
                            state,
                        });
                    }
                }
                BridgeEventKind::RenderedFirstFrame => {
                    if let Some(bus) = bus {
                        bus.emit(RenderedFirstFrameEvent {
                            playable: event.playable,
                            tag,
                        });
                    }
                }
                BridgeEventKind::VideoSizeChanged { width, height } => {
                    if let Some(bus) = bus {
                        bus.emit(VideoSizeChangedEvent {
                            playable: event.playable,
                            width,
                            height,
                        });
                    }
                }
                BridgeEventKind::Error(message) => {
                    warn!("Playable {} ({}) failed: {}", event.playable, tag, message);
                    if let Some(bus) = bus {
                        bus.emit(PlayableErrorEvent {
                            playable: event.playable,
                            tag,
                            message,
                        });
                    }
                }
            }
        }
    }

    // === Bookkeeping ===

    /// Playbacks of `managers` in traversal order: manager, bucket, slot.
    pub(crate) fn traverse(&self, managers: &[ManagerId]) -> Vec<PlaybackId> {
        let mut out = Vec::new();
        for manager in managers.iter().filter_map(|id| self.managers.get(id)) {
            for bucket in manager.buckets.values().filter_map(|id| self.buckets.get(id)) {
                out.extend(
                    bucket
                        .slots()
                        .filter_map(|slot| self.slots.get(&slot))
                        .filter(|id| self.playbacks.contains_key(*id)),
                );
            }
        }
        out
    }

    pub(crate) fn group_of_playback(&self, playback: PlaybackId) -> Option<GroupId> {
        self.playbacks
            .get(&playback)
            .and_then(|p| self.managers.get(&p.manager))
            .map(|m| m.group)
    }

    pub(crate) fn bus_of_playback(&self, playback: PlaybackId) -> Option<EventBus> {
        self.group_of_playback(playback)
            .and_then(|id| self.groups.get(&id))
            .map(|g| g.bus())
    }

    fn bus_of_playable(&self, playable: PlayableId) -> Option<EventBus> {
        self.playables
            .get(&playable)
            .and_then(|p| p.playback)
            .and_then(|id| self.bus_of_playback(id))
    }

    pub(crate) fn mark_dirty(&mut self, group: GroupId) {
        if let Some(group) = self.groups.get_mut(&group) {
            group.dirty = true;
        }
    }

    fn mark_all_dirty(&mut self) {
        for group in self.groups.values_mut() {
            group.dirty = true;
        }
    }

    pub(crate) fn mark_manager_dirty(&mut self, manager: ManagerId) {
        if let Some(group) = self.managers.get(&manager).map(|m| m.group) {
            self.mark_dirty(group);
        }
    }

    pub(crate) fn mark_playback_dirty(&mut self, playback: PlaybackId) {
        if let Some(group) = self.group_of_playback(playback) {
            self.mark_dirty(group);
        }
    }

    fn mark_playable_dirty(&mut self, playable: PlayableId) {
        if let Some(playback) = self.playables.get(&playable).and_then(|p| p.playback) {
            self.mark_playback_dirty(playback);
        }
    }

    // === Queries ===

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id)
    }

    /// Group a Manager belongs to.
    pub fn group_of(&self, manager: ManagerId) -> Option<&Group> {
        self.managers
            .get(&manager)
            .and_then(|m| self.groups.get(&m.group))
    }

    pub fn manager(&self, id: ManagerId) -> Option<&Manager> {
        self.managers.get(&id)
    }

    pub fn bucket(&self, id: BucketId) -> Option<&Bucket> {
        self.buckets.get(&id)
    }

    pub fn playback(&self, id: PlaybackId) -> Option<&Playback> {
        self.playbacks.get(&id)
    }

    pub fn playback_at(&self, slot: SlotId) -> Option<&Playback> {
        self.slots.get(&slot).and_then(|id| self.playbacks.get(id))
    }

    pub fn playable(&self, tag: &Tag) -> Option<&Playable> {
        self.tags.get(tag).and_then(|id| self.playables.get(id))
    }

    pub fn playable_by_id(&self, id: PlayableId) -> Option<&Playable> {
        self.playables.get(&id)
    }

    pub fn playable_at(&self, slot: SlotId) -> Option<&Playable> {
        self.playback_at(slot)
            .and_then(|p| p.playable)
            .and_then(|id| self.playables.get(&id))
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn has_pending_bind(&self, slot: SlotId) -> bool {
        self.pending_binds.contains_key(&slot)
    }

    /// Saved resume state of a released Playable.
    pub fn saved_info(&self, tag: &Tag) -> Option<PlaybackInfo> {
        self.info_store.get(tag).copied()
    }

    pub fn volume(&self) -> VolumeInfo {
        self.volume
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

impl std::fmt::Debug for Master {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Master")
            .field("groups", &self.groups.len())
            .field("managers", &self.managers.len())
            .field("buckets", &self.buckets.len())
            .field("playbacks", &self.playbacks.len())
            .field("playables", &self.playables.len())
            .field("pending_binds", &self.pending_binds.len())
            .field("creators", &self.creators.keys().collect::<Vec<_>>())
            .finish()
    }
}
