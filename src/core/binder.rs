//! Binding media to slots.
//!
//! [`Binder`] is the client entry point:
//!
//! ```text
//! master.set_up(media).with_tag("intro").bind(&mut master, slot)?
//! ```
//!
//! Resolution rules, applied on the coordinator:
//! - a tag names at most one Playable; binding it to a slot that already
//!   shows another Playback moves it (rebinding keeps the bridge)
//! - the Playable previously on the slot is paused and released
//! - a slot no host accepts yet waits as a pending bind, one per slot
//! - binds without a tag always get a fresh Playable, torn down on unbind

use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::core::event_bus::EventBus;
use crate::core::events::PlayableChangedEvent;
use crate::core::master::Master;
use crate::core::playable::{Playable, PlayableStage};
use crate::core::playback::{BindConfig, Playback};
use crate::entities::{
    BridgeEvents, BucketId, Controller, HostId, Media, PlayableId, PlaybackCallback, PlaybackId,
    RendererType, RepeatMode, SlotId, Tag,
};
use crate::error::{Error, Result};

/// A bind waiting to be resolved.
#[derive(Debug)]
pub(crate) struct BindRequest {
    pub(crate) slot: SlotId,
    pub(crate) host: Option<HostId>,
    pub(crate) media: Media,
    pub(crate) tag: Tag,
    pub(crate) renderer_type: RendererType,
    pub(crate) config: BindConfig,
}

/// Builder for one bind. Obtain it from [`Master::set_up`].
#[derive(Debug)]
pub struct Binder {
    media: Media,
    tag: Tag,
    renderer_type: RendererType,
    host: Option<HostId>,
    config: BindConfig,
}

impl Binder {
    pub(crate) fn new(media: Media, renderer_type: RendererType, config: &EngineConfig) -> Self {
        Self {
            media,
            tag: Tag::none(),
            renderer_type,
            host: None,
            config: BindConfig::new(config.threshold, config.start_delay()),
        }
    }

    /// Identity of the Playable. Without a tag the Playable is private to
    /// this bind.
    pub fn with_tag(mut self, tag: impl Into<Tag>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.config.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.config.delay = delay;
        self
    }

    /// Load the source as soon as the Playback is prioritized.
    pub fn with_preload(mut self, preload: bool) -> Self {
        self.config.preload = preload;
        self
    }

    pub fn with_repeat_mode(mut self, mode: RepeatMode) -> Self {
        self.config.repeat_mode = mode;
        self
    }

    pub fn with_controller(mut self, controller: Rc<dyn Controller>) -> Self {
        self.config.controller = Some(controller);
        self
    }

    pub fn with_callback(mut self, callback: Rc<dyn PlaybackCallback>) -> Self {
        self.config.callbacks.push(callback);
        self
    }

    pub fn with_renderer_type(mut self, renderer_type: impl Into<RendererType>) -> Self {
        self.renderer_type = renderer_type.into();
        self
    }

    /// Only bind through this host. Fails if another live host owns the slot.
    pub fn in_host(mut self, host: HostId) -> Self {
        self.host = Some(host);
        self
    }

    /// Bind to `slot`. Tagged binds return a [`Rebinder`] for moving the
    /// Playable to another slot later.
    pub fn bind(self, master: &mut Master, slot: SlotId) -> Result<Option<Rebinder>> {
        master.bind(BindRequest {
            slot,
            host: self.host,
            media: self.media,
            tag: self.tag,
            renderer_type: self.renderer_type,
            config: self.config,
        })
    }
}

/// Serializable handle for re-binding a tagged Playable, e.g. to a
/// fullscreen slot after a configuration change.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rebinder {
    tag: Tag,
    renderer_type: RendererType,
}

impl Rebinder {
    pub fn new(tag: Tag, renderer_type: RendererType) -> Result<Self> {
        if tag.is_none() {
            return Err(Error::RebindWithoutTag);
        }
        Ok(Self { tag, renderer_type })
    }

    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn renderer_type(&self) -> &RendererType {
        &self.renderer_type
    }

    /// Move the Playable to `slot`, keeping its current bind options.
    pub fn bind(&self, master: &mut Master, slot: SlotId) -> Result<()> {
        self.bind_with(master, slot, |binder| binder)
    }

    /// Like [`Rebinder::bind`], with a chance to adjust the options.
    pub fn bind_with(
        &self,
        master: &mut Master,
        slot: SlotId,
        configure: impl FnOnce(Binder) -> Binder,
    ) -> Result<()> {
        let playable = master
            .playable(&self.tag)
            .ok_or_else(|| Error::UnknownTag(self.tag.clone()))?;
        let config = playable
            .playback
            .and_then(|id| master.playbacks.get(&id))
            .map(|p| p.config.clone())
            .unwrap_or_else(|| {
                BindConfig::new(master.config.threshold, master.config.start_delay())
            });
        let binder = Binder {
            media: playable.media.clone(),
            tag: self.tag.clone(),
            renderer_type: self.renderer_type.clone(),
            host: None,
            config,
        };
        configure(binder).bind(master, slot).map(|_| ())
    }
}

// === Resolution ===

impl Master {
    pub(crate) fn bind(&mut self, request: BindRequest) -> Result<Option<Rebinder>> {
        if let Some(existing) = self.playable(&request.tag) {
            if existing.media != request.media {
                error!(
                    "Tag {} is bound to {}, refusing {}",
                    request.tag, existing.media.uri, request.media.uri
                );
                return Err(Error::TagMediaMismatch(request.tag));
            }
        }
        if !self.creators.contains_key(&request.renderer_type) {
            return Err(Error::NoCreator(request.renderer_type));
        }
        if let Some(host) = request.host {
            self.check_slot_owner(request.slot, host)?;
        }

        // The newest request for a slot or tag wins
        self.pending_binds.shift_remove(&request.slot);
        if !request.tag.is_none() {
            self.pending_binds.retain(|_, r| r.tag != request.tag);
        }

        let rebinder = (!request.tag.is_none()).then(|| Rebinder {
            tag: request.tag.clone(),
            renderer_type: request.renderer_type.clone(),
        });
        match self.find_bucket(request.slot, request.host) {
            Some(bucket) => self.attach_request(bucket, request)?,
            None => {
                debug!("Bind of {} to {} pending", request.tag, request.slot);
                self.pending_binds.insert(request.slot, request);
            }
        }
        Ok(rebinder)
    }

    fn check_slot_owner(&self, slot: SlotId, host: HostId) -> Result<()> {
        let owner = self
            .slots
            .get(&slot)
            .and_then(|id| self.playbacks.get(id))
            .and_then(|p| self.buckets.get(&p.bucket));
        match owner {
            Some(owner) if owner.host != host && owner.accepts(slot) => {
                Err(Error::SlotOwnedByOtherHost {
                    slot,
                    owner: owner.host,
                    requested: host,
                })
            }
            _ => Ok(()),
        }
    }

    /// Bucket that should hold `slot`: the requested host's, else the one
    /// already tracking it, else the first that accepts it.
    fn find_bucket(&self, slot: SlotId, host: Option<HostId>) -> Option<BucketId> {
        let accepts = |id: &BucketId| self.buckets.get(id).is_some_and(|b| b.accepts(slot));
        if let Some(host) = host {
            return self.hosts.get(&host).copied().filter(accepts);
        }
        let current = self
            .slots
            .get(&slot)
            .and_then(|id| self.playbacks.get(id))
            .map(|p| p.bucket);
        if let Some(bucket) = current.filter(accepts) {
            return Some(bucket);
        }
        self.buckets.values().find(|b| b.accepts(slot)).map(|b| b.id)
    }

    pub(crate) fn resolve_pending_binds(&mut self) {
        if self.pending_binds.is_empty() {
            return;
        }
        let slots: Vec<SlotId> = self.pending_binds.keys().copied().collect();
        for slot in slots {
            let Some(host) = self.pending_binds.get(&slot).map(|r| r.host) else {
                continue;
            };
            let Some(bucket) = self.find_bucket(slot, host) else {
                continue;
            };
            let Some(request) = self.pending_binds.shift_remove(&slot) else {
                continue;
            };
            debug!("Pending bind of {} to {} resolved", request.tag, slot);
            if let Err(err) = self.attach_request(bucket, request) {
                error!("Deferred bind to {} failed: {}", slot, err);
            }
        }
    }

    fn attach_request(&mut self, bucket_id: BucketId, request: BindRequest) -> Result<()> {
        let BindRequest {
            slot,
            media,
            tag,
            renderer_type,
            config,
            ..
        } = request;
        let bucket = self
            .buckets
            .get(&bucket_id)
            .ok_or(Error::UnknownBucket(bucket_id))?;
        let (manager, volume) = (bucket.manager, bucket.volume);
        let bus = self
            .managers
            .get(&manager)
            .and_then(|m| self.groups.get(&m.group))
            .map(|g| g.bus())
            .ok_or(Error::UnknownManager(manager))?;

        let playable_id = match self.tags.get(&tag).copied() {
            Some(id)
                if self
                    .playables
                    .get(&id)
                    .is_some_and(|p| p.renderer_type == renderer_type) =>
            {
                id
            }
            Some(id) => {
                info!("{} changes renderer type to {}, recreating", tag, renderer_type);
                self.tear_down_playable(id);
                self.create_playable(tag.clone(), media, renderer_type)?
            }
            None => self.create_playable(tag.clone(), media, renderer_type)?,
        };

        let from = self.playables.get(&playable_id).and_then(|p| p.playback);
        let occupant = self.slots.get(&slot).copied();
        if let Some(current) = from.filter(|p| Some(*p) == occupant) {
            if let Some(playback) = self.playbacks.get_mut(&current) {
                debug!("Playback {} rebound in place", current);
                playback.config = config;
            }
            self.mark_playback_dirty(current);
            return Ok(());
        }
        if let Some(old) = occupant {
            self.remove_playback(old, true);
        }
        if let Some(old) = from {
            // Moving: the bridge and its player stay with the Playable
            self.remove_playback(old, false);
        }

        let mut playback = Playback::new(slot, bucket_id, manager, config, volume, bus.clone());
        let id = playback.id;
        playback.playable = Some(playable_id);
        playback.on_added();
        if let Some(token) = self.buckets.get(&bucket_id).and_then(|b| b.token(slot)) {
            playback.on_attached();
            playback.set_token(token);
        }
        let repeat_mode = playback.config.repeat_mode;
        if let Some(bucket) = self.buckets.get_mut(&bucket_id) {
            bucket.add_slot(slot);
        }
        self.slots.insert(slot, id);
        self.playbacks.insert(id, playback);
        if let Some(manager) = self.managers.get_mut(&manager) {
            manager.playables.insert(playable_id);
        }
        if let Some(playable) = self.playables.get_mut(&playable_id) {
            playable.playback = Some(id);
            playable.set_repeat_mode(repeat_mode);
            playable.set_volume(volume);
        }
        info!("Playback {} binds {} to {}", id, tag, slot);
        self.publish_playable_changed(
            &bus,
            PlayableChangedEvent {
                tag,
                playable: playable_id,
                from,
                to: Some(id),
            },
        );
        self.mark_playback_dirty(id);
        Ok(())
    }

    fn create_playable(
        &mut self,
        tag: Tag,
        media: Media,
        renderer_type: RendererType,
    ) -> Result<PlayableId> {
        let creator = self
            .creators
            .get_mut(&renderer_type)
            .ok_or_else(|| Error::NoCreator(renderer_type.clone()))?;
        let id = PlayableId::new();
        let bridge = creator.create_bridge(&media, BridgeEvents::new(id, self.events_tx.clone()));
        let playable = Playable::new(id, tag.clone(), media, renderer_type, bridge);
        if !tag.is_none() {
            self.tags.insert(tag, id);
        }
        self.playables.insert(id, playable);
        Ok(id)
    }

    /// Take a Playback down: pause, give back the renderer, detach, remove.
    /// With `release` its Playable also saves its state and releases the
    /// player; untagged Playables are then torn down.
    pub(crate) fn remove_playback(&mut self, id: PlaybackId, release: bool) {
        if !self.playbacks.contains_key(&id) {
            return;
        }
        let bus = self.bus_of_playback(id);
        self.pause_playback(id, true);
        let Some(mut playback) = self.playbacks.shift_remove(&id) else {
            return;
        };
        if playback.is_attached() {
            playback.on_detached();
        }
        playback.on_removed();
        if let Some(bucket) = self.buckets.get_mut(&playback.bucket) {
            bucket.remove_slot(playback.slot);
        }
        if self.slots.get(&playback.slot) == Some(&id) {
            self.slots.remove(&playback.slot);
        }
        self.mark_manager_dirty(playback.manager);

        let Some(playable_id) = playback.playable else {
            return;
        };
        let Some(playable) = self.playables.get_mut(&playable_id) else {
            return;
        };
        if playable.playback == Some(id) {
            playable.playback = None;
        }
        if !release {
            return;
        }
        let tag = playable.tag.clone();
        self.save_info(playable_id);
        if let Some(playable) = self.playables.get_mut(&playable_id) {
            playable.release();
        }
        if let Some(bus) = bus {
            self.publish_playable_changed(
                &bus,
                PlayableChangedEvent {
                    tag: tag.clone(),
                    playable: playable_id,
                    from: Some(id),
                    to: None,
                },
            );
        }
        if tag.is_none() {
            self.tear_down_playable(playable_id);
        }
    }

    pub(crate) fn tear_down_playable(&mut self, id: PlayableId) {
        let from = self.playables.get(&id).and_then(|p| p.playback);
        let bus = from.and_then(|p| self.bus_of_playback(p));
        if let Some(playback) = from {
            self.remove_playback(playback, false);
        }
        let Some(mut playable) = self.playables.shift_remove(&id) else {
            return;
        };
        let tag = playable.tag.clone();
        if !tag.is_none() {
            if playable.stage() == PlayableStage::Bound {
                self.info_store.insert(tag.clone(), playable.playback_info());
            }
            if self.tags.get(&tag) == Some(&id) {
                self.tags.remove(&tag);
            }
        }
        playable.release();
        self.dispatcher.forget(&tag, id);
        for manager in self.managers.values_mut() {
            manager.playables.shift_remove(&id);
        }
        debug!("Playable {} torn down", id);
        if let (Some(bus), Some(from)) = (bus, from) {
            self.publish_playable_changed(
                &bus,
                PlayableChangedEvent {
                    tag,
                    playable: id,
                    from: Some(from),
                    to: None,
                },
            );
        }
    }

    /// Destroy the Playable of `tag`, releasing everything it holds.
    pub fn tear_down(&mut self, tag: &Tag) -> Result<()> {
        let id = *self
            .tags
            .get(tag)
            .ok_or_else(|| Error::UnknownTag(tag.clone()))?;
        self.tear_down_playable(id);
        Ok(())
    }

    /// Drop pending binds of `tag`.
    pub fn cancel_tag(&mut self, tag: &Tag) {
        self.pending_binds.retain(|_, r| &r.tag != tag);
    }

    /// Unbind whatever is bound (or pending) on `slot`.
    pub fn unbind_slot(&mut self, slot: SlotId) {
        self.pending_binds.shift_remove(&slot);
        if let Some(&playback) = self.slots.get(&slot) {
            self.remove_playback(playback, true);
        }
    }

    pub(crate) fn save_info(&mut self, playable: PlayableId) {
        let Some(playable) = self.playables.get(&playable) else {
            return;
        };
        if playable.tag.is_none() || playable.stage() != PlayableStage::Bound {
            return;
        }
        self.info_store
            .insert(playable.tag.clone(), playable.playback_info());
    }

    /// Saved state goes back into the bridge once, then is forgotten.
    pub(crate) fn restore_info(&mut self, playable: PlayableId) {
        let Some(playable) = self.playables.get_mut(&playable) else {
            return;
        };
        if let Some(info) = self.info_store.remove(&playable.tag) {
            playable.restore_info(info);
        }
    }

    fn publish_playable_changed(&self, bus: &EventBus, event: PlayableChangedEvent) {
        if let Some(observers) = self.observers.get(&event.tag) {
            for observer in observers {
                observer(&event);
            }
        }
        bus.emit(event);
    }
}
