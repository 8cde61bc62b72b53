//! Playable creators: the per-renderer-type backend registry.
//!
//! Master keeps one [`PlayableCreator`] per [`RendererType`]. A creator makes
//! bridges for new Playables and hands out renderers for slots. Pools are
//! owned by the creator that made them and never shared across creators.
//!
//! [`PooledCreator`] is the stock implementation: a player pool shared by
//! its bridges plus a renderer pool, both keyed by [`PlayerKey`] (DRM content
//! needs a compatible player and a secure surface).

use log::{debug, error, trace};
use std::cell::RefCell;
use std::rc::Rc;

use crate::config::EngineConfig;
use crate::core::pool::ResourcePool;
use crate::entities::{
    Bridge, BridgeEventKind, BridgeEvents, Media, ObjectId, PlaybackInfo, Player, PlayerKey,
    PlayerState, PoolFactory, RendererType, Renderer, RepeatMode, SlotId, VolumeInfo,
};
use crate::error::Result;

pub type PlayerPool = ResourcePool<PlayerKey, Box<dyn Player>>;
pub type RendererPool = ResourcePool<PlayerKey, Box<dyn Renderer>>;
pub type PlayerFactory = Box<dyn PoolFactory<PlayerKey, Box<dyn Player>>>;
pub type RendererFactory = Box<dyn PoolFactory<PlayerKey, Box<dyn Renderer>>>;

/// Backend registry entry for one renderer type.
pub trait PlayableCreator {
    fn renderer_type(&self) -> &RendererType;

    /// Make the bridge for a new Playable. `events` is the channel the bridge
    /// (or its media engine) reports asynchronous player events on.
    fn create_bridge(&mut self, media: &Media, events: BridgeEvents) -> Box<dyn Bridge>;

    /// Renderer for `slot`, or `None` when none can be had right now.
    fn acquire_renderer(&mut self, slot: SlotId, media: &Media) -> Option<ObjectId>;

    fn release_renderer(&mut self, renderer: ObjectId) -> Result<()>;

    /// Drop idle pooled objects.
    fn clean_up(&mut self);
}

pub struct PooledCreator {
    renderer_type: RendererType,
    players: Rc<RefCell<PlayerPool>>,
    renderers: RendererPool,
}

impl PooledCreator {
    pub fn new(renderer_type: RendererType, players: PlayerPool, renderers: RendererPool) -> Self {
        Self {
            renderer_type,
            players: Rc::new(RefCell::new(players)),
            renderers,
        }
    }

    /// Build both pools with the capacities from `config`.
    pub fn from_factories(
        renderer_type: RendererType,
        config: &EngineConfig,
        players: PlayerFactory,
        renderers: RendererFactory,
    ) -> Result<Self> {
        let player_pool = ResourcePool::new(
            format!("{}/players", renderer_type),
            config.player_pool_capacity,
            players,
        )?;
        let renderer_pool = ResourcePool::new(
            format!("{}/renderers", renderer_type),
            config.renderer_pool_capacity,
            renderers,
        )?;
        Ok(Self::new(renderer_type, player_pool, renderer_pool))
    }

    /// (idle, checked out) players.
    pub fn player_stats(&self) -> (usize, usize) {
        let pool = self.players.borrow();
        (pool.idle_len(), pool.checked_out_len())
    }

    /// (idle, checked out) renderers.
    pub fn renderer_stats(&self) -> (usize, usize) {
        (self.renderers.idle_len(), self.renderers.checked_out_len())
    }
}

impl PlayableCreator for PooledCreator {
    fn renderer_type(&self) -> &RendererType {
        &self.renderer_type
    }

    fn create_bridge(&mut self, media: &Media, events: BridgeEvents) -> Box<dyn Bridge> {
        Box::new(PooledBridge::new(media.clone(), Rc::clone(&self.players), events))
    }

    fn acquire_renderer(&mut self, slot: SlotId, media: &Media) -> Option<ObjectId> {
        let id = self.renderers.acquire(&media.player_key())?;
        if let Some(renderer) = self.renderers.get_mut(id) {
            renderer.place(Some(slot));
        }
        trace!("{}: renderer {} -> {}", self.renderer_type, id, slot);
        Some(id)
    }

    fn release_renderer(&mut self, renderer: ObjectId) -> Result<()> {
        if let Some(r) = self.renderers.get_mut(renderer) {
            r.place(None);
        }
        self.renderers.release(renderer)
    }

    fn clean_up(&mut self) {
        debug!("{}: clean up idle pools", self.renderer_type);
        self.players.borrow_mut().clear();
        self.renderers.clear();
    }
}

/// Bridge over a pooled [`Player`].
///
/// The player is acquired lazily on `prepare` and goes back to the pool on
/// `release` (or when the bridge is dropped). Resume position and volume
/// live in the bridge so they survive a release.
pub struct PooledBridge {
    media: Media,
    players: Rc<RefCell<PlayerPool>>,
    player: Option<ObjectId>,
    renderer: Option<ObjectId>,
    info: PlaybackInfo,
    repeat_mode: RepeatMode,
    source_loaded: bool,
    events: BridgeEvents,
}

impl PooledBridge {
    pub fn new(media: Media, players: Rc<RefCell<PlayerPool>>, events: BridgeEvents) -> Self {
        Self {
            media,
            players,
            player: None,
            renderer: None,
            info: PlaybackInfo::default(),
            repeat_mode: RepeatMode::default(),
            source_loaded: false,
            events,
        }
    }

    fn with_player<R>(&self, f: impl FnOnce(&mut Box<dyn Player>) -> R) -> Option<R> {
        let id = self.player?;
        let mut pool = self.players.borrow_mut();
        pool.get_mut(id).map(f)
    }

    pub fn player(&self) -> Option<ObjectId> {
        self.player
    }
}

impl Bridge for PooledBridge {
    fn prepare(&mut self, load_source: bool) {
        if self.player.is_none() {
            let acquired = self.players.borrow_mut().acquire(&self.media.player_key());
            let Some(id) = acquired else {
                debug!("PooledBridge: no player available for {}", self.media.uri);
                return;
            };
            self.player = Some(id);
            let (volume, repeat, renderer) = (self.info.volume, self.repeat_mode, self.renderer);
            self.with_player(|p| {
                p.set_volume(volume);
                p.set_repeat_mode(repeat);
                p.set_renderer(renderer);
            });
            trace!("PooledBridge: {} got player {}", self.media.uri, id);
        }
        if load_source && !self.source_loaded {
            let resume = self.info.resume_position_ms;
            let loaded = self.with_player(|p| {
                p.prepare(&self.media, true);
                if resume > 0 {
                    p.seek_to(resume);
                }
            });
            self.source_loaded = loaded.is_some();
        }
    }

    fn ready(&mut self) {
        self.prepare(true);
    }

    fn play(&mut self) {
        self.ready();
        if let Some(state) = self.with_player(|p| {
            p.play();
            p.state()
        }) {
            self.events.emit(BridgeEventKind::StateChanged {
                play_when_ready: true,
                state,
            });
        }
    }

    fn pause(&mut self) {
        if let Some(state) = self.with_player(|p| {
            p.pause();
            p.state()
        }) {
            self.events.emit(BridgeEventKind::StateChanged {
                play_when_ready: false,
                state,
            });
        }
    }

    fn reset(&mut self, reset_player: bool) {
        self.info.resume_position_ms = 0;
        self.with_player(|p| {
            p.pause();
            if reset_player {
                p.stop();
            } else {
                p.seek_to(0);
            }
        });
        if reset_player {
            self.source_loaded = false;
        }
    }

    fn release(&mut self) {
        let Some(id) = self.player.take() else {
            return;
        };
        self.source_loaded = false;
        let mut pool = self.players.borrow_mut();
        if let Some(p) = pool.get_mut(id) {
            self.info.resume_position_ms = p.position_ms();
            p.set_renderer(None);
            p.stop();
        }
        let released = pool.release(id);
        if let Err(e) = &released {
            error!("PooledBridge: {}", e);
        }
        debug_assert!(released.is_ok(), "player {} released twice", id);
    }

    fn seek_to(&mut self, position_ms: u64) {
        self.info.resume_position_ms = position_ms;
        self.with_player(|p| p.seek_to(position_ms));
    }

    fn is_playing(&self) -> bool {
        self.with_player(|p| p.is_playing()).unwrap_or(false)
    }

    fn player_state(&self) -> PlayerState {
        self.with_player(|p| p.state()).unwrap_or_default()
    }

    fn volume(&self) -> VolumeInfo {
        self.info.volume
    }

    fn set_volume(&mut self, volume: VolumeInfo) {
        self.info.volume = volume;
        self.with_player(|p| p.set_volume(volume));
    }

    fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
        self.with_player(|p| p.set_repeat_mode(mode));
    }

    fn playback_info(&self) -> PlaybackInfo {
        match self.with_player(|p| p.position_ms()) {
            Some(position) if self.source_loaded => PlaybackInfo {
                resume_position_ms: position,
                volume: self.info.volume,
            },
            _ => self.info,
        }
    }

    fn set_playback_info(&mut self, info: PlaybackInfo) {
        self.info = info;
        let loaded = self.source_loaded;
        self.with_player(|p| {
            p.set_volume(info.volume);
            if loaded {
                p.seek_to(info.resume_position_ms);
            }
        });
    }

    fn set_renderer(&mut self, renderer: Option<ObjectId>) {
        self.renderer = renderer;
        self.with_player(|p| p.set_renderer(renderer));
    }
}

impl Drop for PooledBridge {
    fn drop(&mut self) {
        Bridge::release(self);
    }
}
