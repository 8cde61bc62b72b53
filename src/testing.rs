//! Recording fakes for unit tests.
//!
//! Every fake writes what happens to it into a shared [`CallLog`], so a test
//! can assert on the interleaving of calls across objects (pause before
//! release, renderer before play).

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::core::binder::Rebinder;
use crate::core::bucket::HostKind;
use crate::core::creator::PlayableCreator;
use crate::core::master::Master;
use crate::core::memory::{MemoryMode, MemoryPressure};
use crate::entities::{
    Bridge, BridgeEvents, BucketId, Controller, HostId, HostView, ManagerId, Media, ObjectId,
    PlaybackCallback, PlaybackId, PlaybackInfo, Player, PlayerKey, PlayerState, PoolFactory, Rect,
    Renderer, RendererType, RepeatMode, ScopeKey, SlotId, Tag, VolumeInfo,
};
use crate::error::Result;

pub(crate) type CallLog = Rc<RefCell<Vec<String>>>;

pub(crate) fn calls(log: &CallLog) -> Vec<String> {
    log.borrow().clone()
}

/// Index of the first entry equal to `entry`.
pub(crate) fn position(log: &CallLog, entry: &str) -> Option<usize> {
    log.borrow().iter().position(|c| c == entry)
}

fn record(log: &CallLog, entry: String) {
    log.borrow_mut().push(entry);
}

// === Host ===

#[derive(Default)]
struct HostState {
    viewport: Rect,
    slots: HashMap<SlotId, Rect>,
    detached: HashSet<SlotId>,
}

/// Scriptable host view. Clones share state, so a test keeps one handle
/// and gives another to the engine.
#[derive(Clone, Default)]
pub(crate) struct FakeHost {
    state: Rc<RefCell<HostState>>,
}

impl FakeHost {
    pub(crate) fn new(viewport: Rect) -> Self {
        let host = Self::default();
        host.state.borrow_mut().viewport = viewport;
        host
    }

    /// Slot laid out at `bounds`.
    pub(crate) fn set_slot(&self, slot: SlotId, bounds: Rect) {
        let mut s = self.state.borrow_mut();
        s.slots.insert(slot, bounds);
        s.detached.remove(&slot);
    }

    /// Slot still belongs to the host but is not laid out.
    pub(crate) fn detach_slot(&self, slot: SlotId) {
        self.state.borrow_mut().detached.insert(slot);
    }

    pub(crate) fn remove_slot(&self, slot: SlotId) {
        let mut s = self.state.borrow_mut();
        s.slots.remove(&slot);
        s.detached.remove(&slot);
    }

    pub(crate) fn scroll_to(&self, left: i32, top: i32) {
        let mut s = self.state.borrow_mut();
        let (w, h) = (s.viewport.width(), s.viewport.height());
        s.viewport = Rect::from_size(left, top, w, h);
    }
}

impl HostView for FakeHost {
    fn viewport(&self) -> Rect {
        self.state.borrow().viewport
    }

    fn slot_bounds(&self, slot: SlotId) -> Option<Rect> {
        let s = self.state.borrow();
        if s.detached.contains(&slot) {
            return None;
        }
        s.slots.get(&slot).copied()
    }

    fn contains(&self, slot: SlotId) -> bool {
        self.state.borrow().slots.contains_key(&slot)
    }
}

// === Players and renderers ===

pub(crate) struct FakePlayer {
    name: String,
    log: CallLog,
    state: PlayerState,
    playing: bool,
    position_ms: u64,
    volume: VolumeInfo,
}

impl Player for FakePlayer {
    fn prepare(&mut self, _media: &Media, load_source: bool) {
        record(&self.log, format!("{}:prepare", self.name));
        if load_source {
            self.state = PlayerState::Ready;
        }
    }

    fn play(&mut self) {
        record(&self.log, format!("{}:play", self.name));
        self.playing = true;
    }

    fn pause(&mut self) {
        record(&self.log, format!("{}:pause", self.name));
        self.playing = false;
    }

    fn stop(&mut self) {
        record(&self.log, format!("{}:stop", self.name));
        self.playing = false;
        self.position_ms = 0;
        self.state = PlayerState::Idle;
    }

    fn seek_to(&mut self, position_ms: u64) {
        record(&self.log, format!("{}:seek {}", self.name, position_ms));
        self.position_ms = position_ms;
    }

    fn position_ms(&self) -> u64 {
        self.position_ms
    }

    fn state(&self) -> PlayerState {
        self.state
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn volume(&self) -> VolumeInfo {
        self.volume
    }

    fn set_volume(&mut self, volume: VolumeInfo) {
        self.volume = volume;
    }

    fn set_repeat_mode(&mut self, _mode: RepeatMode) {}

    fn set_renderer(&mut self, _renderer: Option<ObjectId>) {}
}

impl Drop for FakePlayer {
    fn drop(&mut self) {
        record(&self.log, format!("{}:drop", self.name));
    }
}

pub(crate) struct FakePlayerFactory {
    log: CallLog,
    created: u32,
}

impl FakePlayerFactory {
    pub(crate) fn new(log: &CallLog) -> Self {
        Self {
            log: Rc::clone(log),
            created: 0,
        }
    }
}

impl PoolFactory<PlayerKey, Box<dyn Player>> for FakePlayerFactory {
    fn create(&mut self, _key: &PlayerKey) -> Option<Box<dyn Player>> {
        self.created += 1;
        let name = format!("player{}", self.created);
        record(&self.log, format!("create {}", name));
        Some(Box::new(FakePlayer {
            name,
            log: Rc::clone(&self.log),
            state: PlayerState::Idle,
            playing: false,
            position_ms: 0,
            volume: VolumeInfo::default(),
        }))
    }

    fn destroy(&mut self, item: Box<dyn Player>) {
        drop(item);
    }
}

pub(crate) struct FakeRenderer {
    name: String,
    log: CallLog,
}

impl Renderer for FakeRenderer {
    fn place(&mut self, slot: Option<SlotId>) {
        let at = slot.map(|s| s.to_string()).unwrap_or_else(|| "none".into());
        record(&self.log, format!("{}:place {}", self.name, at));
    }
}

pub(crate) struct FakeRendererFactory {
    log: CallLog,
    created: u32,
}

impl FakeRendererFactory {
    pub(crate) fn new(log: &CallLog) -> Self {
        Self {
            log: Rc::clone(log),
            created: 0,
        }
    }
}

impl PoolFactory<PlayerKey, Box<dyn Renderer>> for FakeRendererFactory {
    fn create(&mut self, _key: &PlayerKey) -> Option<Box<dyn Renderer>> {
        self.created += 1;
        let name = format!("renderer{}", self.created);
        record(&self.log, format!("create {}", name));
        Some(Box::new(FakeRenderer {
            name,
            log: Rc::clone(&self.log),
        }))
    }

    fn destroy(&mut self, _item: Box<dyn Renderer>) {}
}

// === Bridge and creator ===

/// Bridge that records `<uri>:<op>` for every engine call.
pub(crate) struct RecordingBridge {
    name: String,
    log: CallLog,
    playing: bool,
    info: PlaybackInfo,
}

impl RecordingBridge {
    pub(crate) fn new(media: &Media, log: &CallLog) -> Self {
        Self {
            name: media.uri.clone(),
            log: Rc::clone(log),
            playing: false,
            info: PlaybackInfo::default(),
        }
    }

    fn record(&self, op: &str) {
        record(&self.log, format!("{}:{}", self.name, op));
    }
}

impl Bridge for RecordingBridge {
    fn prepare(&mut self, _load_source: bool) {
        self.record("prepare");
    }

    fn ready(&mut self) {}

    fn play(&mut self) {
        self.record("play");
        self.playing = true;
    }

    fn pause(&mut self) {
        self.record("pause");
        self.playing = false;
    }

    fn reset(&mut self, _reset_player: bool) {
        self.record("reset");
        self.playing = false;
        self.info.resume_position_ms = 0;
    }

    fn release(&mut self) {
        self.record("release");
        self.playing = false;
    }

    fn seek_to(&mut self, position_ms: u64) {
        self.record(&format!("seek {}", position_ms));
        self.info.resume_position_ms = position_ms;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn player_state(&self) -> PlayerState {
        if self.playing { PlayerState::Ready } else { PlayerState::Idle }
    }

    fn volume(&self) -> VolumeInfo {
        self.info.volume
    }

    fn set_volume(&mut self, volume: VolumeInfo) {
        self.info.volume = volume;
    }

    fn set_repeat_mode(&mut self, _mode: RepeatMode) {}

    fn playback_info(&self) -> PlaybackInfo {
        self.info
    }

    fn set_playback_info(&mut self, info: PlaybackInfo) {
        self.info = info;
    }

    fn set_renderer(&mut self, _renderer: Option<ObjectId>) {}
}

/// Creator handing out [`RecordingBridge`]s. Renderer acquisition can be
/// switched off to simulate an exhausted pool.
pub(crate) struct RecordingCreator {
    renderer_type: RendererType,
    log: CallLog,
    pub(crate) renderers_available: Rc<Cell<bool>>,
    /// Event handles of every bridge created, for injecting player events
    pub(crate) events: Rc<RefCell<Vec<BridgeEvents>>>,
    next_renderer: u64,
    out: HashSet<ObjectId>,
}

impl RecordingCreator {
    pub(crate) fn new(renderer_type: &str, log: &CallLog) -> Self {
        Self {
            renderer_type: RendererType::from(renderer_type),
            log: Rc::clone(log),
            renderers_available: Rc::new(Cell::new(true)),
            events: Rc::default(),
            next_renderer: 1,
            out: HashSet::new(),
        }
    }
}

impl PlayableCreator for RecordingCreator {
    fn renderer_type(&self) -> &RendererType {
        &self.renderer_type
    }

    fn create_bridge(&mut self, media: &Media, events: BridgeEvents) -> Box<dyn Bridge> {
        self.events.borrow_mut().push(events);
        Box::new(RecordingBridge::new(media, &self.log))
    }

    fn acquire_renderer(&mut self, slot: SlotId, _media: &Media) -> Option<ObjectId> {
        if !self.renderers_available.get() {
            return None;
        }
        let id = ObjectId(self.next_renderer);
        self.next_renderer += 1;
        self.out.insert(id);
        record(&self.log, format!("renderer+ {}", slot));
        Some(id)
    }

    fn release_renderer(&mut self, renderer: ObjectId) -> Result<()> {
        if !self.out.remove(&renderer) {
            return Err(crate::error::Error::NotCheckedOut(renderer));
        }
        record(&self.log, format!("renderer- {}", renderer));
        Ok(())
    }

    fn clean_up(&mut self) {
        record(&self.log, "clean up".into());
    }
}

// === Client hooks ===

pub(crate) struct FakeController {
    can_start: bool,
    can_pause: bool,
}

impl FakeController {
    pub(crate) fn new(can_start: bool, can_pause: bool) -> Self {
        Self { can_start, can_pause }
    }
}

impl Controller for FakeController {
    fn can_start(&self) -> bool {
        self.can_start
    }

    fn can_pause(&self) -> bool {
        self.can_pause
    }
}

pub(crate) struct RecordingCallback {
    log: CallLog,
}

impl RecordingCallback {
    pub(crate) fn new(log: &CallLog) -> Self {
        Self { log: Rc::clone(log) }
    }
}

impl PlaybackCallback for RecordingCallback {
    fn on_added(&self, _playback: PlaybackId) {
        record(&self.log, "added".into());
    }

    fn on_removed(&self, _playback: PlaybackId) {
        record(&self.log, "removed".into());
    }

    fn on_attached(&self, _playback: PlaybackId) {
        record(&self.log, "attached".into());
    }

    fn on_detached(&self, _playback: PlaybackId) {
        record(&self.log, "detached".into());
    }

    fn on_active(&self, _playback: PlaybackId) {
        record(&self.log, "active".into());
    }

    fn on_inactive(&self, _playback: PlaybackId) {
        record(&self.log, "inactive".into());
    }
}

// === Engine harness ===

/// Memory probe reporting a fixed used fraction.
pub(crate) struct FixedMemory(pub f64);

impl MemoryPressure for FixedMemory {
    fn used_fraction(&mut self) -> f64 {
        self.0
    }
}

/// A started scope "feed" in context "activity" with one vertical list host
/// (`HostId(1)`, 100x100 viewport) and a recording "video" creator.
pub(crate) struct Harness {
    pub(crate) master: Master,
    pub(crate) host: FakeHost,
    pub(crate) log: CallLog,
    pub(crate) manager: ManagerId,
    pub(crate) bucket: BucketId,
    pub(crate) renderers: Rc<Cell<bool>>,
    pub(crate) events: Rc<RefCell<Vec<BridgeEvents>>>,
    pub(crate) t0: Instant,
}

impl Harness {
    pub(crate) fn new(mode: MemoryMode) -> Self {
        Self::with_config(mode, EngineConfig::default(), 0.1)
    }

    pub(crate) fn with_config(mode: MemoryMode, config: EngineConfig, memory_used: f64) -> Self {
        let log = CallLog::default();
        let mut master = Master::with_memory_probe(config, Box::new(FixedMemory(memory_used)))
            .expect("valid config");
        let creator = RecordingCreator::new("video", &log);
        let renderers = Rc::clone(&creator.renderers_available);
        let events = Rc::clone(&creator.events);
        master.register_creator(Box::new(creator));

        let manager = master.register("activity", "feed", mode);
        master.on_scope_started(&ScopeKey::from("feed"));
        let host = FakeHost::new(Rect::from_size(0, 0, 100, 100));
        let bucket = master
            .add_bucket(manager, HostId(1), HostKind::list(), Box::new(host.clone()))
            .expect("fresh host");
        Self {
            master,
            host,
            log,
            manager,
            bucket,
            renderers,
            events,
            t0: Instant::now(),
        }
    }

    /// Lay out a 100x100 slot so that `ratio` of it is inside the viewport.
    pub(crate) fn place(&self, slot: u64, ratio: f32) {
        let top = 100 - (ratio * 100.0).round() as i32;
        self.host
            .set_slot(SlotId(slot), Rect::from_size(0, top, 100, 100));
    }

    /// Bind `<tag>.mp4` under `tag`.
    pub(crate) fn bind(&mut self, slot: u64, tag: &str) -> Option<Rebinder> {
        self.bind_media(slot, tag, &format!("{}.mp4", tag))
    }

    pub(crate) fn bind_media(&mut self, slot: u64, tag: &str, uri: &str) -> Option<Rebinder> {
        self.master
            .set_up(Media::new(uri))
            .with_tag(tag)
            .bind(&mut self.master, SlotId(slot))
            .expect("bind")
    }

    pub(crate) fn tick(&mut self) {
        self.master.tick(self.t0);
    }

    pub(crate) fn tick_at(&mut self, ms: u64) {
        self.master.tick(self.t0 + Duration::from_millis(ms));
    }

    /// Host scrolled: re-layout and tick.
    pub(crate) fn relayout(&mut self) {
        self.master.on_host_changed(HostId(1));
        self.tick();
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        calls(&self.log)
    }

    pub(crate) fn clear(&self) {
        self.log.borrow_mut().clear();
    }

    pub(crate) fn is_playing(&self, tag: &str) -> bool {
        self.master
            .playable(&Tag::from(tag))
            .is_some_and(|p| p.is_playing())
    }

    pub(crate) fn is_active(&self, slot: u64) -> bool {
        self.master
            .playback_at(SlotId(slot))
            .is_some_and(|p| p.is_active())
    }
}
