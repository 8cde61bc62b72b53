//! In-process feed simulation used by the `slotplay` binary.
//!
//! A fake scrolling host lays out one slot per media item; players and
//! renderers only log what the engine asks of them. Scrolling the host and
//! ticking the Master shows selection, pooling and release at work without
//! any media backend.

use log::{debug, info, trace};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::core::bucket::HostKind;
use crate::core::creator::PooledCreator;
use crate::core::events::SelectionChangedEvent;
use crate::core::master::Master;
use crate::core::memory::MemoryMode;
use crate::entities::{
    HostId, HostView, ManagerId, Media, ObjectId, Player, PlayerKey, PlayerState, PoolFactory,
    Rect, Renderer, RendererType, RepeatMode, ScopeKey, SlotId, Tag, VolumeInfo,
};
use crate::error::Result;

/// Slot edge length in host pixels.
const ITEM_SIZE: i32 = 100;
/// Simulated time between steps.
const STEP: Duration = Duration::from_millis(16);

const SCOPE: &str = "feed";
const HOST: HostId = HostId(1);

// === Logging backend ===

struct LogPlayer {
    name: String,
    state: PlayerState,
    playing: bool,
    position_ms: u64,
}

impl Player for LogPlayer {
    fn prepare(&mut self, media: &Media, load_source: bool) {
        if load_source {
            debug!("{}: load {}", self.name, media.uri);
            self.state = PlayerState::Ready;
        }
    }

    fn play(&mut self) {
        info!("{}: play", self.name);
        self.playing = true;
    }

    fn pause(&mut self) {
        if self.playing {
            info!("{}: pause at {} ms", self.name, self.position_ms);
        }
        self.playing = false;
    }

    fn stop(&mut self) {
        self.playing = false;
        self.position_ms = 0;
        self.state = PlayerState::Idle;
    }

    fn seek_to(&mut self, position_ms: u64) {
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
        VolumeInfo::default()
    }

    fn set_volume(&mut self, _volume: VolumeInfo) {}

    fn set_repeat_mode(&mut self, _mode: RepeatMode) {}

    fn set_renderer(&mut self, renderer: Option<ObjectId>) {
        trace!("{}: output -> {:?}", self.name, renderer);
    }
}

/// Player factory counting what it created.
struct LogPlayerFactory {
    created: Rc<Cell<usize>>,
}

impl PoolFactory<PlayerKey, Box<dyn Player>> for LogPlayerFactory {
    fn create(&mut self, key: &PlayerKey) -> Option<Box<dyn Player>> {
        self.created.set(self.created.get() + 1);
        let name = format!("player{}", self.created.get());
        debug!("{} created for {:?}", name, key);
        Some(Box::new(LogPlayer {
            name,
            state: PlayerState::Idle,
            playing: false,
            position_ms: 0,
        }))
    }

    fn destroy(&mut self, _item: Box<dyn Player>) {
        debug!("player destroyed");
    }
}

struct LogRenderer(usize);

impl Renderer for LogRenderer {
    fn place(&mut self, slot: Option<SlotId>) {
        trace!("renderer{} -> {:?}", self.0, slot);
    }
}

struct LogRendererFactory {
    created: usize,
}

impl PoolFactory<PlayerKey, Box<dyn Renderer>> for LogRendererFactory {
    fn create(&mut self, _key: &PlayerKey) -> Option<Box<dyn Renderer>> {
        self.created += 1;
        Some(Box::new(LogRenderer(self.created)))
    }

    fn destroy(&mut self, _item: Box<dyn Renderer>) {}
}

// === Host ===

struct Layout {
    viewport: Rect,
    horizontal: bool,
    offset: i32,
    slots: Vec<SlotId>,
}

impl Layout {
    fn content_len(&self) -> i32 {
        self.slots.len() as i32 * ITEM_SIZE
    }

    fn viewport_len(&self) -> i32 {
        if self.horizontal {
            self.viewport.width()
        } else {
            self.viewport.height()
        }
    }
}

/// Scrolling host: slots laid out back to back along one axis.
struct FeedHost {
    layout: Rc<RefCell<Layout>>,
}

impl HostView for FeedHost {
    fn viewport(&self) -> Rect {
        self.layout.borrow().viewport
    }

    fn slot_bounds(&self, slot: SlotId) -> Option<Rect> {
        let layout = self.layout.borrow();
        let index = layout.slots.iter().position(|&s| s == slot)? as i32;
        let start = index * ITEM_SIZE - layout.offset;
        Some(if layout.horizontal {
            Rect::from_size(start, 0, ITEM_SIZE, ITEM_SIZE)
        } else {
            Rect::from_size(0, start, ITEM_SIZE, ITEM_SIZE)
        })
    }

    fn contains(&self, slot: SlotId) -> bool {
        self.layout.borrow().slots.contains(&slot)
    }
}

// === Feed ===

/// One simulated step: scroll offset and the tags playing afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct StepReport {
    pub step: usize,
    pub offset: i32,
    pub playing: Vec<Tag>,
}

pub struct Feed {
    master: Master,
    manager: ManagerId,
    layout: Rc<RefCell<Layout>>,
    players_created: Rc<Cell<usize>>,
    selections: Arc<AtomicUsize>,
    clock: Instant,
}

impl Feed {
    /// Build a feed of `items` clips in a vertical list (or a horizontal
    /// pager) and bind every slot.
    pub fn new(config: EngineConfig, mode: MemoryMode, items: usize, pager: bool) -> Result<Self> {
        let players_created = Rc::new(Cell::new(0));
        let creator = PooledCreator::from_factories(
            RendererType::from("video"),
            &config,
            Box::new(LogPlayerFactory {
                created: Rc::clone(&players_created),
            }),
            Box::new(LogRendererFactory { created: 0 }),
        )?;

        let mut master = Master::new(config)?;
        master.register_creator(Box::new(creator));
        let manager = master.register("feed-screen", SCOPE, mode);
        master.on_scope_started(&ScopeKey::from(SCOPE));

        let (viewport, kind) = if pager {
            (Rect::from_size(0, 0, ITEM_SIZE, ITEM_SIZE), HostKind::pager())
        } else {
            // Two and a half items visible
            (Rect::from_size(0, 0, ITEM_SIZE, ITEM_SIZE * 5 / 2), HostKind::list())
        };
        let slots = (0..items as u64).map(|i| SlotId(i + 1)).collect();
        let layout = Rc::new(RefCell::new(Layout {
            viewport,
            horizontal: pager,
            offset: 0,
            slots,
        }));
        master.add_bucket(
            manager,
            HOST,
            kind,
            Box::new(FeedHost {
                layout: Rc::clone(&layout),
            }),
        )?;

        let selections = Arc::new(AtomicUsize::new(0));
        if let Some(group) = master.group_of(manager) {
            let counter = Arc::clone(&selections);
            group.bus().subscribe(move |seq, e: &SelectionChangedEvent| {
                counter.fetch_add(1, Ordering::Relaxed);
                debug!("#{} selection +{:?} -{:?}", seq, e.added, e.removed);
            });
        }

        let slots: Vec<SlotId> = layout.borrow().slots.clone();
        for (i, slot) in slots.into_iter().enumerate() {
            master
                .set_up(Media::new(format!("https://cdn.example/clip{}.mp4", i)))
                .with_tag(format!("clip{}", i))
                .bind(&mut master, slot)?;
        }
        info!("Feed ready: {} items, mode={:?}", items, mode);

        Ok(Self {
            master,
            manager,
            layout,
            players_created,
            selections,
            clock: Instant::now(),
        })
    }

    pub fn master(&self) -> &Master {
        &self.master
    }

    /// Scroll by `stride` pixels (clamped to the content) and tick once.
    pub fn step(&mut self, step: usize, stride: i32) -> StepReport {
        let offset = {
            let mut layout = self.layout.borrow_mut();
            let max = (layout.content_len() - layout.viewport_len()).max(0);
            layout.offset = (layout.offset + stride).clamp(0, max);
            layout.offset
        };
        self.master.on_host_changed(HOST);
        self.clock += STEP;
        self.master.tick(self.clock);
        StepReport {
            step,
            offset,
            playing: self.playing(),
        }
    }

    /// Tags currently playing, in selection order.
    pub fn playing(&self) -> Vec<Tag> {
        let Some(group) = self.master.group_of(self.manager) else {
            return Vec::new();
        };
        group
            .selection()
            .iter()
            .filter_map(|&id| self.master.playback(id))
            .filter_map(|p| self.master.playable_at(p.slot))
            .filter(|p| p.is_playing())
            .map(|p| p.tag.clone())
            .collect()
    }

    pub fn players_created(&self) -> usize {
        self.players_created.get()
    }

    pub fn selection_events(&self) -> usize {
        self.selections.load(Ordering::Relaxed)
    }

    /// Tear the scope down, returning every player to its pool.
    pub fn close(mut self) {
        self.master.on_scope_destroyed(&ScopeKey::from(SCOPE));
    }
}
