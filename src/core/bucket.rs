//! Bucket - candidate slots of one scrollable host.
//!
//! The bucket keeps its slots in host traversal order (the order the host
//! reported them), which is the tie-break order for selection. Visibility
//! comes from the host view on demand:
//!
//! ```text
//! ratio = area(bounds ∩ viewport) / area(bounds)
//! ```

use enum_dispatch::enum_dispatch;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::core::playback::Token;
use crate::entities::{BucketId, HostId, HostView, ManagerId, Rect, SlotId, VolumeInfo};

/// How many of one host's slots may play at the same time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayStrategy {
    /// Nothing in this host is ever selected
    None,
    /// At most one slot
    Single,
    /// Bounded by the memory mode only
    #[default]
    Multi,
}

impl PlayStrategy {
    /// Per-host selection bound, `None` = unbounded.
    pub fn limit(self) -> Option<usize> {
        match self {
            PlayStrategy::None => Some(0),
            PlayStrategy::Single => Some(1),
            PlayStrategy::Multi => None,
        }
    }
}

/// Behaviour that differs between kinds of scrollable hosts.
#[enum_dispatch]
pub trait HostLayout {
    /// Type identifier for logs ("list", "pager", ...)
    fn kind_name(&self) -> &'static str;

    fn strategy(&self) -> PlayStrategy;

    fn set_strategy(&mut self, strategy: PlayStrategy);
}

/// Recycling list or grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListLayout {
    pub strategy: PlayStrategy,
}

impl HostLayout for ListLayout {
    fn kind_name(&self) -> &'static str {
        "list"
    }

    fn strategy(&self) -> PlayStrategy {
        self.strategy
    }

    fn set_strategy(&mut self, strategy: PlayStrategy) {
        self.strategy = strategy;
    }
}

/// Paged container: by default only the settled page plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagerLayout {
    pub strategy: PlayStrategy,
}

impl Default for PagerLayout {
    fn default() -> Self {
        Self {
            strategy: PlayStrategy::Single,
        }
    }
}

impl HostLayout for PagerLayout {
    fn kind_name(&self) -> &'static str {
        "pager"
    }

    fn strategy(&self) -> PlayStrategy {
        self.strategy
    }

    fn set_strategy(&mut self, strategy: PlayStrategy) {
        self.strategy = strategy;
    }
}

/// Plain scroll region with a fixed set of children.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollLayout {
    pub strategy: PlayStrategy,
}

impl HostLayout for ScrollLayout {
    fn kind_name(&self) -> &'static str {
        "scroll"
    }

    fn strategy(&self) -> PlayStrategy {
        self.strategy
    }

    fn set_strategy(&mut self, strategy: PlayStrategy) {
        self.strategy = strategy;
    }
}

/// Static container, no scrolling of its own.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlainLayout {
    pub strategy: PlayStrategy,
}

impl HostLayout for PlainLayout {
    fn kind_name(&self) -> &'static str {
        "plain"
    }

    fn strategy(&self) -> PlayStrategy {
        self.strategy
    }

    fn set_strategy(&mut self, strategy: PlayStrategy) {
        self.strategy = strategy;
    }
}

#[enum_dispatch(HostLayout)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostKind {
    List(ListLayout),
    Pager(PagerLayout),
    Scroll(ScrollLayout),
    Plain(PlainLayout),
}

impl HostKind {
    pub fn list() -> Self {
        HostKind::List(ListLayout::default())
    }

    pub fn pager() -> Self {
        HostKind::Pager(PagerLayout::default())
    }

    pub fn scroll() -> Self {
        HostKind::Scroll(ScrollLayout::default())
    }

    pub fn plain() -> Self {
        HostKind::Plain(PlainLayout::default())
    }

    /// Same kind of host, playing by `strategy`.
    pub fn with_strategy(mut self, strategy: PlayStrategy) -> Self {
        self.set_strategy(strategy);
        self
    }
}

pub struct Bucket {
    pub id: BucketId,
    pub host: HostId,
    pub manager: ManagerId,
    pub kind: HostKind,
    view: Box<dyn HostView>,
    slots: IndexSet<SlotId>,
    pub(crate) volume: VolumeInfo,
    pub(crate) locked: bool,
}

impl Bucket {
    pub(crate) fn new(
        host: HostId,
        manager: ManagerId,
        kind: HostKind,
        view: Box<dyn HostView>,
        volume: VolumeInfo,
    ) -> Self {
        Self {
            id: BucketId::new(),
            host,
            manager,
            kind,
            view,
            slots: IndexSet::new(),
            volume,
            locked: false,
        }
    }

    /// Whether the host currently contains `slot`.
    pub fn accepts(&self, slot: SlotId) -> bool {
        self.view.contains(slot)
    }

    pub(crate) fn add_slot(&mut self, slot: SlotId) -> bool {
        self.slots.insert(slot)
    }

    pub(crate) fn remove_slot(&mut self, slot: SlotId) -> bool {
        self.slots.shift_remove(&slot)
    }

    pub fn contains_slot(&self, slot: SlotId) -> bool {
        self.slots.contains(&slot)
    }

    /// Tracked slots in traversal order.
    pub fn slots(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.slots.iter().copied()
    }

    pub fn viewport(&self) -> Rect {
        self.view.viewport()
    }

    /// Visibility of a slot, `None` when the host has not laid it out.
    pub fn token(&self, slot: SlotId) -> Option<Token> {
        let bounds = self.view.slot_bounds(slot)?;
        Some(Token {
            ratio: visible_ratio(&bounds, &self.view.viewport()),
            bounds,
        })
    }

    /// Normalized center distance of `bounds` to the viewport center,
    /// summed over both axes.
    pub fn distance(&self, bounds: &Rect) -> f32 {
        center_distance(bounds, &self.view.viewport())
    }
}

impl std::fmt::Debug for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("kind", &self.kind.kind_name())
            .field("slots", &self.slots.len())
            .finish()
    }
}

/// Visible fraction of `bounds` inside `viewport`.
pub fn visible_ratio(bounds: &Rect, viewport: &Rect) -> f32 {
    let area = bounds.area();
    if area == 0 {
        return 0.0;
    }
    bounds
        .intersect(viewport)
        .map(|visible| (visible.area() as f64 / area as f64) as f32)
        .unwrap_or(0.0)
}

/// |dx| / width + |dy| / height between the two centers. Degenerate
/// viewports contribute nothing on that axis.
pub fn center_distance(bounds: &Rect, viewport: &Rect) -> f32 {
    let axis = |d: f32, extent: i32| {
        if extent > 0 { d.abs() / extent as f32 } else { 0.0 }
    };
    axis(bounds.center_x() - viewport.center_x(), viewport.width())
        + axis(bounds.center_y() - viewport.center_y(), viewport.height())
}
