//! Core engine modules - pools, playback state, selection, coordination
//!
//! These modules form the playback engine, independent of any host UI.

pub mod binder;
pub mod bucket;
pub mod creator;
pub mod debounce;
pub mod dispatcher;
pub mod event_bus;
pub mod events;
pub mod group;
pub mod manager;
pub mod master;
pub mod memory;
pub mod playable;
pub mod playback;
pub mod pool;
mod refresh;

// Re-exports for convenience
pub use binder::{Binder, Rebinder};
pub use bucket::{HostKind, HostLayout, ListLayout, PagerLayout, PlainLayout, PlayStrategy, ScrollLayout};
pub use creator::{PlayableCreator, PooledBridge, PooledCreator};
pub use dispatcher::Dispatcher;
pub use event_bus::EventBus;
pub use group::{Candidate, Group, select};
pub use manager::Manager;
pub use master::{Master, Scope};
pub use memory::{MemoryGauge, MemoryMode, MemoryPolicy, MemoryPressure, SystemMemory, TrimLevel};
pub use playable::{Intent, Playable, PlayableStage};
pub use playback::{BindConfig, Playback, PlaybackState, Token};
pub use pool::ResourcePool;
