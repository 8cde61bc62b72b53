//! SLOTPLAY - playback coordination for scrolling media feeds
//!
//! Re-exports all modules for use by binary targets.

// Core engine (pools, playbacks, selection, master)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod entities;
pub mod error;
pub mod paths;
pub mod sim;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types from core
pub use crate::core::event_bus::{BoxedEvent, EventBus, downcast_event};
pub use crate::core::master::{Master, Scope};
pub use crate::core::memory::MemoryMode;
pub use error::{Error, Result};

// Re-export entities
pub use entities::{HostId, Media, SlotId, Tag};
