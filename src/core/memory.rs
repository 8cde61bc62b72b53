//! Memory modes and the pressure probe behind `MemoryMode::Auto`.
//!
//! A memory mode answers two questions for the engine:
//! - how many Playbacks a Group may select at once (`cap`)
//! - how far (in priority steps) from the selection a Playable may drift
//!   before its player is released back to the pool (`release_distance`)

use log::{debug, info};
use serde::{Deserialize, Serialize};
use sysinfo::System;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryMode {
    /// Resolved from current memory pressure on every refresh
    Auto,
    /// One active Playback, release everything else
    #[default]
    Low,
    Normal,
    /// Like Normal, but near neighbours keep their state (no reset)
    Balanced,
    High,
    /// Never release on distance
    Infinite,
}

/// Pressure level pushed by the host (trim-memory style callbacks).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrimLevel {
    Moderate,
    Low,
    Critical,
}

/// Per-mode policy constants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryPolicy {
    pub low_cap: usize,
    pub normal_cap: usize,
    pub balanced_cap: usize,
    pub low_release: u32,
    pub normal_release: u32,
    pub balanced_release: u32,
    pub high_release: u32,
    /// Used/total memory fraction at which Auto resolves to Low
    pub critical_fraction: f64,
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self {
            low_cap: 1,
            normal_cap: 2,
            balanced_cap: 3,
            low_release: 1,
            normal_release: 2,
            balanced_release: 2,
            high_release: 8,
            critical_fraction: 0.9,
        }
    }
}

impl MemoryPolicy {
    /// Maximum number of simultaneously selected Playbacks. `Auto` must be
    /// resolved first; unresolved it is treated as `Low`.
    pub fn cap(&self, mode: MemoryMode) -> usize {
        match mode {
            MemoryMode::Auto | MemoryMode::Low => self.low_cap,
            MemoryMode::Normal => self.normal_cap,
            MemoryMode::Balanced => self.balanced_cap,
            MemoryMode::High | MemoryMode::Infinite => usize::MAX,
        }
    }

    /// Priority at or beyond which a Playable gets released.
    pub fn release_distance(&self, mode: MemoryMode) -> u32 {
        match mode {
            MemoryMode::Auto | MemoryMode::Low => self.low_release,
            MemoryMode::Normal => self.normal_release,
            MemoryMode::Balanced => self.balanced_release,
            MemoryMode::High => self.high_release,
            MemoryMode::Infinite => u32::MAX - 1,
        }
    }
}

/// Source of memory pressure readings.
pub trait MemoryPressure {
    /// Used fraction of physical memory, 0.0..=1.0.
    fn used_fraction(&mut self) -> f64;
}

/// `sysinfo` backed probe.
pub struct SystemMemory {
    sys: System,
}

impl SystemMemory {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        info!(
            "SystemMemory init: total={} MB, available={} MB",
            sys.total_memory() / 1024 / 1024,
            sys.available_memory() / 1024 / 1024
        );
        Self { sys }
    }
}

impl Default for SystemMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPressure for SystemMemory {
    fn used_fraction(&mut self) -> f64 {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        if total == 0 {
            0.0
        } else {
            self.sys.used_memory() as f64 / total as f64
        }
    }
}

/// Resolves `MemoryMode::Auto` from the probe and the last host trim level.
pub struct MemoryGauge {
    probe: Box<dyn MemoryPressure>,
    trim: Option<TrimLevel>,
    critical_fraction: f64,
}

impl MemoryGauge {
    pub fn new(probe: Box<dyn MemoryPressure>, critical_fraction: f64) -> Self {
        Self {
            probe,
            trim: None,
            critical_fraction,
        }
    }

    pub fn set_trim_level(&mut self, level: Option<TrimLevel>) {
        debug!("MemoryGauge: trim level {:?} -> {:?}", self.trim, level);
        self.trim = level;
    }

    pub fn trim_level(&self) -> Option<TrimLevel> {
        self.trim
    }

    /// Concrete mode for `mode`: anything but `Auto` passes through.
    pub fn resolve(&mut self, mode: MemoryMode) -> MemoryMode {
        if mode != MemoryMode::Auto {
            return mode;
        }
        if self.trim == Some(TrimLevel::Critical) {
            return MemoryMode::Low;
        }
        let used = self.probe.used_fraction();
        if used >= self.critical_fraction {
            debug!("MemoryGauge: {:.0}% used, Auto -> Low", used * 100.0);
            MemoryMode::Low
        } else {
            MemoryMode::Balanced
        }
    }
}

impl std::fmt::Debug for MemoryGauge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryGauge")
            .field("trim", &self.trim)
            .field("critical_fraction", &self.critical_fraction)
            .finish()
    }
}
