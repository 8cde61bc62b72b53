//! Engine configuration.
//!
//! All policy constants (visibility threshold, pool sizes, memory-mode caps)
//! live here so hosts can tune them without touching engine code. Stored as
//! JSON next to the other application files (see [`crate::paths`]).

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::core::memory::MemoryPolicy;
use crate::error::Error;

/// Name of the config file inside the config directory.
pub const CONFIG_FILE: &str = "slotplay.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default visible-area ratio a slot needs to be eligible (0..=1)
    pub threshold: f32,
    /// Default delay before a system-selected Playable starts, in ms
    pub start_delay_ms: u64,
    /// Idle players kept per creator
    pub player_pool_capacity: usize,
    /// Idle renderers kept per creator
    pub renderer_pool_capacity: usize,
    /// Events kept on each Group's bus before the oldest are evicted
    pub event_queue_bound: usize,
    pub memory: MemoryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold: 0.65,
            start_delay_ms: 0,
            player_pool_capacity: num_cpus::get().max(2),
            renderer_pool_capacity: 2,
            event_queue_bound: crate::core::event_bus::DEFAULT_QUEUE_BOUND,
            memory: MemoryPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    /// Check ranges. Zero capacities are rejected here as well as by the
    /// pools themselves so a bad file fails at load time.
    pub fn validate(&self) -> crate::Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::InvalidConfig(format!(
                "threshold {} outside 0..=1",
                self.threshold
            )));
        }
        if self.player_pool_capacity == 0 {
            return Err(Error::InvalidPoolCapacity(0));
        }
        if self.renderer_pool_capacity == 0 {
            return Err(Error::InvalidPoolCapacity(0));
        }
        let m = &self.memory;
        if m.low_cap == 0 || m.normal_cap == 0 || m.balanced_cap == 0 {
            return Err(Error::InvalidConfig("memory caps must be positive".into()));
        }
        if !(0.0..=1.0).contains(&m.critical_fraction) {
            return Err(Error::InvalidConfig(format!(
                "critical_fraction {} outside 0..=1",
                m.critical_fraction
            )));
        }
        Ok(())
    }

    /// Load from a JSON file. Missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load if the file exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.threshold, 0.65);
        assert!(config.player_pool_capacity >= 2);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "threshold": 0.5, "memory": { "balanced_cap": 4 } }"#)
                .unwrap();
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.memory.balanced_cap, 4);
        assert_eq!(config.memory.low_cap, 1);
        assert_eq!(config.renderer_pool_capacity, 2);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = EngineConfig {
            threshold: 1.5,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = EngineConfig {
            player_pool_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidPoolCapacity(0))));
    }

    #[test]
    fn test_save_load_file() {
        let dir = std::env::temp_dir().join(format!("slotplay-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE);

        let config = EngineConfig {
            start_delay_ms: 250,
            ..EngineConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_file_defaults() {
        let path = std::env::temp_dir().join("slotplay-does-not-exist.json");
        assert_eq!(
            EngineConfig::load_or_default(&path).unwrap(),
            EngineConfig::default()
        );
    }
}
