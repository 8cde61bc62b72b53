//! Where slotplay keeps its config and log files.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "SLOTPLAY_CONFIG_DIR";

const APP_DIR: &str = "slotplay";

/// Files whose presence in the working directory makes it the config dir.
const LOCAL_MARKERS: [&str; 2] = ["slotplay.json", "slotplay.log"];

#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI arg, then SLOTPLAY_CONFIG_DIR, then None (platform defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from));
        Self { config_dir }
    }
}

/// Path to a configuration file.
///
/// Priority:
/// 1. `--config-dir`
/// 2. `SLOTPLAY_CONFIG_DIR`
/// 3. Current directory if it already holds slotplay files
/// 4. Platform config directory from dirs-next (`~/.config/slotplay` on Linux)
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::config_dir()).join(name)
}

/// Path to a data file (logs). Same priority as [`config_file`] but falls
/// back to the platform data directory.
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::data_dir()).join(name)
}

pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = resolve_dir(config, dirs_next::config_dir());
    let data_dir = resolve_dir(config, dirs_next::data_dir());

    create_dir(&config_dir)?;
    if data_dir != config_dir {
        create_dir(&data_dir)?;
    }
    Ok(())
}

fn create_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    }
    Ok(())
}

fn has_local_files(dir: &Path) -> bool {
    LOCAL_MARKERS.iter().any(|f| dir.join(f).exists())
}

fn resolve_dir(config: &PathConfig, platform: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }
    if let Ok(cwd) = std::env::current_dir() {
        if has_local_files(&cwd) {
            return cwd;
        }
    }
    match platform {
        Some(dir) => dir.join(APP_DIR),
        None => PathBuf::from("."),
    }
}
