use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::core::memory::MemoryMode;

const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"),
    "\n",
    "Target: ",
    std::env::consts::ARCH,
    "-",
    std::env::consts::OS
);

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Auto,
    Low,
    Normal,
    Balanced,
    High,
    Infinite,
}

impl From<ModeArg> for MemoryMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Auto => MemoryMode::Auto,
            ModeArg::Low => MemoryMode::Low,
            ModeArg::Normal => MemoryMode::Normal,
            ModeArg::Balanced => MemoryMode::Balanced,
            ModeArg::High => MemoryMode::High,
            ModeArg::Infinite => MemoryMode::Infinite,
        }
    }
}

/// Scrolling feed simulator for the slotplay playback engine
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Number of media items in the simulated feed
    #[arg(short = 'n', long = "items", value_name = "N", default_value_t = 12)]
    pub items: usize,

    /// Memory mode of the feed's manager
    #[arg(short = 'm', long = "mode", value_enum, default_value = "balanced")]
    pub mode: ModeArg,

    /// Scroll steps to simulate
    #[arg(short = 's', long = "steps", value_name = "N", default_value_t = 40)]
    pub steps: usize,

    /// Pixels scrolled per step
    #[arg(long = "stride", value_name = "PX", default_value_t = 35)]
    pub stride: i32,

    /// Use a horizontal pager host instead of a vertical list
    #[arg(long = "pager")]
    pub pager: bool,

    /// Enable debug logging to file (default: slotplay.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["slotplay"]);
        assert_eq!(args.items, 12);
        assert_eq!(args.mode, ModeArg::Balanced);
        assert!(args.log_file.is_none());
        assert!(!args.pager);
    }

    #[test]
    fn test_flags() {
        let args = Args::parse_from(["slotplay", "-n", "3", "--mode", "low", "-vv", "--log"]);
        assert_eq!(args.items, 3);
        assert_eq!(MemoryMode::from(args.mode), MemoryMode::Low);
        assert_eq!(args.verbosity, 2);
        assert_eq!(args.log_file, Some(None));
    }
}
