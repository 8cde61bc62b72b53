use slotplay::cli::Args;
use slotplay::config::{CONFIG_FILE, EngineConfig};
use slotplay::core::memory::MemoryMode;
use slotplay::paths::{self, PathConfig};
use slotplay::sim::Feed;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};

fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| paths::data_file("slotplay.log", path_config));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging, RUST_LOG wins when set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = paths::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }

    init_logging(&args, &path_config)?;
    info!("slotplay {} starting...", env!("CARGO_PKG_VERSION"));
    debug!("Command-line args: {:?}", args);

    let config_path = paths::config_file(CONFIG_FILE, &path_config);
    info!("Config path: {}", config_path.display());
    let config = EngineConfig::load_or_default(&config_path)?;

    let mode = MemoryMode::from(args.mode);
    let mut feed = Feed::new(config, mode, args.items, args.pager)
        .context("Failed to set up the simulated feed")?;

    let mut last: Option<Vec<slotplay::Tag>> = None;
    for step in 0..args.steps {
        // First step only settles the initial layout
        let stride = if step == 0 { 0 } else { args.stride };
        let report = feed.step(step, stride);
        if last.as_ref() != Some(&report.playing) {
            let tags: Vec<&str> = report.playing.iter().map(|t| t.as_str()).collect();
            println!("step {:>3}  offset {:>5}  playing [{}]", step, report.offset, tags.join(", "));
            last = Some(report.playing);
        }
    }

    if feed.players_created() > args.items {
        warn!("More players created than items: {}", feed.players_created());
    }
    println!(
        "{} items, mode {:?}: {} players created, {} selection changes",
        args.items,
        mode,
        feed.players_created(),
        feed.selection_events()
    );
    feed.close();
    Ok(())
}
