use anyhow::{Context, Result};
use bbmod_core::logging::{LogFormat, init_logging};
use bbmod_core::{Bridge, BridgeConfig, addons, version};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

mod host;

use host::ConsoleHost;

/// Run bbmod addons outside the game.
///
/// Loads `<addons dir>/init.lua` into the script bridge and drives frames from
/// a console host, so addons can be exercised without the game running.
///
/// EXAMPLES:
///     bbmod run --frames 60                 Run one second of frames
///     bbmod run --press 65 --release 65     Feed key events to the addons
///     bbmod version --json                  Bridge version as JSON
///     bbmod require-version 3 5 0           Exit 0 if the bridge is new enough
#[derive(Parser)]
#[command(name = "bbmod")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (defaults to ./bbmod.toml when present)
    #[arg(long, global = true, env = "BBMOD_CONFIG")]
    config: Option<PathBuf>,

    /// Log level or filter, overrides the config file
    #[arg(long, global = true, env = "BBMOD_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (pretty or json), overrides the config file
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the entry script and run frames
    Run {
        /// Number of frames to run
        #[arg(long, default_value_t = 1)]
        frames: u32,

        /// Delay between frames in milliseconds
        #[arg(long, default_value_t = 16)]
        frame_ms: u64,

        /// Key code to report as pressed before the first frame (repeatable)
        #[arg(long = "press", value_name = "CODE")]
        press: Vec<i32>,

        /// Key code to report as released before the first frame (repeatable)
        #[arg(long = "release", value_name = "CODE")]
        release: Vec<i32>,
    },

    /// Print the bridge version
    Version {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Exit 0 if the bridge version is at least MAJOR.MINOR.PATCH, else 1
    RequireVersion {
        major: i64,
        minor: i64,
        patch: i64,
    },

    /// List addon directories and font files
    Addons,
}

fn load_config(cli: &Cli) -> Result<BridgeConfig> {
    let mut config = BridgeConfig::load_or_default(cli.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(level) = &cli.log_level {
        config.general.log_level.clone_from(level);
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }
    Ok(config)
}

fn run(config: BridgeConfig, frames: u32, frame_ms: u64, press: Vec<i32>, release: Vec<i32>) -> Result<()> {
    let host = Arc::new(ConsoleHost::default());
    let mut bridge = Bridge::new(config, host.clone());
    bridge
        .initialize_or_exit()
        .context("failed to start the script bridge")?;

    // Key events arrive from another thread, as they would from an input hook.
    let sender = bridge.key_sender();
    let producer = std::thread::spawn(move || {
        for code in press {
            sender.push_pressed(code);
        }
        for code in release {
            sender.push_released(code);
        }
    });
    producer
        .join()
        .map_err(|_| anyhow::anyhow!("key event producer panicked"))?;

    let mut key_events = 0;
    for frame in 0..frames {
        if frame > 0 && frame_ms > 0 {
            std::thread::sleep(Duration::from_millis(frame_ms));
        }
        let stats = bridge
            .frame_tick_or_exit()
            .with_context(|| format!("frame {frame} failed"))?;
        key_events += stats.key_events;
        tracing::debug!(frame, ?stats, "frame done");
    }

    tracing::info!(
        frames,
        key_events,
        sleep_hack = host.sleep_hack_enabled(),
        "run finished"
    );
    Ok(())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(&config.log_config()).context("failed to initialize logging")?;

    match cli.command {
        Commands::Run {
            frames,
            frame_ms,
            press,
            release,
        } => run(config, frames, frame_ms, press, release)?,
        Commands::Version { json } => {
            let info = version::BRIDGE_VERSION.info();
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("bbmod {}", info.version_string);
            }
        }
        Commands::RequireVersion {
            major,
            minor,
            patch,
        } => {
            if !version::require_version(major, minor, patch) {
                eprintln!(
                    "bridge {} is older than required {major}.{minor}.{patch}",
                    version::BRIDGE_VERSION
                );
                return Ok(ExitCode::FAILURE);
            }
            println!("ok");
        }
        Commands::Addons => {
            let addons_dir = &config.addons.dir;
            let names = addons::list_addon_directories(addons_dir, &config.addons.excluded_dirs)
                .with_context(|| format!("failed to list {}", addons_dir.display()))?;
            for name in names {
                println!("addon\t{name}");
            }
            for font in addons::list_font_files(&config.addons.fonts_path())? {
                println!("font\t{font}");
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
