//! sotto - scripted dictation-session demo.
//!
//! # Configuration
//!
//! Settings are resolved from multiple sources with priority:
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`SOTTO_*`)
//! 3. Config file (`--config`, or `sotto.toml` when present)
//! 4. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `SOTTO_GRACE_SECS`: keep-alive grace for the capture device
//! - `RUST_LOG`: log filter when neither `--debug` nor `--verbose` is set

mod demo;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sotto_runtime::RuntimeConfig;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use demo::Script;

/// sotto - scripted dictation-session demo
#[derive(Parser, Debug)]
#[command(name = "sotto")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Config file path (default: ./sotto.toml when present)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Keep-alive grace for the capture device, in seconds (also:
    /// SOTTO_GRACE_SECS)
    #[arg(long, value_name = "SECS")]
    grace_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a scripted session against in-process peers.
    Demo {
        /// Which session shape to play.
        #[arg(long, value_enum, default_value_t = Script::Happy)]
        script: Script,
    },
}

/// Merges file and environment configuration, then applies CLI
/// overrides as the highest-priority layer.
fn resolve_config(args: &Cli) -> Result<RuntimeConfig> {
    let mut config = match &args.config {
        Some(path) => RuntimeConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => {
            let default = Path::new("sotto.toml");
            if default.exists() {
                RuntimeConfig::load(default).context("loading sotto.toml")?
            } else {
                RuntimeConfig::default()
            }
        }
    };
    if let Ok(raw) = std::env::var("SOTTO_GRACE_SECS") {
        config.keep_alive_grace_secs = raw
            .parse()
            .context("SOTTO_GRACE_SECS must be a whole number of seconds")?;
    }
    if let Some(secs) = args.grace_secs {
        config.keep_alive_grace_secs = secs;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Terminal filter: --debug > --verbose > RUST_LOG env > default "warn"
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else if args.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_filter(filter))
        .init();

    let config = resolve_config(&args)?;
    println!("sotto v{}", env!("CARGO_PKG_VERSION"));
    info!(grace_secs = config.keep_alive_grace_secs, "runtime configured");

    match args.command {
        Command::Demo { script } => demo::run(script, &config).await,
    }
}
