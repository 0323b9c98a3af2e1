//! # locwatch-replay
//!
//! Replays a location script through the monitoring engine.
//!
//! ## Running
//!
//! ```bash
//! locwatch-replay --script walk.json --authorization always
//! locwatch-replay --config locwatch.toml --script walk.json --production
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;

use locwatch_core::platform::DEFAULT_MAX_MONITORED_REGIONS;
use locwatch_core::AuthorizationStatus;
use locwatch_replay::{load_config, load_script, logging, EventSink, PlatformOptions, Replay};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AuthorizationArg {
    /// The user has not been asked yet
    NotDetermined,
    /// Blocked by policy
    Restricted,
    /// Refused by the user
    Denied,
    /// Allowed while the app is in use
    WhenInUse,
    /// Allowed at all times
    Always,
}

impl From<AuthorizationArg> for AuthorizationStatus {
    fn from(arg: AuthorizationArg) -> Self {
        match arg {
            AuthorizationArg::NotDetermined => Self::NotDetermined,
            AuthorizationArg::Restricted => Self::Restricted,
            AuthorizationArg::Denied => Self::Denied,
            AuthorizationArg::WhenInUse => Self::AuthorizedForeground,
            AuthorizationArg::Always => Self::AuthorizedAlways,
        }
    }
}

#[derive(Parser)]
#[command(name = "locwatch-replay")]
#[command(about = "Replay a location script through the monitoring engine", long_about = None)]
struct Args {
    /// Engine configuration file (TOML); the user configuration file if omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Script to replay (JSON array of steps)
    #[arg(long)]
    script: PathBuf,

    /// Authorization status the platform reports at startup
    #[arg(long, value_enum, default_value = "not-determined")]
    authorization: AuthorizationArg,

    /// Answer mode starts asynchronously; scripts confirm them with `confirm` steps
    #[arg(long)]
    deferred: bool,

    /// Report significant-change monitoring as unavailable
    #[arg(long)]
    no_significant_change: bool,

    /// Maximum number of monitored regions
    #[arg(long, default_value_t = DEFAULT_MAX_MONITORED_REGIONS)]
    max_regions: usize,

    /// Use production logging (JSON log files + compact stderr)
    #[arg(long)]
    production: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logging::init(args.production)?;

    let config = load_config(args.config.as_deref())?;
    let steps = load_script(&args.script)?;
    info!(
        script = %args.script.display(),
        steps = steps.len(),
        "Starting replay"
    );

    let options = PlatformOptions {
        authorization: args.authorization.into(),
        deferred_activation: args.deferred,
        significant_change_available: !args.no_significant_change,
        max_monitored_regions: args.max_regions,
    };
    let replay =
        Replay::new(config, options, EventSink::stdout()).context("Invalid engine configuration")?;

    let summary = replay.run(&steps);
    info!(
        steps = summary.steps,
        step_errors = summary.step_errors,
        "Replay finished"
    );

    Ok(())
}
