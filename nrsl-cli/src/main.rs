//! nrsl-sim: NR sidelink mode-2 scenario runner
//!
//! Loads a sidelink configuration, runs its scenario block against one
//! simulated UE MAC and prints a summary.
//!
//! # Usage
//!
//! ```bash
//! nrsl-sim -c config/sidelink.yaml
//! nrsl-sim -c config/sidelink.yaml -s 4000 --seed 7 -l debug
//! ```

mod scenario;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use nrsl_common::{init_logging, LogLevel, SidelinkConfig};

use scenario::run_scenario;

/// nrsl-sim - NR sidelink mode-2 resource selection simulator
#[derive(Parser, Debug)]
#[command(name = "nrsl-sim")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the sidelink configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config_file: PathBuf,

    /// Override the number of slots to simulate
    #[arg(short = 's', long = "slots", value_name = "SLOTS")]
    slots: Option<u64>,

    /// Override the scheduler seed
    #[arg(long = "seed", value_name = "SEED")]
    seed: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long = "log-level", value_name = "LEVEL", default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

/// Loads the configuration and applies the command line overrides.
fn load_config(args: &Args) -> Result<SidelinkConfig> {
    let mut config = SidelinkConfig::from_yaml_file(&args.config_file).with_context(|| {
        format!("failed to load configuration from {}", args.config_file.display())
    })?;

    if let Some(seed) = args.seed {
        config.scheduler.seed = seed;
    }
    if let Some(slots) = args.slots {
        config
            .scenario
            .as_mut()
            .context("--slots given but the configuration has no scenario block")?
            .num_slots = slots;
    }
    Ok(config)
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    info!(
        config = %args.config_file.display(),
        numerology = config.numerology,
        scheduler = %config.scheduler.kind,
        "Loaded sidelink configuration"
    );

    tokio::select! {
        summary = run_scenario(&config) => {
            println!("{}", summary?);
            Ok(())
        }
        _ = signal::ctrl_c() => {
            warn!("Interrupted, scenario aborted");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_level);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("ERROR: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
