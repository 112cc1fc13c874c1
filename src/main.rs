//! Command-line entry point: load a YAML config, apply `key=value`
//! overrides, and train.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::info;

use ferrite_train::config::{Override, TrainConfig};
use ferrite_train::logging::init_logging;
use ferrite_train::math::Device;
use ferrite_train::train::run_with_progress;

/// Train an image-folder classifier.
#[derive(Parser, Debug)]
#[command(name = "ferrite-train", version, about)]
struct Args {
    /// Path to the YAML training configuration
    #[arg(short, long, value_name = "FILE", default_value = "configs/config.yaml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Hide per-batch progress bars
    #[arg(long)]
    no_progress: bool,

    /// Config overrides such as `train.epochs=5` or `+train.seed=3`
    #[arg(value_name = "OVERRIDES")]
    overrides: Vec<Override>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose).map_err(|e| anyhow!(e))?;

    let config = TrainConfig::load(&args.config, &args.overrides)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

    let device = Device::detect();
    let summary = run_with_progress(&config, device, !args.no_progress).context("Training failed")?;

    match summary.best_epoch {
        Some(epoch) => info!(
            "best val_accuracy {:.3} at epoch {epoch}, saved to {}",
            summary.best_accuracy,
            summary.checkpoint_path.display()
        ),
        None => info!("validation accuracy never rose above 0; no checkpoint written"),
    }
    Ok(())
}
