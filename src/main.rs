use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info};

use pollen_calibration::logging::init_tracing;
use pollen_calibration::{load_config, Calibrator};

#[derive(Parser, Debug)]
#[command(name = "pollen-calibration", version)]
#[command(about = "Calibrate pollen phenology and emission strength fields against station observations", long_about = None)]
struct Args {
    /// Increase log output (-v warnings, -vv info, -vvv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Update the season start/end thresholds and season length
    UpdatePhenology {
        /// JSON configuration file
        #[arg(env = "POLLEN_CALIBRATION_CONFIG")]
        config: PathBuf,
    },
    /// Update the emission strength tuning factor
    UpdateStrength {
        /// JSON configuration file
        #[arg(env = "POLLEN_CALIBRATION_CONFIG")]
        config: PathBuf,
    },
}

fn run(command: &Command) -> Result<()> {
    let start = Instant::now();
    let (config_path, phenology) = match command {
        Command::UpdatePhenology { config } => (config, true),
        Command::UpdateStrength { config } => (config, false),
    };

    let config = load_config(config_path)
        .with_context(|| format!("Failed to load configuration {}", config_path.display()))?;
    let calibrator = Calibrator::new(config)?;

    let summary = if phenology {
        calibrator.update_phenology()?
    } else {
        calibrator.update_strength()?
    };

    info!(
        "Calibration finished in {:.2?}: processed {:?}, skipped {:?}, updated {:?}",
        start.elapsed(),
        summary.species_processed,
        summary.species_skipped,
        summary.fields_updated
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(&args.command) {
        error!("Calibration aborted: {:#}", e);
        return Err(e);
    }
    Ok(())
}
