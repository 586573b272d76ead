use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{error, info, warn};

use crate::config::{FilterKind, PipelineConfig};
use crate::data::loader::load_file;
use crate::data::model::FrequencyRange;
use crate::export;
use crate::state::{Session, SpurStatus};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "phase-noise-conditioner")]
#[command(version, about = "Smooth phase-noise curves, remove spurs and read spot noise", long_about = None)]
pub struct Cli {
    /// Measurement files (.csv, .txt, .dat, .json, .parquet)
    #[arg(short, long = "input", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Pipeline configuration as JSON; flags below override its fields
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable smoothing with this filter (moving-average, median, savitzky-golay)
    #[arg(long)]
    pub filter: Option<FilterKind>,

    /// Filter window in samples (odd, 3-51)
    #[arg(long)]
    pub window: Option<usize>,

    /// Enable reference-driven spur removal
    #[arg(long)]
    pub spur_removal: bool,

    /// Spur detection threshold in dB above the reference baseline
    #[arg(long)]
    pub spur_threshold: Option<f64>,

    /// Lower end of the spot-noise window in Hz
    #[arg(long)]
    pub min_freq: Option<f64>,

    /// Upper end of the spot-noise window in Hz
    #[arg(long)]
    pub max_freq: Option<f64>,

    /// Write spot noise of the first dataset to this CSV file
    #[arg(long)]
    pub spot_csv: Option<PathBuf>,

    /// Write raw and processed curves of the first dataset to this CSV file
    #[arg(long)]
    pub processed_csv: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Configuration file (or defaults) with the command-line overrides applied.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(kind) = self.filter {
            config.filtering_enabled = true;
            config.filter.kind = kind;
        }
        if let Some(window) = self.window {
            config.filter.window = window;
        }
        if self.spur_removal {
            config.spur_removal_enabled = true;
        }
        if let Some(threshold) = self.spur_threshold {
            config.spur.threshold_db = threshold;
        }

        config.validate().context("invalid pipeline configuration")?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Headless run
// ---------------------------------------------------------------------------

/// Load every input, configure a session and run the pipeline.
///
/// Files that fail to load are logged and skipped; it is an error only when
/// none of them loads.
pub fn build_session(cli: &Cli) -> Result<Session> {
    let config = cli.pipeline_config()?;

    // spur removal is switched on after loading, once references are known
    let mut session = Session::new(PipelineConfig {
        spur_removal_enabled: false,
        ..config
    })?;

    for path in &cli.inputs {
        match load_file(path) {
            Ok(dataset) => {
                session.add_dataset(dataset);
            }
            Err(e) => error!("Failed to load {}: {e:#}", path.display()),
        }
    }
    if session.is_empty() {
        bail!("none of the {} input file(s) could be loaded", cli.inputs.len());
    }

    if config.spur_removal_enabled {
        session.set_spur_removal_enabled(true);
    }

    if cli.min_freq.is_some() || cli.max_freq.is_some() {
        let current = session.visible_range();
        let range = FrequencyRange::new(
            cli.min_freq.unwrap_or(current.min),
            cli.max_freq.unwrap_or(current.max),
        );
        info!("Spot noise window {} Hz .. {} Hz", range.min, range.max);
        session.set_visible_range(range);
    }

    for (id, dataset) in session.datasets() {
        if let Some(SpurStatus::Unavailable) = session.spur_status(id) {
            warn!("'{}' has no reference channel, spur removal skipped", dataset.name);
        }
    }

    Ok(session)
}

/// Run the tool: print the spot-noise table and write the requested exports.
pub fn run(cli: &Cli) -> Result<()> {
    let session = build_session(cli)?;

    let spots = session.spot_noise();
    if spots.is_empty() {
        warn!("No spot noise points inside the visible window");
    } else {
        println!("{}", export::format_spot_noise_table(&spots));
    }

    if let Some(path) = &cli.spot_csv {
        export::export_spot_noise_csv(path, &spots)?;
    }
    if let Some(path) = &cli.processed_csv {
        let (_, dataset) = session
            .datasets()
            .next()
            .context("no dataset to export")?;
        export::export_processed_csv(path, dataset)?;
    }
    Ok(())
}
