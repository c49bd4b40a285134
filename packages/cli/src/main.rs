#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Habitat range and overlap analysis from the command line.
//!
//! Reads observations from a CSV file and prints results as JSON, with
//! habitat polygons encoded as `GeoJSON` geometries.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use habitat_map_cli::config::AnalysisConfig;
use habitat_map_cli::{CliError, input, parse_date};
use habitat_map_habitat_models::{HabitatMethod, HabitatParams, KdeParams, TrendWindow};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "habitat_map_cli", about = "Species home range and overlap analysis")]
struct Cli {
    /// Analysis defaults to use instead of the built-in ones
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write JSON here instead of stdout
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate one species' home range
    Habitat {
        #[command(flatten)]
        input: InputArgs,
        /// Species to estimate; every row is used when omitted
        #[arg(long)]
        species: Option<i64>,
        #[command(flatten)]
        method: MethodArgs,
    },
    /// Measure how two species' home ranges overlap
    Overlap {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long)]
        species1: i64,
        #[arg(long)]
        species2: i64,
        #[command(flatten)]
        method: MethodArgs,
    },
    /// Track two species' KDE overlap across sliding date windows
    OverlapTrend {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long)]
        species1: i64,
        #[arg(long)]
        species2: i64,
        #[command(flatten)]
        window: WindowArgs,
        #[command(flatten)]
        kde: KdeArgs,
    },
    /// Track species' centroids and KDE ranges across sliding date windows
    HabitatEvolution {
        #[command(flatten)]
        input: InputArgs,
        /// Comma-separated species ids
        #[arg(long, value_delimiter = ',', required = true)]
        species: Vec<i64>,
        #[command(flatten)]
        window: WindowArgs,
        #[command(flatten)]
        kde: KdeArgs,
    },
}

#[derive(Args)]
struct InputArgs {
    /// Observation CSV with longitude, latitude, timestamp, and `species_id` columns
    #[arg(long = "input", short = 'i')]
    path: PathBuf,
}

#[derive(Args)]
struct KdeArgs {
    /// Kernel bandwidth in degrees (rule of thumb when omitted)
    #[arg(long)]
    bandwidth: Option<f64>,
    /// Contour level percentage
    #[arg(long)]
    level_percent: Option<f64>,
    /// Grid nodes per axis
    #[arg(long)]
    grid_size: Option<u32>,
}

impl KdeArgs {
    fn params(&self, config: &AnalysisConfig) -> Result<KdeParams, CliError> {
        Ok(config.kde_params(self.bandwidth, self.level_percent, self.grid_size)?)
    }
}

#[derive(Args)]
struct MethodArgs {
    /// Estimation method: mcp or kde
    #[arg(long, default_value = "kde", value_parser = HabitatMethod::parse)]
    method: HabitatMethod,
    /// MCP outlier trimming percentile
    #[arg(long)]
    percentage: Option<f64>,
    #[command(flatten)]
    kde: KdeArgs,
}

impl MethodArgs {
    fn params(&self, config: &AnalysisConfig) -> Result<HabitatParams, CliError> {
        Ok(config.habitat_params(
            self.method,
            self.percentage,
            self.kde.bandwidth,
            self.kde.level_percent,
            self.kde.grid_size,
        )?)
    }
}

#[derive(Args)]
struct WindowArgs {
    /// First step (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_parser = parse_date)]
    start: DateTime<Utc>,
    /// Last possible step (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_parser = parse_date)]
    end: DateTime<Utc>,
    /// Days between steps
    #[arg(long)]
    step_days: Option<u32>,
    /// Days each step looks back over
    #[arg(long)]
    window_days: Option<u32>,
}

impl WindowArgs {
    fn window(&self, config: &AnalysisConfig) -> Result<TrendWindow, CliError> {
        Ok(config.trend_window(self.start, self.end, self.step_days, self.window_days)?)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let config = AnalysisConfig::load(cli.config.as_deref())?;
    let output = cli.output.as_deref();

    match cli.command {
        Commands::Habitat {
            input: source,
            species,
            method,
        } => {
            let params = method.params(&config)?;
            let records = input::read_observations(&source.path)?;
            emit(&habitat_map_cli::habitat(&records, species, &params), output)?;
        }
        Commands::Overlap {
            input: source,
            species1,
            species2,
            method,
        } => {
            let params = method.params(&config)?;
            let records = input::read_observations(&source.path)?;
            emit(
                &habitat_map_cli::overlap(&records, species1, species2, &params),
                output,
            )?;
        }
        Commands::OverlapTrend {
            input: source,
            species1,
            species2,
            window,
            kde,
        } => {
            let window = window.window(&config)?;
            let kde = kde.params(&config)?;
            let records = input::read_observations(&source.path)?;
            emit(
                &habitat_map_cli::overlap_trend(&records, species1, species2, &window, &kde),
                output,
            )?;
        }
        Commands::HabitatEvolution {
            input: source,
            species,
            window,
            kde,
        } => {
            let window = window.window(&config)?;
            let kde = kde.params(&config)?;
            let records = input::read_observations(&source.path)?;
            emit(
                &habitat_map_cli::habitat_evolution(&records, &species, &window, &kde),
                output,
            )?;
        }
    }

    Ok(())
}

/// Writes `value` as pretty JSON to `path`, or to stdout.
fn emit(value: &impl Serialize, path: Option<&Path>) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => {
            std::fs::write(path, json + "\n")?;
            log::info!("Wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
