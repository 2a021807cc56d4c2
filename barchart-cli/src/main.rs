// Barchart CLI - JSON-lines host for barchart
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Barchart CLI
//!
//! Feeds JSON-lines events through a bar chart node and prints one outbound
//! message per accepted event.
//!
//! ## Usage
//!
//! ```bash
//! # Hourly sums over the last 24 hours, state kept across runs
//! barchart-cli --state chart.json < events.jsonl
//!
//! # Daily meter increments for a week, settings from a file
//! barchart-cli --config meter.json --interval days --size 7 --input events.jsonl
//! ```

mod error;
mod file_store;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use barchart::{
    BarChartNode, ChartConfig, Granularity, KeyValueStore, MemoryStore, Strategy, TimeZoneMode,
};
use clap::Parser;
use error::Result;
use file_store::JsonFileStore;
use serde_json::Value;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Barchart JSON-lines host
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON file with node settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Events file (JSON lines); stdin when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// State file; in-memory only when omitted
    #[arg(short, long)]
    state: Option<PathBuf>,

    /// Bucket granularity (seconds, minutes, quarter_hours, hours, days, months, years)
    #[arg(long)]
    interval: Option<Granularity>,

    /// Number of buckets in the window
    #[arg(long)]
    size: Option<usize>,

    /// Aggregation strategy (sum, min, max, avg)
    #[arg(long)]
    agg_by: Option<Strategy>,

    /// Decimal places for output, 0 disables rounding
    #[arg(long)]
    precision: Option<u32>,

    /// Display unit
    #[arg(long)]
    unit: Option<String>,

    /// Treat readings as cumulative meter values
    #[arg(long)]
    meter: bool,

    /// Clamp negative meter deltas to zero
    #[arg(long)]
    prevent_negative: bool,

    /// Bucket boundaries in UTC instead of local time
    #[arg(long, conflicts_with = "offset_minutes")]
    utc: bool,

    /// Bucket boundaries at a fixed offset east of UTC
    #[arg(long, allow_hyphen_values = true)]
    offset_minutes: Option<i32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Settings file (or defaults) with command-line overrides applied
    fn chart_config(&self) -> Result<ChartConfig> {
        let mut config = match &self.config {
            Some(path) => serde_json::from_reader(BufReader::new(File::open(path)?))?,
            None => ChartConfig::default(),
        };

        if let Some(interval) = self.interval {
            config.x_interval = interval;
        }
        if let Some(size) = self.size {
            config.x_size = size;
        }
        if let Some(agg_by) = self.agg_by {
            config.agg_by = agg_by;
        }
        if let Some(precision) = self.precision {
            config.precision = precision;
        }
        if let Some(unit) = &self.unit {
            config.unit = unit.clone();
        }
        config.is_meter_reading |= self.meter;
        config.prevent_negative |= self.prevent_negative;
        if self.utc {
            config.time_zone = TimeZoneMode::Utc;
        } else if let Some(minutes) = self.offset_minutes {
            config.time_zone = TimeZoneMode::Fixed(minutes);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Counters for one run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct RunStats {
    accepted: usize,
    rejected: usize,
}

/// Handle every line of `input`, writing outbound messages to `output`.
///
/// `after_event` runs after each accepted event (used to flush state).
fn process<S, R, W, F>(
    node: &mut BarChartNode<S>,
    input: R,
    mut output: W,
    mut after_event: F,
) -> Result<RunStats>
where
    S: KeyValueStore,
    R: BufRead,
    W: Write,
    F: FnMut(&mut BarChartNode<S>) -> Result<()>,
{
    let mut stats = RunStats::default();

    for (number, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let event: Value = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                error!(line = number + 1, "unparseable event: {}", e);
                stats.rejected += 1;
                continue;
            }
        };

        match node.handle_json(event) {
            Ok(outcome) => {
                for warning in &outcome.warnings {
                    warn!(line = number + 1, "{}", warning);
                }
                serde_json::to_writer(&mut output, &outcome.message)?;
                writeln!(output)?;
                after_event(node)?;
                stats.accepted += 1;
            }
            Err(e) => {
                error!(line = number + 1, "event rejected: {}", e);
                stats.rejected += 1;
            }
        }
    }

    output.flush()?;
    Ok(stats)
}

fn input_reader(path: Option<&PathBuf>) -> Result<Box<dyn BufRead>> {
    Ok(match path {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    })
}

fn run(args: &Args) -> Result<RunStats> {
    let config = args.chart_config()?;
    info!(
        interval = %config.x_interval,
        size = config.x_size,
        agg_by = %config.agg_by,
        meter = config.is_meter_reading,
        "node configured"
    );

    let input = input_reader(args.input.as_ref())?;
    let stdout = io::stdout();
    let output = stdout.lock();

    match &args.state {
        Some(path) => {
            let mut node = BarChartNode::new(config, JsonFileStore::load(path)?)?;
            process(&mut node, input, output, |node| {
                node.store_mut().kv_mut().flush()
            })
        }
        None => {
            let mut node = BarChartNode::new(config, MemoryStore::new())?;
            process(&mut node, input, output, |_| Ok(()))
        }
    }
}

fn main() {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    // stdout carries the outbound messages
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    info!("Barchart CLI v{}", env!("CARGO_PKG_VERSION"));

    match run(&args) {
        Ok(stats) => info!(
            accepted = stats.accepted,
            rejected = stats.rejected,
            "input exhausted"
        ),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}
