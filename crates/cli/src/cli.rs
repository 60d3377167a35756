//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use contracts::OverflowStrategy;
use std::path::PathBuf;

/// Throttler - keyed call throttling driven by simulated value changes
#[derive(Parser, Debug)]
#[command(
    name = "throttler",
    author,
    version,
    about = "Keyed call throttler with bounded per-key queues",
    long_about = "Runs a keyed call-throttling dispatcher fed by simulated value-change channels.\n\n\
                  Each channel submits its changes on its own key; calls on one key run at\n\
                  least the configured interval apart and excess calls are dropped according\n\
                  to the configured overflow strategy."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "THROTTLER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "THROTTLER_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the throttler against simulated value-change channels
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "throttler.toml",
        env = "THROTTLER_CONFIG"
    )]
    pub config: PathBuf,

    /// Override the throttle interval in seconds
    #[arg(long, env = "THROTTLER_INTERVAL")]
    pub interval: Option<f64>,

    /// Override the overflow strategy
    #[arg(long, value_parser = parse_strategy, env = "THROTTLER_STRATEGY")]
    pub strategy: Option<OverflowStrategy>,

    /// Use conservative capacity limits (5 per queue, drop_oldest, 50 total)
    #[arg(long)]
    pub conservative: bool,

    /// Run duration in seconds (0 = until Ctrl+C)
    #[arg(long, default_value = "0", env = "THROTTLER_DURATION")]
    pub duration: u64,

    /// Stop each channel after this many samples (0 = unlimited)
    #[arg(long, default_value = "0", env = "THROTTLER_MAX_SAMPLES")]
    pub max_samples: u64,

    /// Interval between statistics log lines in seconds
    #[arg(long, default_value = "5", env = "THROTTLER_STATS_INTERVAL")]
    pub stats_interval: u64,

    /// Validate configuration and exit without running
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "THROTTLER_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "throttler.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "throttler.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show detailed channel information
    #[arg(long)]
    pub channels: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

fn parse_strategy(value: &str) -> Result<OverflowStrategy, String> {
    value.parse().map_err(|e: contracts::ContractError| e.to_string())
}
