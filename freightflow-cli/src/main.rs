//! freightflow CLI: simulate loads, build features, train and query the acceptance model.

mod commands;

use chrono::NaiveDate;
use clap::Parser;
use freightflow_core::Market;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// freightflow: freight load simulation and carrier acceptance modeling
#[derive(Parser, Debug)]
#[command(name = "freightflow", version, about, long_about = None)]
struct Cli {
    /// Workspace directory holding databases, models and `.freightflow/config.toml`
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Simulate loads and carrier decisions into the raw database
    #[command(alias = "simulation")]
    Simulate {
        /// Number of loads (defaults to `simulation.load_count`)
        #[arg(short, long)]
        count: Option<usize>,
        /// Run seed (defaults to `simulation.seed`)
        #[arg(short, long)]
        seed: Option<u64>,
        /// Generate `loads_per_day` loads for every day in the pickup window
        #[arg(long)]
        calendar: bool,
        /// Replace an existing raw database instead of summarising it
        #[arg(short, long)]
        force: bool,
    },
    /// List simulation runs and their acceptance rates
    Summary,
    /// Compute features for a run and write them to the feature store
    Features {
        /// Run to featurize (defaults to the latest run)
        #[arg(long)]
        run_id: Option<String>,
        /// Print the feature definitions and exit
        #[arg(long)]
        list: bool,
    },
    /// Train on rows before the cutoff, evaluate on the rest, save the model
    Train {
        /// First pickup date held out for evaluation (YYYY-MM-DD)
        #[arg(long)]
        cutoff: Option<NaiveDate>,
        /// Where to write the model artifact
        #[arg(long)]
        model_path: Option<PathBuf>,
    },
    /// Score a new load with the saved model
    Predict {
        /// Origin market code, e.g. TX_DAL
        #[arg(long)]
        origin: Market,
        /// Destination market code, e.g. TX_HOU
        #[arg(long)]
        destination: Market,
        #[arg(long)]
        rate_per_mile: f64,
        /// Weight in pounds
        #[arg(long)]
        weight: u32,
        /// Pickup date (YYYY-MM-DD)
        #[arg(long)]
        pickup: NaiveDate,
        /// Pickup hour (0-23)
        #[arg(long, default_value = "10")]
        hour: u32,
    },
    /// Simulate, featurize, train and evaluate in one pass
    Pipeline {
        #[arg(short, long)]
        count: Option<usize>,
        #[arg(short, long)]
        seed: Option<u64>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default configuration file in the workspace
    Init,
    /// Show the merged configuration
    Show,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = freightflow_core::config::log_dir();
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "freightflow.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_predict() {
        let cli = Cli::try_parse_from([
            "freightflow",
            "predict",
            "--origin",
            "tx_dal",
            "--destination",
            "TX_HOU",
            "--rate-per-mile",
            "2.1",
            "--weight",
            "30000",
            "--pickup",
            "2025-03-04",
        ])
        .unwrap();
        match cli.command {
            Commands::Predict {
                origin,
                destination,
                hour,
                ..
            } => {
                assert_eq!(origin, Market::TxDal);
                assert_eq!(destination, Market::TxHou);
                assert_eq!(hour, 10);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_simulation_alias_and_global_flags() {
        let cli = Cli::try_parse_from(["freightflow", "simulation", "--count", "5", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Commands::Simulate {
                count: Some(5),
                force: false,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_market_is_rejected() {
        let parsed = Cli::try_parse_from([
            "freightflow",
            "predict",
            "--origin",
            "XX_YYY",
            "--destination",
            "TX_HOU",
            "--rate-per-mile",
            "2.1",
            "--weight",
            "30000",
            "--pickup",
            "2025-03-04",
        ]);
        assert!(parsed.is_err());
    }
}
