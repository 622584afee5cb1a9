//! Powercast CLI
//!
//! Command-line front end for the reward and pledge forecaster. Reads a JSON
//! dataset, runs one computation and prints the result as JSON.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use powercast_economics::{
    AmortizationRequest, Dataset, ForecastConfig, Forecaster, LuckEstimator, LuckWindow, ProjectionRequest,
    Sources, PIB,
};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "powercast")]
#[command(version)]
#[command(about = "Storage network reward, pledge and miner payback forecasting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Dataset file (observed days, blocks, network overview)
    #[arg(short, long, global = true, env = "POWERCAST_DATA", default_value = "powercast.json")]
    data: PathBuf,

    /// Configuration file; mainnet defaults when omitted
    #[arg(short, long, global = true, env = "POWERCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Evaluation instant (RFC 3339); defaults to now
    #[arg(long, global = true)]
    as_of: Option<DateTime<Utc>>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the historical ledger
    History {
        /// Only print rows from this date on
        #[arg(long)]
        from: Option<NaiveDate>,
    },

    /// Project the ledger forward
    Project {
        /// Constant luck; live luck when omitted
        #[arg(long)]
        luck: Option<f64>,

        /// Daily network power increment in PiB; trailing average when omitted
        #[arg(long)]
        increase_pib: Option<f64>,

        /// Days to project
        #[arg(long)]
        days: Option<u32>,

        /// Only print projected rows
        #[arg(long)]
        projected_only: bool,
    },

    /// Simulate a miner's sealing ramp and payback
    Simulate {
        /// TiB sealed per day
        #[arg(long)]
        power_per_day: f64,

        /// Target capacity in TiB
        #[arg(long)]
        total_power: f64,

        /// Capacity already sealed in TiB
        #[arg(long, default_value = "0")]
        init_power: f64,

        /// Date of day 1
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Days to simulate
        #[arg(long)]
        horizon: Option<u32>,

        #[arg(long)]
        luck: Option<f64>,

        /// Network power increment in PiB for the underlying projection
        #[arg(long)]
        increase_pib: Option<f64>,

        /// JSON array of reward per TiB per day, replacing the projection
        #[arg(long)]
        rewards: Option<PathBuf>,

        /// Pledge per TiB used with --rewards or --snapshot-rates
        #[arg(long)]
        pledge: Option<f64>,

        /// Price every day at the snapshot's reward per TiB
        #[arg(long, conflicts_with = "rewards")]
        snapshot_rates: bool,

        /// Outlay to recover
        #[arg(long, default_value = "0")]
        cost: f64,

        /// Token price; snapshot price when omitted
        #[arg(long)]
        price: Option<f64>,

        /// Deduct gas from income
        #[arg(long)]
        use_gas: bool,

        /// Only print the summary
        #[arg(long)]
        summary: bool,
    },

    /// Estimate luck
    Luck {
        /// Day to measure; recent blocks when omitted
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false),
        )
        .init();
}

fn expand_path(path: &Path) -> PathBuf {
    if let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~/")) {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ForecastConfig> {
    match path {
        Some(path) => {
            let path = expand_path(path);
            ForecastConfig::load(&path).with_context(|| format!("loading config {}", path.display()))
        }
        None => Ok(ForecastConfig::default()),
    }
}

fn load_dataset(path: &Path) -> anyhow::Result<Dataset> {
    let path = expand_path(path);
    let dataset = Dataset::load(&path).with_context(|| format!("loading dataset {}", path.display()))?;
    tracing::debug!(days = dataset.days.len(), blocks = dataset.blocks.len(), "Loaded dataset");
    Ok(dataset)
}

fn pib_to_bytes(pib: f64) -> i128 {
    (pib * PIB) as i128
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    let as_of = cli.as_of.unwrap_or_else(Utc::now);

    if let Commands::Config = cli.command {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let dataset = load_dataset(&cli.data)?;

    match cli.command {
        Commands::History { from } => {
            let forecaster = Forecaster::new(config, Sources::from_dataset(dataset))?;
            let history = forecaster.build_history(as_of, true)?;
            let rows: Vec<_> = history
                .iter()
                .filter(|row| from.map_or(true, |from| row.date >= from))
                .collect();
            print_json(&rows)?;
        }

        Commands::Project {
            luck,
            increase_pib,
            days,
            projected_only,
        } => {
            let forecaster = Forecaster::new(config, Sources::from_dataset(dataset))?;
            let request = ProjectionRequest {
                luck_v: luck,
                increase_power_per_day: increase_pib.map(pib_to_bytes),
                days,
                must_refresh: true,
            };
            let projection = forecaster.project(&request, as_of)?;
            tracing::info!(
                luck_v = projection.luck_v,
                luck_assumed = projection.luck_assumed,
                increase = projection.increase_power_per_day,
                increase_derived = projection.increase_derived,
                "Projection ready"
            );
            if projected_only {
                print_json(&projection.projected())?;
            } else {
                print_json(projection.as_ref())?;
            }
        }

        Commands::Simulate {
            power_per_day,
            total_power,
            init_power,
            start,
            horizon,
            luck,
            increase_pib,
            rewards,
            pledge,
            snapshot_rates,
            cost,
            price,
            use_gas,
            summary,
        } => {
            let reward_override = match rewards {
                Some(path) => {
                    let path = expand_path(&path);
                    let content = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading rewards {}", path.display()))?;
                    Some(serde_json::from_str::<Vec<f64>>(&content)?)
                }
                None => None,
            };

            let forecaster = Forecaster::new(config, Sources::from_dataset(dataset))?;
            let request = AmortizationRequest {
                power_per_day,
                total_power,
                init_power,
                start_date: start,
                horizon,
                luck_v: luck,
                increase_power_per_day: increase_pib.map(pib_to_bytes),
                reward_override,
                pledge_override: pledge,
                use_snapshot_rates: snapshot_rates,
                cost,
                price,
                use_gas,
                must_refresh: true,
            };
            let amortization = forecaster.simulate_amortization(&request, as_of)?;
            if summary {
                print_json(&amortization.summary)?;
            } else {
                print_json(&amortization)?;
            }
        }

        Commands::Luck { date } => {
            let expected = config.protocol.expected_wins_per_height;
            let window = date.map_or(LuckWindow::Live, LuckWindow::Day);
            let estimate = LuckEstimator::new(&dataset, expected).estimate(window)?;
            print_json(&estimate)?;
        }

        Commands::Config => {}
    }

    Ok(())
}
