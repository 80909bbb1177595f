use anyhow::Result;
use backtester::commands::{export_sample_data, list_strategies, run_backtest};
use backtester::config::RiskConfig;
use backtester::engine::BacktestParams;
use backtester::models::parse_parameter_map_from_json;
use backtester::sizing::SizingPolicyKind;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use std::str::FromStr;

const DEFAULT_MARKET_DATA_FILE: &str = "market-data.bin";

#[derive(Parser)]
#[command(name = "backtester")]
#[command(about = "A weekly trading simulation and risk-managed order engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a weekly backtest for one strategy over a date range
    RunBacktest {
        /// Strategy name from the registry (see list-strategies)
        strategy: String,
        /// Backtest start date (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,
        /// Backtest end date (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,
        /// Comma separated list of tickers to include
        #[arg(long, value_delimiter = ',', num_args = 1..)]
        tickers: Vec<String>,
        /// Starting cash
        #[arg(long, default_value_t = 10_000.0)]
        initial_capital: f64,
        /// Commission rate applied to both sides of a trade
        #[arg(long, default_value_t = 0.0)]
        commission_rate: f64,
        /// Sizing policy: risk-managed or equal-weight
        #[arg(long, default_value = "risk-managed")]
        sizing: String,
        /// Strategy parameters as a JSON object, e.g. '{"shortWindow": 3}'
        #[arg(long)]
        strategy_params: Option<String>,
        /// Risk parameters as a JSON object, e.g. '{"maxPositions": 5}'
        #[arg(long)]
        risk_params: Option<String>,
        /// Path to the market data snapshot file
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: Option<PathBuf>,
        /// Directory for JSONL artifacts (trades, snapshots, portfolios)
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
        /// Portfolio name used in persisted records
        #[arg(long, default_value = "backtest")]
        portfolio_name: String,
    },
    /// List registered strategies and their parameters
    ListStrategies,
    /// Write a deterministic synthetic market data snapshot for offline runs
    ExportSampleData {
        /// Destination file for the snapshot
        #[arg(short, long = "output", value_name = "PATH")]
        output: Option<PathBuf>,
        /// First calendar date of the sample range (YYYY-MM-DD)
        #[arg(long, default_value = "2022-01-03")]
        start: NaiveDate,
        /// Last calendar date of the sample range (YYYY-MM-DD)
        #[arg(long, default_value = "2023-12-29")]
        end: NaiveDate,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::RunBacktest {
            strategy,
            start,
            end,
            tickers,
            initial_capital,
            commission_rate,
            sizing,
            strategy_params,
            risk_params,
            data_file,
            output,
            portfolio_name,
        } => {
            let strategy_params = match strategy_params.as_deref() {
                Some(json) => parse_parameter_map_from_json(json)?,
                None => Default::default(),
            };
            let mut risk_parameters = match risk_params.as_deref() {
                Some(json) => parse_parameter_map_from_json(json)?,
                None => Default::default(),
            };
            risk_parameters.insert("commissionRate".to_string(), commission_rate);
            let config = RiskConfig::from_parameters(&risk_parameters)?;

            let params = BacktestParams {
                strategy_name: strategy,
                strategy_params,
                start_date: start,
                end_date: end,
                tickers,
                initial_capital,
                sizing: SizingPolicyKind::from_str(&sizing)?,
                config,
                portfolio_name,
            };

            info!("Not financial advice. Simulated results only.");
            let data_path = data_file.unwrap_or_else(|| PathBuf::from(DEFAULT_MARKET_DATA_FILE));
            run_backtest::run(&data_path, &params, output.as_deref())?;
        }
        Commands::ListStrategies => {
            list_strategies::run()?;
        }
        Commands::ExportSampleData { output, start, end } => {
            let output_path = output.unwrap_or_else(|| PathBuf::from(DEFAULT_MARKET_DATA_FILE));
            export_sample_data::run(&output_path, start, end)?;
        }
    }

    Ok(())
}
