use crate::engine::{run_backtest, BacktestParams};
use crate::market_data::MarketData;
use crate::persistence::{JsonlStore, PersistencePort};
use anyhow::Result;
use log::info;
use std::path::Path;

pub fn run(data_file: &Path, params: &BacktestParams, output_dir: Option<&Path>) -> Result<()> {
    let data = MarketData::load_from_file(data_file)?;

    let mut store = match output_dir {
        Some(dir) => Some(JsonlStore::new(dir)?),
        None => None,
    };
    let recorder = store
        .as_mut()
        .map(|s| s as &mut dyn PersistencePort);

    let result = run_backtest(&data, params, recorder)?;

    info!(
        "Result {}: final value {:.2} ({:+.2}% total, {:+.2}% annualized)",
        result.id,
        result.final_value,
        result.performance.total_return * 100.0,
        result.performance.annualized_return * 100.0
    );
    info!(
        "Sharpe {:.2}, Calmar {:.2}, max drawdown {:.2}%, win rate {:.0}%, profit factor {:.2}",
        result.performance.sharpe_ratio,
        result.performance.calmar_ratio,
        result.performance.max_drawdown * 100.0,
        result.performance.win_rate * 100.0,
        result.performance.profit_factor
    );
    info!(
        "{} weeks processed, {} trades, {} signals recorded",
        result.weeks_processed,
        result.trades.len(),
        result.signals.len()
    );
    if let Some(dir) = output_dir {
        info!("Artifacts written to {}", dir.display());
    }

    Ok(())
}
