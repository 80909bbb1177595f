use crate::market_data::sample_universe;
use anyhow::Result;
use chrono::NaiveDate;
use log::info;
use std::path::Path;

pub fn run(output_path: &Path, start: NaiveDate, end: NaiveDate) -> Result<()> {
    info!(
        "Generating sample market data from {} to {} at {}",
        start,
        end,
        output_path.display()
    );

    let data = sample_universe(start, end);
    data.save_to_file(output_path)?;

    info!(
        "Sample universe written: {} tickers, {} trading days",
        data.tickers().len(),
        data.unique_dates().len()
    );
    Ok(())
}
