use crate::models::Candle;
use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

const MARKET_DATA_SNAPSHOT_VERSION: u32 = 1;

/// Read access to historical daily bars. The engine fetches one batch per
/// cycle through this port and never goes back per ticker.
pub trait MarketDataPort {
    /// Rows ordered ascending by (ticker, date), inclusive date bounds.
    fn history(&self, tickers: &[String], start: NaiveDate, end: NaiveDate) -> Result<Vec<Candle>>;
}

/// In-memory universe of daily candles, grouped per ticker and sorted by
/// date. Loaded once per run; all slicing afterwards is in memory.
#[derive(Debug, Clone, Default)]
pub struct MarketData {
    candles_by_ticker: BTreeMap<String, Vec<Candle>>,
    unique_dates: Vec<NaiveDate>,
}

impl MarketData {
    pub fn from_candles(candles: Vec<Candle>) -> Self {
        let mut candles_by_ticker: BTreeMap<String, Vec<Candle>> = BTreeMap::new();
        for candle in candles {
            candles_by_ticker
                .entry(candle.ticker.clone())
                .or_default()
                .push(candle);
        }
        let mut unique_dates: Vec<NaiveDate> = Vec::new();
        for series in candles_by_ticker.values_mut() {
            series.sort_by(|a, b| a.date.cmp(&b.date));
            series.dedup_by(|a, b| a.date == b.date);
            unique_dates.extend(series.iter().map(|c| c.date));
        }
        unique_dates.sort();
        unique_dates.dedup();

        Self {
            candles_by_ticker,
            unique_dates,
        }
    }

    pub fn has_data(&self) -> bool {
        !self.unique_dates.is_empty()
    }

    pub fn tickers(&self) -> Vec<String> {
        self.candles_by_ticker.keys().cloned().collect()
    }

    pub fn unique_dates(&self) -> &[NaiveDate] {
        &self.unique_dates
    }

    pub fn series(&self, ticker: &str) -> Option<&[Candle]> {
        self.candles_by_ticker.get(ticker).map(|v| v.as_slice())
    }

    /// Per-ticker slices truncated to `date` (inclusive). One call per
    /// cycle feeds both signal generation and order validation.
    pub fn slices_up_to(&self, date: NaiveDate) -> BTreeMap<&str, &[Candle]> {
        let mut slices = BTreeMap::new();
        for (ticker, series) in &self.candles_by_ticker {
            let end = series.partition_point(|c| c.date <= date);
            if end > 0 {
                slices.insert(ticker.as_str(), &series[..end]);
            }
        }
        slices
    }

    pub fn candle_on(&self, ticker: &str, date: NaiveDate) -> Option<&Candle> {
        let series = self.candles_by_ticker.get(ticker)?;
        series
            .binary_search_by(|c| c.date.cmp(&date))
            .ok()
            .map(|index| &series[index])
    }

    pub fn restrict_to_tickers(self, allowed: &[String]) -> Self {
        let candles = self
            .candles_by_ticker
            .into_iter()
            .filter(|(ticker, _)| allowed.iter().any(|t| t == ticker))
            .flat_map(|(_, series)| series)
            .collect();
        Self::from_candles(candles)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).with_context(|| {
            format!(
                "Failed to open market data snapshot {}",
                path.as_ref().display()
            )
        })?;
        let snapshot: MarketDataSnapshot = bincode::deserialize_from(BufReader::new(file))
            .context("Failed to decode market data snapshot")?;
        if snapshot.version != MARKET_DATA_SNAPSHOT_VERSION {
            return Err(anyhow!(
                "Unsupported snapshot version {} (expected {})",
                snapshot.version,
                MARKET_DATA_SNAPSHOT_VERSION
            ));
        }
        let data = Self::from_candles(snapshot.candles);
        info!(
            "Loaded market data for {} tickers across {} dates",
            data.candles_by_ticker.len(),
            data.unique_dates.len()
        );
        Ok(data)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let candles: Vec<Candle> = self
            .candles_by_ticker
            .values()
            .flat_map(|series| series.iter().cloned())
            .collect();
        let snapshot = MarketDataSnapshot {
            version: MARKET_DATA_SNAPSHOT_VERSION,
            candles,
        };
        let file = File::create(path.as_ref()).with_context(|| {
            format!(
                "Failed to create market data snapshot {}",
                path.as_ref().display()
            )
        })?;
        bincode::serialize_into(BufWriter::new(file), &snapshot)
            .context("Failed to encode market data snapshot")?;
        Ok(())
    }
}

impl MarketDataPort for MarketData {
    fn history(&self, tickers: &[String], start: NaiveDate, end: NaiveDate) -> Result<Vec<Candle>> {
        let mut rows = Vec::new();
        for ticker in tickers {
            if let Some(series) = self.candles_by_ticker.get(ticker) {
                let from = series.partition_point(|c| c.date < start);
                let to = series.partition_point(|c| c.date <= end);
                rows.extend(series[from..to].iter().cloned());
            }
        }
        rows.sort_by(|a, b| (a.ticker.as_str(), a.date).cmp(&(b.ticker.as_str(), b.date)));
        Ok(rows)
    }
}

#[derive(Serialize, Deserialize)]
struct MarketDataSnapshot {
    version: u32,
    candles: Vec<Candle>,
}

/// Deterministic synthetic universe so runs work without any external
/// data source. Weekday bars only; each ticker follows a drift plus a
/// fixed-period oscillation.
pub fn sample_universe(start: NaiveDate, end: NaiveDate) -> MarketData {
    const PROFILES: [(&str, f64, f64, f64); 4] = [
        ("ALFA", 100.0, 0.08, 4.0),
        ("BRAVO", 55.0, 0.04, 6.0),
        ("CHARLIE", 210.0, -0.02, 9.0),
        ("DELTA", 32.0, 0.12, 2.5),
    ];

    let mut candles = Vec::new();
    for (ticker, base, drift_per_day, swing) in PROFILES {
        let mut day_index = 0i64;
        let mut date = start;
        while date <= end {
            if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                let trend = base + drift_per_day * day_index as f64;
                let phase = (day_index as f64 / 17.0).sin();
                let close = (trend + swing * phase).max(1.0);
                let open = (trend + swing * ((day_index - 1) as f64 / 17.0).sin()).max(1.0);
                let high = close.max(open) + swing * 0.25;
                let low = (close.min(open) - swing * 0.25).max(0.5);
                candles.push(Candle {
                    ticker: ticker.to_string(),
                    date,
                    open,
                    high,
                    low,
                    close,
                    volume_shares: 250_000 + (day_index % 11) * 10_000,
                });
                day_index += 1;
            }
            date += Duration::days(1);
        }
    }

    MarketData::from_candles(candles)
}
