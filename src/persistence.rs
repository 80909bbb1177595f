use crate::models::{EquitySnapshot, Trade};
use crate::portfolio::PortfolioState;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

/// Abstract create/read/update surface for run artifacts. The core never
/// depends on a specific storage technology; a run works the same with
/// no store attached at all.
pub trait PersistencePort {
    fn save_trade(&mut self, portfolio: &str, trade: &Trade) -> Result<()>;
    fn save_snapshot(&mut self, portfolio: &str, snapshot: &EquitySnapshot) -> Result<()>;
    fn save_portfolio(&mut self, state: &PortfolioState) -> Result<()>;
    fn load_latest_portfolio(&self, name: &str) -> Result<Option<PortfolioState>>;
}

/// Keeps everything in process memory. Used by tests and short runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub trades: Vec<(String, Trade)>,
    pub snapshots: Vec<(String, EquitySnapshot)>,
    portfolios: HashMap<String, Vec<PortfolioState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistencePort for MemoryStore {
    fn save_trade(&mut self, portfolio: &str, trade: &Trade) -> Result<()> {
        self.trades.push((portfolio.to_string(), trade.clone()));
        Ok(())
    }

    fn save_snapshot(&mut self, portfolio: &str, snapshot: &EquitySnapshot) -> Result<()> {
        self.snapshots
            .push((portfolio.to_string(), snapshot.clone()));
        Ok(())
    }

    fn save_portfolio(&mut self, state: &PortfolioState) -> Result<()> {
        self.portfolios
            .entry(state.name.clone())
            .or_default()
            .push(state.clone());
        Ok(())
    }

    fn load_latest_portfolio(&self, name: &str) -> Result<Option<PortfolioState>> {
        Ok(self
            .portfolios
            .get(name)
            .and_then(|states| states.last().cloned()))
    }
}

#[derive(Serialize, Deserialize)]
struct TaggedRecord<T> {
    portfolio: String,
    record: T,
}

/// Appends one JSON document per line under a target directory:
/// trades.jsonl, snapshots.jsonl and portfolios.jsonl.
pub struct JsonlStore {
    directory: PathBuf,
}

impl JsonlStore {
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)
            .with_context(|| format!("Failed to create output directory {}", directory.display()))?;
        Ok(Self { directory })
    }

    fn append<T: Serialize>(&self, file_name: &str, value: &T) -> Result<()> {
        let path = self.directory.join(file_name);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let line = serde_json::to_string(value)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

impl PersistencePort for JsonlStore {
    fn save_trade(&mut self, portfolio: &str, trade: &Trade) -> Result<()> {
        self.append(
            "trades.jsonl",
            &TaggedRecord {
                portfolio: portfolio.to_string(),
                record: trade.clone(),
            },
        )
    }

    fn save_snapshot(&mut self, portfolio: &str, snapshot: &EquitySnapshot) -> Result<()> {
        self.append(
            "snapshots.jsonl",
            &TaggedRecord {
                portfolio: portfolio.to_string(),
                record: snapshot.clone(),
            },
        )
    }

    fn save_portfolio(&mut self, state: &PortfolioState) -> Result<()> {
        self.append("portfolios.jsonl", state)
    }

    fn load_latest_portfolio(&self, name: &str) -> Result<Option<PortfolioState>> {
        let path = self.directory.join("portfolios.jsonl");
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
        let mut latest = None;
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let state: PortfolioState = serde_json::from_str(&line)
                .with_context(|| format!("Malformed portfolio record in {}", path.display()))?;
            if state.name == name {
                latest = Some(state);
            }
        }
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn state(name: &str, cash: f64) -> PortfolioState {
        PortfolioState {
            name: name.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            cash,
            total_value: cash,
            positions: Vec::new(),
        }
    }

    #[test]
    fn memory_store_returns_latest_state() {
        let mut store = MemoryStore::new();
        store.save_portfolio(&state("demo", 10_000.0)).unwrap();
        store.save_portfolio(&state("demo", 11_000.0)).unwrap();
        store.save_portfolio(&state("other", 5_000.0)).unwrap();

        let latest = store.load_latest_portfolio("demo").unwrap().unwrap();
        assert!((latest.cash - 11_000.0).abs() < 1e-9);
        assert!(store.load_latest_portfolio("missing").unwrap().is_none());
    }

    #[test]
    fn jsonl_store_round_trips_states() {
        let dir = std::env::temp_dir().join(format!(
            "backtester-jsonl-test-{}",
            uuid::Uuid::new_v4()
        ));
        let mut store = JsonlStore::new(&dir).unwrap();
        store.save_portfolio(&state("demo", 10_000.0)).unwrap();
        store.save_portfolio(&state("demo", 12_500.0)).unwrap();

        let latest = store.load_latest_portfolio("demo").unwrap().unwrap();
        assert!((latest.cash - 12_500.0).abs() < 1e-9);

        fs::remove_dir_all(&dir).ok();
    }
}
