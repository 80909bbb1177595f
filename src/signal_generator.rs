use crate::errors::SimulationError;
use crate::models::{Candle, SignalAction, SignalSummary};
use crate::strategy::Strategy;
use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use log::warn;
use std::collections::BTreeMap;

/// Raw signals for one analysis date: one action per ticker plus the
/// distribution summary logged each cycle.
#[derive(Debug, Clone)]
pub struct SignalBatch {
    pub actions: BTreeMap<String, SignalAction>,
    pub summary: SignalSummary,
}

/// Applies a strategy to per-ticker history truncated at the analysis
/// date and extracts one categorical signal per ticker.
///
/// Any input row dated after `analysis_date` is a caller bug and is
/// rejected outright: letting it through would leak future information
/// into the backtest. A strategy failure on one ticker defaults that
/// ticker to HOLD and never aborts the batch.
pub fn generate(
    strategy: &(dyn Strategy + Send + Sync),
    history: &BTreeMap<&str, &[Candle]>,
    analysis_date: NaiveDate,
) -> Result<SignalBatch> {
    for (ticker, candles) in history {
        if let Some(candle) = candles.iter().find(|c| c.date > analysis_date) {
            return Err(anyhow!(
                "History for {} contains {} which is after the analysis date {}",
                ticker,
                candle.date,
                analysis_date
            ));
        }
    }

    let mut actions = BTreeMap::new();
    let mut summary = SignalSummary::default();

    for (ticker, candles) in history {
        if candles.is_empty() {
            continue;
        }

        let mut sorted: Vec<&Candle> = candles.iter().collect();
        sorted.sort_by(|a, b| a.date.cmp(&b.date));
        let owned: Vec<Candle> = sorted.into_iter().cloned().collect();

        let action = match strategy.annotate(&owned) {
            Ok(column) => column
                .iter()
                .rev()
                .find_map(|value| *value)
                .map(SignalAction::from_numeric)
                .unwrap_or(SignalAction::Hold),
            Err(err) => {
                let isolated = SimulationError::Strategy {
                    ticker: (*ticker).to_string(),
                    message: err.to_string(),
                };
                warn!("{}; defaulting to hold", isolated);
                SignalAction::Hold
            }
        };

        summary.count(action);
        actions.insert((*ticker).to_string(), action);
    }

    Ok(SignalBatch { actions, summary })
}
