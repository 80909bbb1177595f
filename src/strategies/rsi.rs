use crate::indicators::calculate_rsi;
use crate::models::Candle;
use crate::param_utils::{get_param_clamped, get_usize_param_min};
use anyhow::Result;
use std::collections::HashMap;

pub struct RsiStrategy {
    period: usize,
    overbought: f64,
    oversold: f64,
}

impl RsiStrategy {
    pub fn new(parameters: HashMap<String, f64>) -> Self {
        let period = get_usize_param_min(&parameters, "period", 14, 2);
        let overbought = get_param_clamped(&parameters, "overbought", 70.0, 50.0, 100.0);
        let oversold = get_param_clamped(&parameters, "oversold", 30.0, 0.0, 50.0);
        Self {
            period,
            overbought,
            oversold,
        }
    }
}

impl super::Strategy for RsiStrategy {
    fn name(&self) -> &str {
        "rsi"
    }

    fn annotate(&self, candles: &[Candle]) -> Result<Vec<Option<i8>>> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let rsi = calculate_rsi(&closes, self.period);

        let signals = rsi
            .iter()
            .map(|&value| {
                if value.is_nan() {
                    None
                } else if value < self.oversold {
                    Some(1)
                } else if value > self.overbought {
                    Some(-1)
                } else {
                    Some(0)
                }
            })
            .collect();
        Ok(signals)
    }

    fn min_data_points(&self) -> usize {
        self.period + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Strategy;
    use chrono::NaiveDate;

    fn candles(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                ticker: "T".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume_shares: 1_000,
            })
            .collect()
    }

    #[test]
    fn sustained_rally_reads_overbought() {
        let strategy = RsiStrategy::new(HashMap::new());
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let signals = strategy.annotate(&candles(&closes)).unwrap();
        assert_eq!(signals.last().copied().flatten(), Some(-1));
    }

    #[test]
    fn sustained_selloff_reads_oversold() {
        let strategy = RsiStrategy::new(HashMap::new());
        let closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        let signals = strategy.annotate(&candles(&closes)).unwrap();
        assert_eq!(signals.last().copied().flatten(), Some(1));
    }

    #[test]
    fn warm_up_bars_have_no_signal() {
        let strategy = RsiStrategy::new(HashMap::new());
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let signals = strategy.annotate(&candles(&closes)).unwrap();
        assert!(signals[13].is_none());
        assert!(signals[14].is_some());
    }
}
