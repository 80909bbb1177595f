use crate::indicators::{rolling_max, rolling_min};
use crate::models::Candle;
use crate::param_utils::get_usize_param_min;
use anyhow::Result;
use std::collections::HashMap;

pub struct BreakoutStrategy {
    lookback: usize,
}

impl BreakoutStrategy {
    pub fn new(parameters: HashMap<String, f64>) -> Self {
        let lookback = get_usize_param_min(&parameters, "lookback", 20, 2);
        Self { lookback }
    }
}

impl super::Strategy for BreakoutStrategy {
    fn name(&self) -> &str {
        "breakout"
    }

    fn annotate(&self, candles: &[Candle]) -> Result<Vec<Option<i8>>> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        // Channel from the bars preceding each close; a close compared
        // against a window containing itself could never break out.
        let highs = rolling_max(&closes, self.lookback);
        let lows = rolling_min(&closes, self.lookback);

        let signals = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                if i == 0 {
                    return None;
                }
                let prior_high = highs[i - 1];
                let prior_low = lows[i - 1];
                if prior_high.is_nan() || prior_low.is_nan() {
                    None
                } else if close > prior_high {
                    Some(1)
                } else if close < prior_low {
                    Some(-1)
                } else {
                    Some(0)
                }
            })
            .collect();
        Ok(signals)
    }

    fn min_data_points(&self) -> usize {
        self.lookback + 1
    }
}
