use crate::indicators::calculate_sma;
use crate::models::Candle;
use crate::param_utils::get_usize_param_min;
use anyhow::Result;
use std::collections::HashMap;

pub struct MovingAverageCrossoverStrategy {
    short_window: usize,
    long_window: usize,
}

impl MovingAverageCrossoverStrategy {
    pub fn new(parameters: HashMap<String, f64>) -> Self {
        let short_window = get_usize_param_min(&parameters, "shortWindow", 3, 1);
        let long_window =
            get_usize_param_min(&parameters, "longWindow", 5, 1).max(short_window + 1);
        Self {
            short_window,
            long_window,
        }
    }
}

impl super::Strategy for MovingAverageCrossoverStrategy {
    fn name(&self) -> &str {
        "ma_crossover"
    }

    fn annotate(&self, candles: &[Candle]) -> Result<Vec<Option<i8>>> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let short = calculate_sma(&closes, self.short_window);
        let long = calculate_sma(&closes, self.long_window);

        let signals = closes
            .iter()
            .enumerate()
            .map(|(i, _)| {
                if short[i].is_nan() || long[i].is_nan() {
                    None
                } else if short[i] > long[i] {
                    Some(1)
                } else if short[i] < long[i] {
                    Some(-1)
                } else {
                    Some(0)
                }
            })
            .collect();
        Ok(signals)
    }

    fn min_data_points(&self) -> usize {
        self.long_window
    }
}
