use crate::models::Candle;

/// Simple moving average. Entries before the window fills are NaN so a
/// consumer can tell warm-up values from real ones.
pub fn calculate_sma(prices: &[f64], period: usize) -> Vec<f64> {
    let mut sma_values = vec![f64::NAN; prices.len()];
    if period == 0 || prices.len() < period {
        return sma_values;
    }

    let mut window_sum: f64 = prices[..period].iter().sum();
    sma_values[period - 1] = window_sum / period as f64;
    for i in period..prices.len() {
        window_sum += prices[i] - prices[i - period];
        sma_values[i] = window_sum / period as f64;
    }

    sma_values
}

/// RSI over rolling mean gain/loss. NaN until the window fills.
pub fn calculate_rsi(prices: &[f64], period: usize) -> Vec<f64> {
    let n = prices.len();
    let mut rsi_values = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return rsi_values;
    }

    let mut gains = vec![0.0; n];
    let mut losses = vec![0.0; n];
    for i in 1..n {
        let delta = prices[i] - prices[i - 1];
        if delta > 0.0 {
            gains[i] = delta;
        } else {
            losses[i] = -delta;
        }
    }

    for i in period..n {
        let window_start = i + 1 - period;
        let avg_gain: f64 = gains[window_start..=i].iter().sum::<f64>() / period as f64;
        let avg_loss: f64 = losses[window_start..=i].iter().sum::<f64>() / period as f64;
        rsi_values[i] = if avg_loss == 0.0 {
            100.0
        } else {
            let rs = avg_gain / avg_loss;
            100.0 - (100.0 / (1.0 + rs))
        };
    }

    rsi_values
}

/// Highest close over the trailing `period` bars ending at each index.
pub fn rolling_max(prices: &[f64], period: usize) -> Vec<f64> {
    rolling_extreme(prices, period, f64::max)
}

/// Lowest close over the trailing `period` bars ending at each index.
pub fn rolling_min(prices: &[f64], period: usize) -> Vec<f64> {
    rolling_extreme(prices, period, f64::min)
}

fn rolling_extreme(prices: &[f64], period: usize, pick: fn(f64, f64) -> f64) -> Vec<f64> {
    let mut values = vec![f64::NAN; prices.len()];
    if period == 0 || prices.len() < period {
        return values;
    }
    for i in (period - 1)..prices.len() {
        let window = &prices[i + 1 - period..=i];
        values[i] = window.iter().copied().fold(window[0], pick);
    }
    values
}

/// ATR at the last candle of the series: the rolling mean of true range
/// over up to `period` bars. Returns `None` when fewer than two candles
/// are available or the result is not a usable positive number.
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    if candles.len() < 2 || period == 0 {
        return None;
    }

    let mut true_ranges = Vec::with_capacity(candles.len() - 1);
    let mut prev_close = candles[0].close;
    for candle in &candles[1..] {
        let high_low = candle.high - candle.low;
        let high_prev = (candle.high - prev_close).abs();
        let low_prev = (candle.low - prev_close).abs();
        true_ranges.push(high_low.max(high_prev).max(low_prev));
        prev_close = candle.close;
    }

    let window = true_ranges.len().min(period);
    let sum: f64 = true_ranges[true_ranges.len() - window..].iter().sum();
    let atr = sum / window as f64;
    if atr.is_finite() && atr > 0.0 {
        Some(atr)
    } else {
        None
    }
}
