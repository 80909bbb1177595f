use crate::models::Candle;
use anyhow::Result;
use std::collections::HashMap;

/// A trading strategy annotates a per-ticker candle series with one signal
/// value per bar: 1 = buy, -1 = sell, 0 = hold, `None` during warm-up.
/// The signal generator consumes the last non-null value.
pub trait Strategy {
    fn name(&self) -> &str;
    fn annotate(&self, candles: &[Candle]) -> Result<Vec<Option<i8>>>;
    fn min_data_points(&self) -> usize;
}

#[path = "strategies/ma_crossover.rs"]
pub mod ma_crossover;

pub use ma_crossover::MovingAverageCrossoverStrategy;

#[path = "strategies/rsi.rs"]
pub mod rsi;

pub use rsi::RsiStrategy;

#[path = "strategies/breakout.rs"]
pub mod breakout;

pub use breakout::BreakoutStrategy;

#[derive(Debug, Clone)]
pub struct StrategyParameter {
    pub name: &'static str,
    pub default: f64,
    pub description: &'static str,
}

#[derive(Debug, Clone)]
pub struct StrategyTemplate {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Vec<StrategyParameter>,
}

/// The explicit strategy registry. Every runnable strategy is listed here
/// together with the parameters it accepts.
pub fn strategy_templates() -> Vec<StrategyTemplate> {
    vec![
        StrategyTemplate {
            name: "ma_crossover",
            description: "Buys when the short moving average crosses above the long one",
            parameters: vec![
                StrategyParameter {
                    name: "shortWindow",
                    default: 3.0,
                    description: "Short moving average period",
                },
                StrategyParameter {
                    name: "longWindow",
                    default: 5.0,
                    description: "Long moving average period",
                },
            ],
        },
        StrategyTemplate {
            name: "rsi",
            description: "Buys oversold and sells overbought RSI readings",
            parameters: vec![
                StrategyParameter {
                    name: "period",
                    default: 14.0,
                    description: "RSI lookback period",
                },
                StrategyParameter {
                    name: "overbought",
                    default: 70.0,
                    description: "Sell threshold",
                },
                StrategyParameter {
                    name: "oversold",
                    default: 30.0,
                    description: "Buy threshold",
                },
            ],
        },
        StrategyTemplate {
            name: "breakout",
            description: "Trades closes beyond the trailing high/low channel",
            parameters: vec![StrategyParameter {
                name: "lookback",
                default: 20.0,
                description: "Channel lookback period",
            }],
        },
    ]
}

pub fn create_strategy(
    name: &str,
    parameters: HashMap<String, f64>,
) -> Result<Box<dyn Strategy + Send + Sync>> {
    match name {
        "ma_crossover" => Ok(Box::new(MovingAverageCrossoverStrategy::new(parameters))),
        "rsi" => Ok(Box::new(RsiStrategy::new(parameters))),
        "breakout" => Ok(Box::new(BreakoutStrategy::new(parameters))),
        _ => Err(anyhow::anyhow!("Unknown strategy: {}", name)),
    }
}
