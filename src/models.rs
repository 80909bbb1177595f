use anyhow::{anyhow, Result as AnyResult};
use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume_shares: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "buy",
            TradeAction::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl SignalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalAction::Buy => "buy",
            SignalAction::Sell => "sell",
            SignalAction::Hold => "hold",
        }
    }

    /// Maps a strategy's numeric signal column value onto an action.
    pub fn from_numeric(value: i8) -> Self {
        match value {
            1 => SignalAction::Buy,
            -1 => SignalAction::Sell,
            _ => SignalAction::Hold,
        }
    }
}

impl FromStr for SignalAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Ok(SignalAction::Buy),
            "sell" => Ok(SignalAction::Sell),
            "hold" => Ok(SignalAction::Hold),
            other => Err(anyhow!("Unknown signal action '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    FirstTarget,
    Breakeven,
    StrategySignal,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::FirstTarget => "first_target",
            ExitReason::Breakeven => "breakeven",
            ExitReason::StrategySignal => "strategy_signal",
        }
    }
}

/// One executed trade in the ledger. Append-only, never mutated once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub date: NaiveDate,
    pub ticker: String,
    pub action: TradeAction,
    pub quantity: i32,
    pub price: f64,
    pub commission: f64,
    pub reason: Option<String>,
    /// Realized PnL against the position's average cost; only set on sells.
    pub pnl: Option<f64>,
}

/// A raw strategy signal for one ticker at one analysis date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub ticker: String,
    pub date: NaiveDate,
    pub action: SignalAction,
    pub price: f64,
    pub atr: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SignalSummary {
    pub buy: usize,
    pub sell: usize,
    pub hold: usize,
}

impl SignalSummary {
    pub fn count(&mut self, action: SignalAction) {
        match action {
            SignalAction::Buy => self.buy += 1,
            SignalAction::Sell => self.sell += 1,
            SignalAction::Hold => self.hold += 1,
        }
    }
}

/// Portfolio valuation recorded once per execution date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquitySnapshot {
    pub date: NaiveDate,
    pub cash: f64,
    pub positions_value: f64,
    pub total_value: f64,
    pub position_count: i32,
}

/// A sized, risk-bounded order ready for execution against the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Order {
    Buy {
        ticker: String,
        quantity: i32,
        price: f64,
        stop_loss: Option<f64>,
        first_target: Option<f64>,
        entry_atr: Option<f64>,
    },
    Sell {
        ticker: String,
        quantity: i32,
        price: f64,
        reason: ExitReason,
    },
}

impl Order {
    pub fn ticker(&self) -> &str {
        match self {
            Order::Buy { ticker, .. } => ticker,
            Order::Sell { ticker, .. } => ticker,
        }
    }
}

/// A candidate that failed validation, with the reason kept for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRejection {
    pub ticker: String,
    pub action: SignalAction,
    pub reason: String,
}

/// Orders for one execution cycle. Sells are always applied before buys.
#[derive(Debug, Clone, Default)]
pub struct OrderPlan {
    pub sells: Vec<Order>,
    pub buys: Vec<Order>,
    pub rejections: Vec<OrderRejection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub total_return: f64,
    pub annualized_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub calmar_ratio: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub total_sells: i32,
    pub winning_sells: i32,
    pub losing_sells: i32,
    pub days: i64,
}

/// Parses a JSON object into a numeric parameter map. Non-numeric values
/// are skipped with a warning rather than failing the whole map.
pub fn parse_parameter_map_from_json(json: &str) -> AnyResult<HashMap<String, f64>> {
    let raw: HashMap<String, Value> =
        serde_json::from_str(json).map_err(|error| anyhow!("Invalid parameter JSON: {}", error))?;

    let mut cleaned = HashMap::with_capacity(raw.len());
    for (key, value) in raw.into_iter() {
        if let Some(num) = value.as_f64() {
            if num.is_finite() {
                cleaned.insert(key, num);
            } else {
                warn!(
                    "Skipping parameter `{}` due to non-finite numeric value {}",
                    key, value
                );
            }
            continue;
        }
        if let Some(boolean) = value.as_bool() {
            cleaned.insert(key, if boolean { 1.0 } else { 0.0 });
            continue;
        }
        warn!(
            "Skipping parameter `{}` due to non-numeric value {}",
            key, value
        );
    }

    Ok(cleaned)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub id: String,
    pub strategy: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub final_value: f64,
    pub weeks_processed: u32,
    pub performance: PerformanceSummary,
    pub equity_curve: Vec<EquitySnapshot>,
    pub trades: Vec<Trade>,
    pub signals: Vec<Signal>,
    pub tickers: Vec<String>,
}
