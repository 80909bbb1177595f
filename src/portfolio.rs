use crate::errors::SimulationError;
use crate::models::{ExitReason, Trade, TradeAction};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const PRICE_EPSILON: f64 = 1e-6;

/// One open holding. While a 2-for-1 sequence is live the invariant
/// `stop_loss <= avg_cost <= first_target` holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    pub shares: i32,
    pub avg_cost: f64,
    pub current_price: f64,
    pub stop_loss: Option<f64>,
    pub first_target: Option<f64>,
    pub breakeven: Option<f64>,
    pub first_half_sold: bool,
    pub entry_atr: Option<f64>,
    pub opened_at: NaiveDate,
}

impl Position {
    pub fn current_value(&self) -> f64 {
        self.shares as f64 * self.current_price
    }

    pub fn unrealized_pnl(&self) -> f64 {
        (self.current_price - self.avg_cost) * self.shares as f64
    }

    pub fn unrealized_pnl_pct(&self) -> f64 {
        if self.avg_cost == 0.0 {
            return 0.0;
        }
        (self.current_price - self.avg_cost) / self.avg_cost * 100.0
    }

    /// Value that would be lost if the stop filled exactly. Without a
    /// stop the whole position is exposed.
    pub fn capital_at_risk(&self) -> f64 {
        match self.stop_loss {
            Some(stop) => (self.current_value() - stop * self.shares as f64).max(0.0),
            None => self.current_value(),
        }
    }

    pub fn days_held(&self, as_of: NaiveDate) -> i64 {
        (as_of - self.opened_at).num_days().max(0)
    }

    pub fn is_stop_hit(&self, price: f64) -> bool {
        self.stop_loss
            .map(|stop| price <= stop + PRICE_EPSILON)
            .unwrap_or(false)
    }

    pub fn is_first_target_hit(&self, price: f64) -> bool {
        self.first_target
            .map(|target| price >= target - PRICE_EPSILON)
            .unwrap_or(false)
    }

    pub fn is_breakeven_hit(&self, price: f64) -> bool {
        self.breakeven
            .map(|level| price <= level + PRICE_EPSILON)
            .unwrap_or(false)
    }
}

/// Arguments for one ledger transition.
#[derive(Debug, Clone)]
pub struct TradeRequest {
    pub date: NaiveDate,
    pub ticker: String,
    pub action: TradeAction,
    pub quantity: i32,
    pub price: f64,
    pub reason: Option<ExitReason>,
    pub stop_loss: Option<f64>,
    pub first_target: Option<f64>,
    pub entry_atr: Option<f64>,
}

/// The ledger: cash, open positions and the append-only trade log.
/// Mutated only through `execute_trade`; `total_value` and the position
/// count are recomputed before every call returns.
#[derive(Debug, Clone)]
pub struct Portfolio {
    name: String,
    valuation_date: NaiveDate,
    cash: f64,
    total_value: f64,
    commission_rate: f64,
    positions: BTreeMap<String, Position>,
    trades: Vec<Trade>,
}

impl Portfolio {
    pub fn new(
        name: impl Into<String>,
        date: NaiveDate,
        initial_cash: f64,
        commission_rate: f64,
    ) -> Self {
        Self {
            name: name.into(),
            valuation_date: date,
            cash: initial_cash,
            total_value: initial_cash,
            commission_rate,
            positions: BTreeMap::new(),
            trades: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn valuation_date(&self) -> NaiveDate {
        self.valuation_date
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn total_value(&self) -> f64 {
        self.total_value
    }

    pub fn positions_value(&self) -> f64 {
        self.positions.values().map(|p| p.current_value()).sum()
    }

    pub fn position_count(&self) -> i32 {
        self.positions.len() as i32
    }

    pub fn position(&self, ticker: &str) -> Option<&Position> {
        self.positions.get(ticker)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Marks an open position to the latest known price and refreshes the
    /// valuation date and total value.
    pub fn update_price(&mut self, ticker: &str, price: f64, date: NaiveDate) {
        if let Some(position) = self.positions.get_mut(ticker) {
            position.current_price = price;
        }
        self.valuation_date = date;
        self.recompute_total_value();
    }

    pub fn execute_trade(&mut self, request: TradeRequest) -> Result<&Trade, SimulationError> {
        match request.action {
            TradeAction::Buy => self.execute_buy(request),
            TradeAction::Sell => self.execute_sell(request),
        }
    }

    fn execute_buy(&mut self, request: TradeRequest) -> Result<&Trade, SimulationError> {
        let gross = request.quantity as f64 * request.price;
        let commission = gross * self.commission_rate;
        let total_cost = gross + commission;
        if total_cost > self.cash + PRICE_EPSILON {
            return Err(SimulationError::InsufficientCash {
                required: total_cost,
                available: self.cash,
            });
        }

        self.cash -= total_cost;

        match self.positions.get_mut(&request.ticker) {
            Some(position) => {
                let new_shares = position.shares + request.quantity;
                position.avg_cost = (position.shares as f64 * position.avg_cost
                    + request.quantity as f64 * request.price)
                    / new_shares as f64;
                position.shares = new_shares;
                position.current_price = request.price;
                if request.stop_loss.is_some() {
                    position.stop_loss = request.stop_loss;
                }
                if request.first_target.is_some() {
                    position.first_target = request.first_target;
                    position.breakeven = Some(request.price);
                }
                if request.entry_atr.is_some() {
                    position.entry_atr = request.entry_atr;
                }
            }
            None => {
                self.positions.insert(
                    request.ticker.clone(),
                    Position {
                        ticker: request.ticker.clone(),
                        shares: request.quantity,
                        avg_cost: request.price,
                        current_price: request.price,
                        stop_loss: request.stop_loss,
                        first_target: request.first_target,
                        breakeven: request.first_target.map(|_| request.price),
                        first_half_sold: false,
                        entry_atr: request.entry_atr,
                        opened_at: request.date,
                    },
                );
            }
        }

        self.record_trade(request, commission, None)
    }

    fn execute_sell(&mut self, request: TradeRequest) -> Result<&Trade, SimulationError> {
        let held = self
            .positions
            .get(&request.ticker)
            .map(|p| p.shares)
            .unwrap_or(0);
        if request.quantity > held {
            return Err(SimulationError::InsufficientShares {
                ticker: request.ticker,
                requested: request.quantity,
                held,
            });
        }

        let gross = request.quantity as f64 * request.price;
        let commission = gross * self.commission_rate;
        let net_proceeds = gross - commission;
        self.cash += net_proceeds;

        let position = self
            .positions
            .get_mut(&request.ticker)
            .expect("share count was checked above");
        let pnl = net_proceeds - request.quantity as f64 * position.avg_cost;
        position.shares -= request.quantity;
        position.current_price = request.price;

        if position.shares == 0 {
            self.positions.remove(&request.ticker);
        } else if request.reason == Some(ExitReason::FirstTarget) {
            // 2-for-1: half the position is banked, the remainder rides
            // with the stop moved to breakeven at the average cost.
            position.first_half_sold = true;
            position.stop_loss = Some(position.avg_cost);
            position.breakeven = Some(position.avg_cost);
        }

        self.record_trade(request, commission, Some(pnl))
    }

    fn record_trade(
        &mut self,
        request: TradeRequest,
        commission: f64,
        pnl: Option<f64>,
    ) -> Result<&Trade, SimulationError> {
        self.valuation_date = request.date;
        self.recompute_total_value();
        self.trades.push(Trade {
            date: request.date,
            ticker: request.ticker,
            action: request.action,
            quantity: request.quantity,
            price: request.price,
            commission,
            reason: request.reason.map(|r| r.as_str().to_string()),
            pnl,
        });
        Ok(self.trades.last().expect("trade was just pushed"))
    }

    fn recompute_total_value(&mut self) {
        self.total_value = self.cash + self.positions_value();
    }

    pub fn to_state(&self) -> PortfolioState {
        PortfolioState {
            name: self.name.clone(),
            date: self.valuation_date,
            cash: self.cash,
            total_value: self.total_value,
            positions: self.positions.values().cloned().collect(),
        }
    }

    pub fn from_state(state: PortfolioState, commission_rate: f64) -> Self {
        let positions: BTreeMap<String, Position> = state
            .positions
            .into_iter()
            .map(|p| (p.ticker.clone(), p))
            .collect();
        let mut portfolio = Self {
            name: state.name,
            valuation_date: state.date,
            cash: state.cash,
            total_value: state.total_value,
            commission_rate,
            positions,
            trades: Vec::new(),
        };
        portfolio.recompute_total_value();
        portfolio
    }
}

/// Serializable portfolio snapshot exchanged through the persistence port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioState {
    pub name: String,
    pub date: NaiveDate,
    pub cash: f64,
    pub total_value: f64,
    pub positions: Vec<Position>,
}
