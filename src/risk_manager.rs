use crate::config::RiskConfig;
use crate::models::{ExitReason, Order, OrderPlan, OrderRejection, SignalAction};
use crate::portfolio::{Portfolio, Position};
use std::collections::BTreeMap;

/// Execution-date price and volatility for one ticker, batched once per
/// cycle.
#[derive(Debug, Clone, Copy)]
pub struct TickerQuote {
    pub price: f64,
    pub atr: f64,
}

struct EntryCandidate {
    ticker: String,
    quantity: i32,
    price: f64,
    atr: f64,
    stop_loss: f64,
    first_target: f64,
}

/// Turns raw signals into sized, stopped and targeted orders under the
/// configured capital and exposure limits. Exits always take priority
/// over entries: capital protection comes first.
pub struct RiskManager {
    config: RiskConfig,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn validate(
        &self,
        portfolio: &Portfolio,
        signals: &BTreeMap<String, SignalAction>,
        quotes: &BTreeMap<String, TickerQuote>,
    ) -> OrderPlan {
        let mut plan = OrderPlan::default();

        for position in portfolio.positions() {
            let signal = signals
                .get(&position.ticker)
                .copied()
                .unwrap_or(SignalAction::Hold);
            match quotes.get(&position.ticker) {
                Some(quote) => {
                    if let Some(order) = self.exit_order(position, signal, quote.price) {
                        plan.sells.push(order);
                    }
                }
                None => plan.rejections.push(OrderRejection {
                    ticker: position.ticker.clone(),
                    action: signal,
                    reason: "no quote for this cycle".to_string(),
                }),
            }
        }

        let mut candidates: Vec<EntryCandidate> = Vec::new();
        for (ticker, action) in signals {
            if *action != SignalAction::Buy || portfolio.position(ticker).is_some() {
                continue;
            }
            match self.size_entry(portfolio, ticker, quotes.get(ticker)) {
                Ok(candidate) => candidates.push(candidate),
                Err(reason) => plan.rejections.push(OrderRejection {
                    ticker: ticker.clone(),
                    action: *action,
                    reason,
                }),
            }
        }

        // Prefer lower volatility when slots are scarce; ticker breaks ties.
        candidates.sort_by(|a, b| {
            a.atr
                .partial_cmp(&b.atr)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.ticker.cmp(&b.ticker))
        });

        let available_slots =
            (self.config.max_positions - portfolio.position_count()).max(0) as usize;
        for (index, candidate) in candidates.into_iter().enumerate() {
            if index < available_slots {
                plan.buys.push(Order::Buy {
                    ticker: candidate.ticker,
                    quantity: candidate.quantity,
                    price: candidate.price,
                    stop_loss: Some(candidate.stop_loss),
                    first_target: Some(candidate.first_target),
                    entry_atr: Some(candidate.atr),
                });
            } else {
                plan.rejections.push(OrderRejection {
                    ticker: candidate.ticker,
                    action: SignalAction::Buy,
                    reason: format!(
                        "dropped in volatility ranking: only {} slot(s) available",
                        available_slots
                    ),
                });
            }
        }

        plan
    }

    /// The exit chain for one open position. Only the first matching rule
    /// fires; a stop hit short-circuits everything else, including a
    /// simultaneous buy signal.
    fn exit_order(&self, position: &Position, signal: SignalAction, price: f64) -> Option<Order> {
        if position.is_stop_hit(price) {
            return Some(Order::Sell {
                ticker: position.ticker.clone(),
                quantity: position.shares,
                price,
                reason: ExitReason::StopLoss,
            });
        }

        if !position.first_half_sold && position.is_first_target_hit(price) {
            let half = position.shares / 2;
            if half >= 1 {
                return Some(Order::Sell {
                    ticker: position.ticker.clone(),
                    quantity: half,
                    price,
                    reason: ExitReason::FirstTarget,
                });
            }
        }

        if position.first_half_sold && position.is_breakeven_hit(price) {
            return Some(Order::Sell {
                ticker: position.ticker.clone(),
                quantity: position.shares,
                price,
                reason: ExitReason::Breakeven,
            });
        }

        if signal == SignalAction::Sell && !position.first_half_sold {
            return Some(Order::Sell {
                ticker: position.ticker.clone(),
                quantity: position.shares,
                price,
                reason: ExitReason::StrategySignal,
            });
        }

        None
    }

    fn size_entry(
        &self,
        portfolio: &Portfolio,
        ticker: &str,
        quote: Option<&TickerQuote>,
    ) -> Result<EntryCandidate, String> {
        if portfolio.position_count() >= self.config.max_positions {
            return Err(format!(
                "maximum of {} open positions reached",
                self.config.max_positions
            ));
        }

        let quote = quote.ok_or_else(|| "no quote for this cycle".to_string())?;
        if !quote.price.is_finite() || quote.price <= 0.0 {
            return Err(format!("unusable price {}", quote.price));
        }

        let risk_amount = portfolio.total_value() * self.config.risk_pct_per_trade;
        let stop_distance = quote.atr * self.config.atr_multiplier;
        if !stop_distance.is_finite() || stop_distance <= 0.0 {
            return Err(format!("non-positive stop distance {:.4}", stop_distance));
        }

        let quantity = (risk_amount / stop_distance).floor() as i32;
        if quantity < 1 {
            return Err(format!(
                "risk budget {:.2} too small for stop distance {:.4}",
                risk_amount, stop_distance
            ));
        }

        let cost = quantity as f64 * quote.price;
        let spendable = portfolio.cash() * (1.0 - self.config.cash_buffer_pct);
        if cost > spendable {
            return Err(format!(
                "cost {:.2} exceeds spendable cash {:.2} after {:.0}% buffer",
                cost,
                spendable,
                self.config.cash_buffer_pct * 100.0
            ));
        }

        let weight_pct = cost / portfolio.total_value() * 100.0;
        if weight_pct > self.config.max_single_position_pct {
            return Err(format!(
                "position weight {:.1}% exceeds limit {:.1}%",
                weight_pct, self.config.max_single_position_pct
            ));
        }

        Ok(EntryCandidate {
            ticker: ticker.to_string(),
            quantity,
            price: quote.price,
            atr: quote.atr,
            stop_loss: quote.price - stop_distance,
            first_target: quote.price + self.config.profit_ratio * stop_distance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TradeAction;
    use crate::portfolio::TradeRequest;
    use chrono::NaiveDate;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn config() -> RiskConfig {
        RiskConfig {
            risk_pct_per_trade: 0.02,
            max_positions: 5,
            atr_multiplier: 2.0,
            cash_buffer_pct: 0.10,
            profit_ratio: 2.0,
            max_single_position_pct: 100.0,
            commission_rate: 0.0,
            atr_period: 14,
            risk_free_rate: 0.02,
        }
    }

    fn quote(price: f64, atr: f64) -> TickerQuote {
        TickerQuote { price, atr }
    }

    fn portfolio_with_position(
        cash: f64,
        ticker: &str,
        shares: i32,
        price: f64,
        stop: f64,
        target: f64,
    ) -> Portfolio {
        let mut portfolio = Portfolio::new("test", date(1), cash + shares as f64 * price, 0.0);
        portfolio
            .execute_trade(TradeRequest {
                date: date(1),
                ticker: ticker.to_string(),
                action: TradeAction::Buy,
                quantity: shares,
                price,
                reason: None,
                stop_loss: Some(stop),
                first_target: Some(target),
                entry_atr: Some(2.0),
            })
            .unwrap();
        portfolio
    }

    #[test]
    fn sizing_is_deterministic() {
        // total_value 100_000, risk 2%, atr 2.0, multiplier 2.0:
        // risk_amount 2000, stop_distance 4, 500 shares.
        let portfolio = Portfolio::new("test", date(1), 100_000.0, 0.0);
        let manager = RiskManager::new(config());
        let mut signals = BTreeMap::new();
        signals.insert("AAA".to_string(), SignalAction::Buy);
        let mut quotes = BTreeMap::new();
        quotes.insert("AAA".to_string(), quote(50.0, 2.0));

        let plan = manager.validate(&portfolio, &signals, &quotes);
        assert_eq!(plan.buys.len(), 1);
        match &plan.buys[0] {
            Order::Buy {
                quantity,
                stop_loss,
                first_target,
                ..
            } => {
                assert_eq!(*quantity, 500);
                assert!((stop_loss.unwrap() - 46.0).abs() < 1e-9);
                assert!((first_target.unwrap() - 58.0).abs() < 1e-9);
            }
            other => panic!("expected a buy, got {:?}", other),
        }
    }

    #[test]
    fn cash_buffer_rejects_oversized_entries() {
        // 500 shares at 50 = 25_000 but only 27_000 cash: the 10% buffer
        // leaves 24_300 spendable, so the entry must be rejected.
        let mut portfolio = Portfolio::new("test", date(1), 100_000.0, 0.0);
        portfolio
            .execute_trade(TradeRequest {
                date: date(1),
                ticker: "ZZZ".to_string(),
                action: TradeAction::Buy,
                quantity: 730,
                price: 100.0,
                reason: None,
                stop_loss: None,
                first_target: None,
                entry_atr: None,
            })
            .unwrap();
        assert!((portfolio.cash() - 27_000.0).abs() < 1e-9);

        let manager = RiskManager::new(config());
        let mut signals = BTreeMap::new();
        signals.insert("AAA".to_string(), SignalAction::Buy);
        let mut quotes = BTreeMap::new();
        quotes.insert("AAA".to_string(), quote(50.0, 2.0));
        quotes.insert("ZZZ".to_string(), quote(100.0, 1.0));

        let plan = manager.validate(&portfolio, &signals, &quotes);
        assert!(plan.buys.is_empty());
        let rejection = plan
            .rejections
            .iter()
            .find(|r| r.ticker == "AAA")
            .expect("candidate should be rejected");
        assert!(rejection.reason.contains("buffer"));
    }

    #[test]
    fn stop_hit_overrides_any_signal() {
        let portfolio = portfolio_with_position(10_000.0, "AAA", 100, 50.0, 46.0, 58.0);
        let manager = RiskManager::new(config());
        let mut signals = BTreeMap::new();
        signals.insert("AAA".to_string(), SignalAction::Buy);
        let mut quotes = BTreeMap::new();
        quotes.insert("AAA".to_string(), quote(45.0, 2.0));

        let plan = manager.validate(&portfolio, &signals, &quotes);
        assert_eq!(plan.sells.len(), 1);
        match &plan.sells[0] {
            Order::Sell {
                quantity, reason, ..
            } => {
                assert_eq!(*quantity, 100);
                assert_eq!(*reason, ExitReason::StopLoss);
            }
            other => panic!("expected a sell, got {:?}", other),
        }
        // The buy signal for the same ticker must not produce an entry.
        assert!(plan.buys.is_empty());
    }

    #[test]
    fn first_target_sells_exactly_half_rounded_down() {
        let portfolio = portfolio_with_position(10_000.0, "AAA", 101, 50.0, 46.0, 58.0);
        let manager = RiskManager::new(config());
        let signals = BTreeMap::new();
        let mut quotes = BTreeMap::new();
        quotes.insert("AAA".to_string(), quote(58.5, 2.0));

        let plan = manager.validate(&portfolio, &signals, &quotes);
        assert_eq!(plan.sells.len(), 1);
        match &plan.sells[0] {
            Order::Sell {
                quantity, reason, ..
            } => {
                assert_eq!(*quantity, 50);
                assert_eq!(*reason, ExitReason::FirstTarget);
            }
            other => panic!("expected a sell, got {:?}", other),
        }
    }

    #[test]
    fn breakeven_exit_fires_only_after_half_sale() {
        let mut portfolio = portfolio_with_position(10_000.0, "AAA", 100, 50.0, 46.0, 58.0);
        // Breakeven touch before the half-sale: no exit rule applies.
        let manager = RiskManager::new(config());
        let signals = BTreeMap::new();
        let mut quotes = BTreeMap::new();
        quotes.insert("AAA".to_string(), quote(49.5, 2.0));
        let plan = manager.validate(&portfolio, &signals, &quotes);
        assert!(plan.sells.is_empty());

        portfolio
            .execute_trade(TradeRequest {
                date: date(5),
                ticker: "AAA".to_string(),
                action: TradeAction::Sell,
                quantity: 50,
                price: 58.0,
                reason: Some(ExitReason::FirstTarget),
                stop_loss: None,
                first_target: None,
                entry_atr: None,
            })
            .unwrap();

        let plan = manager.validate(&portfolio, &signals, &quotes);
        assert_eq!(plan.sells.len(), 1);
        match &plan.sells[0] {
            Order::Sell {
                quantity, reason, ..
            } => {
                assert_eq!(*quantity, 50);
                // Breakeven equals the stop after the half-sale; the stop
                // rule short-circuits first with the same outcome of a
                // full exit of the remainder.
                assert!(matches!(
                    reason,
                    ExitReason::StopLoss | ExitReason::Breakeven
                ));
            }
            other => panic!("expected a sell, got {:?}", other),
        }
    }

    #[test]
    fn strategy_sell_is_ignored_after_half_sale() {
        let mut portfolio = portfolio_with_position(10_000.0, "AAA", 100, 50.0, 46.0, 58.0);
        portfolio
            .execute_trade(TradeRequest {
                date: date(5),
                ticker: "AAA".to_string(),
                action: TradeAction::Sell,
                quantity: 50,
                price: 58.0,
                reason: Some(ExitReason::FirstTarget),
                stop_loss: None,
                first_target: None,
                entry_atr: None,
            })
            .unwrap();

        let manager = RiskManager::new(config());
        let mut signals = BTreeMap::new();
        signals.insert("AAA".to_string(), SignalAction::Sell);
        let mut quotes = BTreeMap::new();
        // Above breakeven: the remainder keeps riding.
        quotes.insert("AAA".to_string(), quote(55.0, 2.0));

        let plan = manager.validate(&portfolio, &signals, &quotes);
        assert!(plan.sells.is_empty());
    }

    #[test]
    fn ranking_prefers_lower_volatility() {
        let mut cfg = config();
        cfg.max_positions = 1;
        let portfolio = Portfolio::new("test", date(1), 100_000.0, 0.0);
        let manager = RiskManager::new(cfg);

        let mut signals = BTreeMap::new();
        signals.insert("CALM".to_string(), SignalAction::Buy);
        signals.insert("WILD".to_string(), SignalAction::Buy);
        let mut quotes = BTreeMap::new();
        quotes.insert("CALM".to_string(), quote(50.0, 1.5));
        quotes.insert("WILD".to_string(), quote(50.0, 3.0));

        let plan = manager.validate(&portfolio, &signals, &quotes);
        assert_eq!(plan.buys.len(), 1);
        assert_eq!(plan.buys[0].ticker(), "CALM");
        assert!(plan
            .rejections
            .iter()
            .any(|r| r.ticker == "WILD" && r.reason.contains("ranking")));
    }

    #[test]
    fn full_portfolio_rejects_new_entries() {
        let mut cfg = config();
        cfg.max_positions = 1;
        let portfolio = portfolio_with_position(50_000.0, "AAA", 10, 50.0, 46.0, 58.0);
        let manager = RiskManager::new(cfg);

        let mut signals = BTreeMap::new();
        signals.insert("BBB".to_string(), SignalAction::Buy);
        let mut quotes = BTreeMap::new();
        quotes.insert("AAA".to_string(), quote(50.0, 2.0));
        quotes.insert("BBB".to_string(), quote(20.0, 1.0));

        let plan = manager.validate(&portfolio, &signals, &quotes);
        assert!(plan.buys.is_empty());
        assert!(plan
            .rejections
            .iter()
            .any(|r| r.ticker == "BBB" && r.reason.contains("open positions")));
    }

    #[test]
    fn missing_quote_is_an_auditable_rejection() {
        let portfolio = portfolio_with_position(10_000.0, "AAA", 100, 50.0, 46.0, 58.0);
        let manager = RiskManager::new(config());
        let signals = BTreeMap::new();
        let quotes = BTreeMap::new();

        let plan = manager.validate(&portfolio, &signals, &quotes);
        assert!(plan.sells.is_empty());
        assert!(plan
            .rejections
            .iter()
            .any(|r| r.ticker == "AAA" && r.reason.contains("quote")));
    }
}
