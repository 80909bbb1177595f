use crate::models::{ExitReason, Order, OrderPlan, OrderRejection, SignalAction};
use crate::portfolio::Portfolio;
use crate::risk_manager::{RiskManager, TickerQuote};
use anyhow::anyhow;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Everything a sizing policy sees for one execution cycle.
pub struct CycleContext<'a> {
    pub portfolio: &'a Portfolio,
    pub signals: &'a BTreeMap<String, SignalAction>,
    pub quotes: &'a BTreeMap<String, TickerQuote>,
}

/// Converts one cycle's raw signals into an order plan. Both policies
/// emit the same plan schema, so everything downstream (ledger,
/// snapshots, performance) is policy-agnostic.
pub trait SizingPolicy {
    fn name(&self) -> &'static str;
    fn plan(&self, ctx: &CycleContext) -> OrderPlan;
}

/// ATR-based risk sizing with the full exit discipline.
pub struct RiskManagedSizing {
    manager: RiskManager,
}

impl RiskManagedSizing {
    pub fn new(manager: RiskManager) -> Self {
        Self { manager }
    }
}

impl SizingPolicy for RiskManagedSizing {
    fn name(&self) -> &'static str {
        "risk_managed"
    }

    fn plan(&self, ctx: &CycleContext) -> OrderPlan {
        self.manager.validate(ctx.portfolio, ctx.signals, ctx.quotes)
    }
}

/// Naive equal-weight sizing: every buy signal gets the same dollar
/// allocation of the current total value, sell signals fully liquidate.
pub struct EqualWeightSizing {
    commission_rate: f64,
}

impl EqualWeightSizing {
    pub fn new(commission_rate: f64) -> Self {
        Self { commission_rate }
    }
}

impl SizingPolicy for EqualWeightSizing {
    fn name(&self) -> &'static str {
        "equal_weight"
    }

    fn plan(&self, ctx: &CycleContext) -> OrderPlan {
        let mut plan = OrderPlan::default();
        let mut projected_cash = ctx.portfolio.cash();

        for (ticker, action) in ctx.signals {
            if *action != SignalAction::Sell {
                continue;
            }
            let Some(position) = ctx.portfolio.position(ticker) else {
                continue;
            };
            match ctx.quotes.get(ticker) {
                Some(quote) => {
                    projected_cash +=
                        position.shares as f64 * quote.price * (1.0 - self.commission_rate);
                    plan.sells.push(Order::Sell {
                        ticker: ticker.clone(),
                        quantity: position.shares,
                        price: quote.price,
                        reason: ExitReason::StrategySignal,
                    });
                }
                None => plan.rejections.push(OrderRejection {
                    ticker: ticker.clone(),
                    action: *action,
                    reason: "no quote for this cycle".to_string(),
                }),
            }
        }

        let buy_count = ctx
            .signals
            .values()
            .filter(|a| **a == SignalAction::Buy)
            .count();
        if buy_count == 0 {
            return plan;
        }
        let position_value = ctx.portfolio.total_value() / buy_count as f64;

        for (ticker, action) in ctx.signals {
            if *action != SignalAction::Buy {
                continue;
            }
            if ctx.portfolio.position(ticker).is_some() {
                plan.rejections.push(OrderRejection {
                    ticker: ticker.clone(),
                    action: *action,
                    reason: "position already open".to_string(),
                });
                continue;
            }
            let Some(quote) = ctx.quotes.get(ticker) else {
                plan.rejections.push(OrderRejection {
                    ticker: ticker.clone(),
                    action: *action,
                    reason: "no quote for this cycle".to_string(),
                });
                continue;
            };
            if quote.price <= 0.0 || !quote.price.is_finite() {
                plan.rejections.push(OrderRejection {
                    ticker: ticker.clone(),
                    action: *action,
                    reason: format!("unusable price {}", quote.price),
                });
                continue;
            }

            let quantity = (position_value / quote.price).floor() as i32;
            let total_cost = quantity as f64 * quote.price * (1.0 + self.commission_rate);
            if quantity < 1 {
                plan.rejections.push(OrderRejection {
                    ticker: ticker.clone(),
                    action: *action,
                    reason: format!(
                        "allocation {:.2} below one share at {:.2}",
                        position_value, quote.price
                    ),
                });
                continue;
            }
            if total_cost > projected_cash {
                plan.rejections.push(OrderRejection {
                    ticker: ticker.clone(),
                    action: *action,
                    reason: format!(
                        "cost {:.2} exceeds projected cash {:.2}",
                        total_cost, projected_cash
                    ),
                });
                continue;
            }

            projected_cash -= total_cost;
            plan.buys.push(Order::Buy {
                ticker: ticker.clone(),
                quantity,
                price: quote.price,
                stop_loss: None,
                first_target: None,
                entry_atr: None,
            });
        }

        plan
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingPolicyKind {
    RiskManaged,
    EqualWeight,
}

impl SizingPolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizingPolicyKind::RiskManaged => "risk-managed",
            SizingPolicyKind::EqualWeight => "equal-weight",
        }
    }
}

impl FromStr for SizingPolicyKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "risk-managed" | "risk" => Ok(SizingPolicyKind::RiskManaged),
            "equal-weight" | "equal" => Ok(SizingPolicyKind::EqualWeight),
            other => Err(anyhow!("Unknown sizing policy '{}'", other)),
        }
    }
}
