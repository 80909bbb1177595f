use crate::models::{EquitySnapshot, PerformanceSummary, Trade, TradeAction};
use statrs::statistics::Statistics;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const CALENDAR_DAYS_PER_YEAR: f64 = 365.25;

pub struct PerformanceCalculator;

impl PerformanceCalculator {
    /// Derives the return/risk statistics from the recorded equity curve
    /// and the realized PnL of closed (sell) trades.
    pub fn calculate(
        equity_curve: &[EquitySnapshot],
        trades: &[Trade],
        risk_free_rate: f64,
    ) -> PerformanceSummary {
        let (total_return, annualized_return, days) =
            Self::return_figures(equity_curve);
        let volatility = Self::annualized_volatility(equity_curve);
        let sharpe_ratio = if volatility > 0.0 {
            (annualized_return - risk_free_rate) / volatility
        } else {
            0.0
        };
        let max_drawdown = Self::max_drawdown(equity_curve);
        let calmar_ratio = if max_drawdown.abs() > f64::EPSILON {
            annualized_return / max_drawdown.abs()
        } else {
            0.0
        };

        let sell_pnls: Vec<f64> = trades
            .iter()
            .filter(|t| t.action == TradeAction::Sell)
            .map(|t| t.pnl.unwrap_or(0.0))
            .collect();
        let total_sells = sell_pnls.len() as i32;
        let winning_sells = sell_pnls.iter().filter(|pnl| **pnl > 0.0).count() as i32;
        let losing_sells = sell_pnls.iter().filter(|pnl| **pnl < 0.0).count() as i32;
        let win_rate = if total_sells > 0 {
            winning_sells as f64 / total_sells as f64
        } else {
            0.0
        };
        let gross_profit: f64 = sell_pnls.iter().filter(|pnl| **pnl > 0.0).sum();
        let gross_loss: f64 = sell_pnls.iter().filter(|pnl| **pnl < 0.0).sum();
        let profit_factor = if gross_loss.abs() > 0.0 {
            gross_profit / gross_loss.abs()
        } else {
            0.0
        };

        PerformanceSummary {
            total_return,
            annualized_return,
            volatility,
            sharpe_ratio,
            max_drawdown,
            calmar_ratio,
            win_rate,
            profit_factor,
            total_sells,
            winning_sells,
            losing_sells,
            days,
        }
    }

    fn return_figures(equity_curve: &[EquitySnapshot]) -> (f64, f64, i64) {
        let (Some(first), Some(last)) = (equity_curve.first(), equity_curve.last()) else {
            return (0.0, 0.0, 0);
        };
        if first.total_value <= 0.0 {
            return (0.0, 0.0, 0);
        }

        let growth = last.total_value / first.total_value;
        let total_return = growth - 1.0;
        let days = (last.date - first.date).num_days().max(1);
        let annualized_return = if growth > 0.0 {
            growth.powf(CALENDAR_DAYS_PER_YEAR / days as f64) - 1.0
        } else {
            -1.0
        };
        (total_return, annualized_return, days)
    }

    fn annualized_volatility(equity_curve: &[EquitySnapshot]) -> f64 {
        if equity_curve.len() < 2 {
            return 0.0;
        }
        let returns: Vec<f64> = equity_curve
            .windows(2)
            .map(|window| {
                let prev = window[0].total_value;
                let curr = window[1].total_value;
                if prev > 0.0 {
                    curr / prev - 1.0
                } else {
                    0.0
                }
            })
            .collect();
        if returns.len() < 2 {
            return 0.0;
        }

        let std_dev = returns.std_dev();
        if std_dev.is_finite() {
            std_dev * TRADING_DAYS_PER_YEAR.sqrt()
        } else {
            0.0
        }
    }

    /// Largest peak-to-trough decline as a non-positive ratio.
    fn max_drawdown(equity_curve: &[EquitySnapshot]) -> f64 {
        let mut max_drawdown = 0.0f64;
        let mut peak = f64::MIN;
        for snapshot in equity_curve {
            if snapshot.total_value > peak {
                peak = snapshot.total_value;
            } else if peak > 0.0 {
                let drawdown = (snapshot.total_value - peak) / peak;
                if drawdown < max_drawdown {
                    max_drawdown = drawdown;
                }
            }
        }
        max_drawdown
    }
}
