use crate::config::RiskConfig;
use crate::errors::SimulationError;
use crate::indicators::calculate_atr;
use crate::market_data::MarketData;
use crate::models::{
    BacktestResult, EquitySnapshot, Order, Signal, TradeAction,
};
use crate::performance::PerformanceCalculator;
use crate::persistence::PersistencePort;
use crate::portfolio::{Portfolio, TradeRequest};
use crate::risk_manager::{RiskManager, TickerQuote};
use crate::signal_generator;
use crate::sizing::{
    CycleContext, EqualWeightSizing, RiskManagedSizing, SizingPolicy, SizingPolicyKind,
};
use crate::strategy::{create_strategy, Strategy};
use anyhow::{anyhow, Result};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use log::{info, warn};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// First occurrence of `target` on or after `date`.
pub fn next_weekday_on_or_after(date: NaiveDate, target: Weekday) -> NaiveDate {
    let offset = (target.num_days_from_monday() as i64
        - date.weekday().num_days_from_monday() as i64)
        .rem_euclid(7);
    date + Duration::days(offset)
}

/// First occurrence of `target` strictly after `date`.
pub fn next_weekday_after(date: NaiveDate, target: Weekday) -> NaiveDate {
    next_weekday_on_or_after(date + Duration::days(1), target)
}

#[derive(Debug, Clone)]
pub struct BacktestParams {
    pub strategy_name: String,
    pub strategy_params: HashMap<String, f64>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub tickers: Vec<String>,
    pub initial_capital: f64,
    pub sizing: SizingPolicyKind,
    pub config: RiskConfig,
    pub portfolio_name: String,
}

/// The weekly analysis/execution state machine. Signals are computed on
/// Fridays from data available up to that day; orders fill on the next
/// Monday's open. One snapshot is appended per execution date, and a
/// failed week leaves the ledger exactly as it was.
pub struct BacktestEngine<'a> {
    data: &'a MarketData,
    strategy: Box<dyn Strategy + Send + Sync>,
    policy: Box<dyn SizingPolicy>,
    config: RiskConfig,
    portfolio: Portfolio,
    equity_curve: Vec<EquitySnapshot>,
    signals: Vec<Signal>,
    weeks_processed: u32,
}

impl<'a> BacktestEngine<'a> {
    pub fn new(
        data: &'a MarketData,
        strategy: Box<dyn Strategy + Send + Sync>,
        policy: Box<dyn SizingPolicy>,
        config: RiskConfig,
        portfolio: Portfolio,
    ) -> Self {
        Self {
            data,
            strategy,
            policy,
            config,
            portfolio,
            equity_curve: Vec::new(),
            signals: Vec::new(),
            weeks_processed: 0,
        }
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn equity_curve(&self) -> &[EquitySnapshot] {
        &self.equity_curve
    }

    pub fn run(
        &mut self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        mut recorder: Option<&mut dyn PersistencePort>,
    ) -> Result<()> {
        if end_date < start_date {
            return Err(anyhow!(
                "End date {} is before start date {}",
                end_date,
                start_date
            ));
        }

        let mut cursor = start_date;
        loop {
            let analysis_date = next_weekday_on_or_after(cursor, Weekday::Fri);
            let execution_date = next_weekday_after(analysis_date, Weekday::Mon);
            if execution_date > end_date {
                info!(
                    "Reached end of run window: next execution {} is past {}",
                    execution_date, end_date
                );
                break;
            }

            self.weeks_processed += 1;
            let cycle_result = match recorder {
                Some(ref mut r) => self.run_cycle(analysis_date, execution_date, Some(&mut **r)),
                None => self.run_cycle(analysis_date, execution_date, None),
            };
            if let Err(err) = cycle_result {
                warn!(
                    "Week {} (analysis {}) skipped: {}",
                    self.weeks_processed, analysis_date, err
                );
            }

            cursor = analysis_date + Duration::days(1);
        }

        Ok(())
    }

    fn run_cycle(
        &mut self,
        analysis_date: NaiveDate,
        execution_date: NaiveDate,
        mut recorder: Option<&mut dyn PersistencePort>,
    ) -> Result<()> {
        let analysis_slices = self.data.slices_up_to(analysis_date);
        if analysis_slices.is_empty() {
            return Err(anyhow!("no market data on or before {}", analysis_date));
        }

        let batch = signal_generator::generate(
            self.strategy.as_ref(),
            &analysis_slices,
            analysis_date,
        )?;
        info!(
            "Analysis {}: buy={} sell={} hold={}",
            analysis_date, batch.summary.buy, batch.summary.sell, batch.summary.hold
        );

        for (ticker, action) in &batch.actions {
            if let Some(slice) = analysis_slices.get(ticker.as_str()) {
                let last = slice.last().expect("analysis slices are never empty");
                self.signals.push(Signal {
                    ticker: ticker.clone(),
                    date: analysis_date,
                    action: *action,
                    price: last.close,
                    atr: calculate_atr(slice, self.config.atr_period).unwrap_or(0.0),
                });
            }
        }

        // One batched slice per cycle serves quoting for every ticker.
        let execution_slices = self.data.slices_up_to(execution_date);
        let mut quotes: BTreeMap<String, TickerQuote> = BTreeMap::new();
        for (ticker, slice) in &execution_slices {
            let last = slice.last().expect("slices are never empty");
            if last.date == execution_date {
                quotes.insert(
                    (*ticker).to_string(),
                    TickerQuote {
                        price: last.open,
                        atr: calculate_atr(slice, self.config.atr_period).unwrap_or(0.0),
                    },
                );
            }
        }
        if quotes.is_empty() {
            return Err(anyhow!("no prices available on execution date {}", execution_date));
        }

        let held: Vec<String> = self.portfolio.positions().map(|p| p.ticker.clone()).collect();
        for ticker in held {
            match quotes.get(&ticker) {
                Some(quote) => self.portfolio.update_price(&ticker, quote.price, execution_date),
                None => {
                    let missing = SimulationError::Data {
                        ticker,
                        date: execution_date,
                    };
                    warn!("{}; carrying previous mark", missing);
                }
            }
        }

        let plan = self.policy.plan(&CycleContext {
            portfolio: &self.portfolio,
            signals: &batch.actions,
            quotes: &quotes,
        });
        for rejection in &plan.rejections {
            info!(
                "Rejected {} {} on {}: {}",
                rejection.action.as_str(),
                rejection.ticker,
                execution_date,
                rejection.reason
            );
        }

        let portfolio_name = self.portfolio.name().to_string();
        for order in plan.sells.iter().chain(plan.buys.iter()) {
            let request = match order {
                Order::Sell {
                    ticker,
                    quantity,
                    price,
                    reason,
                } => TradeRequest {
                    date: execution_date,
                    ticker: ticker.clone(),
                    action: TradeAction::Sell,
                    quantity: *quantity,
                    price: *price,
                    reason: Some(*reason),
                    stop_loss: None,
                    first_target: None,
                    entry_atr: None,
                },
                Order::Buy {
                    ticker,
                    quantity,
                    price,
                    stop_loss,
                    first_target,
                    entry_atr,
                } => TradeRequest {
                    date: execution_date,
                    ticker: ticker.clone(),
                    action: TradeAction::Buy,
                    quantity: *quantity,
                    price: *price,
                    reason: None,
                    stop_loss: *stop_loss,
                    first_target: *first_target,
                    entry_atr: *entry_atr,
                },
            };

            match self.portfolio.execute_trade(request) {
                Ok(trade) => {
                    if let Some(store) = recorder.as_mut() {
                        if let Err(err) = store.save_trade(&portfolio_name, trade) {
                            warn!("Failed to persist trade for {}: {}", order.ticker(), err);
                        }
                    }
                }
                Err(err) => warn!(
                    "Order for {} on {} not executed: {}",
                    order.ticker(),
                    execution_date,
                    err
                ),
            }
        }

        let snapshot = EquitySnapshot {
            date: execution_date,
            cash: self.portfolio.cash(),
            positions_value: self.portfolio.positions_value(),
            total_value: self.portfolio.total_value(),
            position_count: self.portfolio.position_count(),
        };
        if let Some(store) = recorder.as_mut() {
            if let Err(err) = store.save_snapshot(&portfolio_name, &snapshot) {
                warn!("Failed to persist snapshot for {}: {}", execution_date, err);
            }
        }
        self.equity_curve.push(snapshot);

        Ok(())
    }
}

/// Programmatic entry point: runs a full weekly backtest and returns the
/// equity curve, trade log and derived performance statistics.
pub fn run_backtest(
    data: &MarketData,
    params: &BacktestParams,
    mut recorder: Option<&mut dyn PersistencePort>,
) -> Result<BacktestResult> {
    params.config.validate()?;
    if params.tickers.is_empty() {
        return Err(anyhow!("at least one ticker is required"));
    }
    if params.end_date < params.start_date {
        return Err(anyhow!(
            "End date {} is before start date {}",
            params.end_date,
            params.start_date
        ));
    }

    let data = data.clone().restrict_to_tickers(&params.tickers);
    if !data.has_data() {
        return Err(anyhow!(
            "No market data found for tickers {:?}",
            params.tickers
        ));
    }

    let strategy = create_strategy(&params.strategy_name, params.strategy_params.clone())?;
    let policy: Box<dyn SizingPolicy> = match params.sizing {
        SizingPolicyKind::RiskManaged => Box::new(RiskManagedSizing::new(RiskManager::new(
            params.config.clone(),
        ))),
        SizingPolicyKind::EqualWeight => {
            Box::new(EqualWeightSizing::new(params.config.commission_rate))
        }
    };
    let portfolio = Portfolio::new(
        params.portfolio_name.clone(),
        params.start_date,
        params.initial_capital,
        params.config.commission_rate,
    );

    info!(
        "Starting backtest: strategy={} sizing={} {} to {} capital={:.2}",
        params.strategy_name,
        params.sizing.as_str(),
        params.start_date,
        params.end_date,
        params.initial_capital
    );

    let mut engine = BacktestEngine::new(&data, strategy, policy, params.config.clone(), portfolio);
    match recorder {
        Some(ref mut r) => engine.run(params.start_date, params.end_date, Some(&mut **r))?,
        None => engine.run(params.start_date, params.end_date, None)?,
    }

    if let Some(ref mut store) = recorder {
        if let Err(err) = store.save_portfolio(&engine.portfolio.to_state()) {
            warn!("Failed to persist final portfolio state: {}", err);
        }
    }

    let performance = PerformanceCalculator::calculate(
        &engine.equity_curve,
        engine.portfolio.trades(),
        params.config.risk_free_rate,
    );
    let final_value = engine
        .equity_curve
        .last()
        .map(|s| s.total_value)
        .unwrap_or(params.initial_capital);

    info!(
        "Backtest completed: {} weeks, final value {:.2}, total return {:.2}%, {} trades",
        engine.weeks_processed,
        final_value,
        performance.total_return * 100.0,
        engine.portfolio.trades().len()
    );

    Ok(BacktestResult {
        id: Uuid::new_v4().to_string(),
        strategy: params.strategy_name.clone(),
        start_date: params.start_date,
        end_date: params.end_date,
        initial_capital: params.initial_capital,
        final_value,
        weeks_processed: engine.weeks_processed,
        performance,
        equity_curve: engine.equity_curve,
        trades: engine.portfolio.trades().to_vec(),
        signals: engine.signals,
        tickers: data.tickers(),
    })
}
