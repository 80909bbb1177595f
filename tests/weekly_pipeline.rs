use backtester::config::RiskConfig;
use backtester::engine::{run_backtest, BacktestParams};
use backtester::market_data::{sample_universe, MarketData};
use backtester::models::{Candle, TradeAction};
use backtester::persistence::{MemoryStore, PersistencePort};
use backtester::sizing::SizingPolicyKind;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::HashMap;

fn weekday_candles(ticker: &str, start: NaiveDate, closes: &[f64]) -> Vec<Candle> {
    let mut candles = Vec::new();
    let mut date = start;
    let mut index = 0;
    while index < closes.len() {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            let close = closes[index];
            candles.push(Candle {
                ticker: ticker.to_string(),
                date,
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume_shares: 150_000,
            });
            index += 1;
        }
        date += Duration::days(1);
    }
    candles
}

fn base_params(
    start: NaiveDate,
    end: NaiveDate,
    sizing: SizingPolicyKind,
) -> BacktestParams {
    BacktestParams {
        strategy_name: "ma_crossover".to_string(),
        strategy_params: HashMap::new(),
        start_date: start,
        end_date: end,
        tickers: vec!["AAA".to_string()],
        initial_capital: 10_000.0,
        sizing,
        config: RiskConfig::default(),
        portfolio_name: "pipeline".to_string(),
    }
}

#[test]
fn crossover_buys_once_on_monday_and_ends_ahead() {
    // Strictly increasing closes over several weeks: the short moving
    // average crosses the long one in week one and stays above it.
    let start = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
    let closes: Vec<f64> = (0..25).map(|i| 50.0 + i as f64).collect();
    let data = MarketData::from_candles(weekday_candles("AAA", start, &closes));
    let end = *data.unique_dates().last().unwrap();

    let result = run_backtest(
        &data,
        &base_params(start, end, SizingPolicyKind::EqualWeight),
        None,
    )
    .unwrap();

    let buys: Vec<_> = result
        .trades
        .iter()
        .filter(|t| t.action == TradeAction::Buy)
        .collect();
    assert_eq!(buys.len(), 1, "exactly one entry is expected");
    assert_eq!(buys[0].date.weekday(), Weekday::Mon);
    assert_eq!(
        buys[0].date,
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
        "fill lands on the first Monday after the crossover"
    );
    assert!(result.final_value > 10_000.0);
    assert!(result
        .trades
        .iter()
        .all(|t| t.action != TradeAction::Sell));
}

#[test]
fn two_for_one_half_exit_in_a_trending_market() {
    let start = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
    let closes: Vec<f64> = (0..25).map(|i| 50.0 + i as f64).collect();
    let data = MarketData::from_candles(weekday_candles("AAA", start, &closes));
    let end = *data.unique_dates().last().unwrap();

    let mut params = base_params(start, end, SizingPolicyKind::RiskManaged);
    params.config.max_single_position_pct = 100.0;

    let result = run_backtest(&data, &params, None).unwrap();

    let buys: Vec<_> = result
        .trades
        .iter()
        .filter(|t| t.action == TradeAction::Buy)
        .collect();
    assert_eq!(buys.len(), 1);
    // Entry on the first Monday at the open of 55 with ATR 2 and a 2x
    // multiplier: 2% of 10k risk over a 4 point stop buys 50 shares.
    assert_eq!(buys[0].quantity, 50);
    assert!((buys[0].price - 55.0).abs() < 1e-9);

    let sells: Vec<_> = result
        .trades
        .iter()
        .filter(|t| t.action == TradeAction::Sell)
        .collect();
    assert_eq!(sells.len(), 1, "only the first-target half sale fires");
    assert_eq!(sells[0].quantity, 25);
    assert_eq!(sells[0].reason.as_deref(), Some("first_target"));
    assert!(sells[0].pnl.unwrap() > 0.0);

    // The remainder is still held at the end of the run.
    let last = result.equity_curve.last().unwrap();
    assert_eq!(last.position_count, 1);
    assert!(result.final_value > 10_000.0);
}

#[test]
fn stop_loss_liquidates_after_a_collapse() {
    let start = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
    // Two rising weeks to trigger an entry, then a crash far below any
    // plausible stop level.
    let mut closes: Vec<f64> = (0..10).map(|i| 50.0 + i as f64).collect();
    closes.extend((0..10).map(|i| 40.0 - 2.0 * i as f64));
    let data = MarketData::from_candles(weekday_candles("AAA", start, &closes));
    let end = *data.unique_dates().last().unwrap();

    let mut params = base_params(start, end, SizingPolicyKind::RiskManaged);
    params.config.max_single_position_pct = 100.0;

    let result = run_backtest(&data, &params, None).unwrap();

    let stop_sells: Vec<_> = result
        .trades
        .iter()
        .filter(|t| t.reason.as_deref() == Some("stop_loss"))
        .collect();
    assert_eq!(stop_sells.len(), 1);
    assert!(stop_sells[0].pnl.unwrap() < 0.0);

    // Everything was liquidated; the ledger invariants hold throughout.
    let last = result.equity_curve.last().unwrap();
    assert_eq!(last.position_count, 0);
    for snapshot in &result.equity_curve {
        assert!(snapshot.cash >= 0.0);
        assert!((snapshot.total_value - (snapshot.cash + snapshot.positions_value)).abs() < 1e-6);
    }
}

#[test]
fn sample_universe_run_is_reproducible_and_persisted() {
    let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
    let end = NaiveDate::from_ymd_opt(2022, 12, 30).unwrap();
    let data = sample_universe(start, end);

    let mut params = base_params(start, end, SizingPolicyKind::RiskManaged);
    params.strategy_name = "breakout".to_string();
    params.tickers = data.tickers();
    params.config.max_single_position_pct = 50.0;

    let mut store = MemoryStore::new();
    let first = run_backtest(&data, &params, Some(&mut store)).unwrap();
    let second = run_backtest(&data, &params, None).unwrap();

    assert!(!first.equity_curve.is_empty());
    assert_eq!(first.trades.len(), second.trades.len());
    assert_eq!(first.equity_curve.len(), second.equity_curve.len());
    for (a, b) in first.equity_curve.iter().zip(second.equity_curve.iter()) {
        assert!((a.total_value - b.total_value).abs() < 1e-9);
    }

    assert_eq!(store.snapshots.len(), first.equity_curve.len());
    assert_eq!(store.trades.len(), first.trades.len());
    let persisted = store.load_latest_portfolio("pipeline").unwrap().unwrap();
    assert!((persisted.total_value - first.final_value).abs() < 1e-6);

    for snapshot in &first.equity_curve {
        assert!(snapshot.cash >= 0.0);
        assert!((snapshot.total_value - (snapshot.cash + snapshot.positions_value)).abs() < 1e-6);
    }
}
