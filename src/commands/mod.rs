pub mod export_sample_data;
pub mod list_strategies;
pub mod run_backtest;
