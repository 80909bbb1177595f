use chrono::NaiveDate;
use thiserror::Error;

/// Domain error taxonomy. Only `Config` is fatal; everything else is
/// recovered locally by the component that observes it.
#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("No price data for {ticker} on {date}")]
    Data { ticker: String, date: NaiveDate },

    #[error("Insufficient cash: need {required:.2}, have {available:.2}")]
    InsufficientCash { required: f64, available: f64 },

    #[error("Insufficient shares of {ticker}: need {requested}, have {held}")]
    InsufficientShares {
        ticker: String,
        requested: i32,
        held: i32,
    },

    #[error("Strategy failed for {ticker}: {message}")]
    Strategy { ticker: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SimulationError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SimulationError::Config(_))
    }
}
