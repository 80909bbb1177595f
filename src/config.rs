use crate::errors::SimulationError;
use std::collections::HashMap;

/// Risk and execution parameters consumed by the risk manager and the
/// weekly engine. Validated once at construction; invalid values abort
/// before any simulation runs.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Fraction of total portfolio value risked per single trade.
    pub risk_pct_per_trade: f64,
    /// Maximum simultaneous open positions.
    pub max_positions: i32,
    /// Stop loss distance in ATR units.
    pub atr_multiplier: f64,
    /// Fraction of available cash kept out of new entries.
    pub cash_buffer_pct: f64,
    /// First target distance as a multiple of the stop distance.
    pub profit_ratio: f64,
    /// Maximum single position weight, in percent of total value.
    pub max_single_position_pct: f64,
    /// Commission charged on both sides of a trade.
    pub commission_rate: f64,
    /// Lookback for the ATR volatility proxy.
    pub atr_period: usize,
    /// Annual risk-free rate used by the Sharpe ratio.
    pub risk_free_rate: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_pct_per_trade: 0.02,
            max_positions: 5,
            atr_multiplier: 2.0,
            cash_buffer_pct: 0.10,
            profit_ratio: 2.0,
            max_single_position_pct: 20.0,
            commission_rate: 0.0,
            atr_period: 14,
            risk_free_rate: 0.02,
        }
    }
}

impl RiskConfig {
    /// Builds a config from a raw parameter map, falling back to defaults
    /// for absent keys and failing fast on out-of-range values.
    pub fn from_parameters(parameters: &HashMap<String, f64>) -> Result<Self, SimulationError> {
        use crate::param_utils::*;

        let defaults = Self::default();
        let config = Self {
            risk_pct_per_trade: get_param(
                parameters,
                "riskPctPerTrade",
                defaults.risk_pct_per_trade,
            ),
            max_positions: get_rounded_param(parameters, "maxPositions", defaults.max_positions),
            atr_multiplier: get_param(parameters, "atrMultiplier", defaults.atr_multiplier),
            cash_buffer_pct: get_param(parameters, "cashBufferPct", defaults.cash_buffer_pct),
            profit_ratio: get_param(parameters, "profitRatio", defaults.profit_ratio),
            max_single_position_pct: get_param(
                parameters,
                "maxSinglePositionPct",
                defaults.max_single_position_pct,
            ),
            commission_rate: get_param(parameters, "commissionRate", defaults.commission_rate),
            atr_period: get_usize_param_min(parameters, "atrPeriod", defaults.atr_period, 1),
            risk_free_rate: get_param(parameters, "riskFreeRate", defaults.risk_free_rate),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        require_in_open_range(self.risk_pct_per_trade, 0.0, 1.0, "riskPctPerTrade")?;
        if self.max_positions <= 0 {
            return Err(SimulationError::Config(format!(
                "maxPositions must be a positive integer (value: {})",
                self.max_positions
            )));
        }
        require_finite(self.atr_multiplier, "atrMultiplier")?;
        if self.atr_multiplier <= 0.0 {
            return Err(SimulationError::Config(format!(
                "atrMultiplier must be > 0 (value: {})",
                self.atr_multiplier
            )));
        }
        require_finite(self.cash_buffer_pct, "cashBufferPct")?;
        if !(0.0..1.0).contains(&self.cash_buffer_pct) {
            return Err(SimulationError::Config(format!(
                "cashBufferPct must be in [0, 1) (value: {})",
                self.cash_buffer_pct
            )));
        }
        require_finite(self.profit_ratio, "profitRatio")?;
        if self.profit_ratio <= 0.0 {
            return Err(SimulationError::Config(format!(
                "profitRatio must be > 0 (value: {})",
                self.profit_ratio
            )));
        }
        require_finite(self.max_single_position_pct, "maxSinglePositionPct")?;
        if self.max_single_position_pct <= 0.0 || self.max_single_position_pct > 100.0 {
            return Err(SimulationError::Config(format!(
                "maxSinglePositionPct must be in (0, 100] (value: {})",
                self.max_single_position_pct
            )));
        }
        require_finite(self.commission_rate, "commissionRate")?;
        if !(0.0..1.0).contains(&self.commission_rate) {
            return Err(SimulationError::Config(format!(
                "commissionRate must be in [0, 1) (value: {})",
                self.commission_rate
            )));
        }
        require_finite(self.risk_free_rate, "riskFreeRate")?;
        Ok(())
    }
}

fn require_finite(value: f64, key: &str) -> Result<(), SimulationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(SimulationError::Config(format!(
            "{} must be finite (value: {})",
            key, value
        )))
    }
}

fn require_in_open_range(
    value: f64,
    min: f64,
    max: f64,
    key: &str,
) -> Result<(), SimulationError> {
    require_finite(value, key)?;
    if value <= min || value >= max {
        return Err(SimulationError::Config(format!(
            "{} must be in ({}, {}) (value: {})",
            key, min, max, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RiskConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        let mut config = RiskConfig::default();
        config.risk_pct_per_trade = 0.0;
        assert!(config.validate().is_err());

        let mut config = RiskConfig::default();
        config.max_positions = 0;
        assert!(config.validate().is_err());

        let mut config = RiskConfig::default();
        config.cash_buffer_pct = 1.0;
        assert!(config.validate().is_err());

        let mut config = RiskConfig::default();
        config.max_single_position_pct = 120.0;
        assert!(config.validate().is_err());

        let mut config = RiskConfig::default();
        config.commission_rate = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn builds_from_parameter_map() {
        let mut params = HashMap::new();
        params.insert("riskPctPerTrade".to_string(), 0.01);
        params.insert("maxPositions".to_string(), 3.0);
        params.insert("atrPeriod".to_string(), 20.0);

        let config = RiskConfig::from_parameters(&params).unwrap();
        assert_eq!(config.max_positions, 3);
        assert_eq!(config.atr_period, 20);
        assert!((config.risk_pct_per_trade - 0.01).abs() < 1e-12);
        assert!((config.profit_ratio - 2.0).abs() < 1e-12);
    }

    #[test]
    fn parameter_map_failures_are_fatal_config_errors() {
        let mut params = HashMap::new();
        params.insert("atrMultiplier".to_string(), -1.0);
        let err = RiskConfig::from_parameters(&params).unwrap_err();
        assert!(err.is_fatal());
    }
}
