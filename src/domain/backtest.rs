//! Backtest parameters and results.
//!
//! The event loop itself lives in [`crate::runner`]; this module only holds
//! the data it consumes and produces.

use chrono::NaiveDateTime;

use crate::domain::config_validation::validate_backtest_config;
use crate::domain::error::TrendpilotError;
use crate::domain::metrics::Metrics;
use crate::domain::position::TradeRecord;
use crate::ports::config_port::ConfigPort;

const SECTION: &str = "backtest";

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub symbol: String,
    pub data_file: Option<String>,
    pub initial_capital: f64,
    /// Fraction of notional charged per fill.
    pub commission_pct: f64,
    pub trade_log: Option<String>,
    pub summary_report: Option<String>,
}

impl BacktestConfig {
    pub fn from_port(config: &dyn ConfigPort) -> Result<Self, TrendpilotError> {
        let symbol = config
            .get_string(SECTION, "symbol")
            .ok_or_else(|| TrendpilotError::ConfigMissing {
                section: SECTION.to_string(),
                key: "symbol".to_string(),
            })?;
        let non_empty = |key: &str| config.get_string(SECTION, key).filter(|s| !s.trim().is_empty());

        let backtest = BacktestConfig {
            symbol: symbol.trim().to_string(),
            data_file: non_empty("data_file"),
            initial_capital: config.get_double(SECTION, "initial_capital", 10_000.0)?,
            commission_pct: config.get_double(SECTION, "commission_pct", 0.0005)?,
            trade_log: non_empty("trade_log"),
            summary_report: non_empty("summary_report"),
        };
        validate_backtest_config(&backtest)?;
        Ok(backtest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

/// A bar whose processing failed; the loop moved on to the next one.
#[derive(Debug)]
pub struct BarFailure {
    pub timestamp: NaiveDateTime,
    pub error: TrendpilotError,
}

#[derive(Debug)]
pub struct BacktestResult {
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: Metrics,
    pub failures: Vec<BarFailure>,
}

impl BacktestResult {
    pub fn final_equity(&self) -> Option<f64> {
        self.equity_curve.last().map(|p| p.equity)
    }
}
