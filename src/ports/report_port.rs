//! Report generation port trait.

use crate::domain::backtest::BacktestResult;
use crate::domain::config::EngineConfig;
use crate::domain::error::TrendpilotError;

/// Port for writing backtest summaries.
pub trait ReportPort {
    fn write(
        &self,
        result: &BacktestResult,
        config: &EngineConfig,
        output_path: &str,
    ) -> Result<(), TrendpilotError>;
}
