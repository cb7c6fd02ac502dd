//! Bar source port trait.

use crate::domain::error::TrendpilotError;
use crate::domain::ohlcv::Bar;

/// Produces a time-ordered bar history for one instrument.
pub trait BarSource {
    fn fetch_bars(&self, symbol: &str) -> Result<Vec<Bar>, TrendpilotError>;
}
