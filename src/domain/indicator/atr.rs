//! Average True Range as a simple mean of per-bar ranges.
//!
//! The default [`AtrMode::HighLow`] uses `high - low` only and ignores the
//! gap from the prior close. This is not the textbook ATR, but it is what the
//! momentum and trend rules were tuned against. [`AtrMode::TrueRange`] gives
//! the three-term definition; the first bar has no prior close and falls back
//! to `high - low`.

use super::sma::calculate_sma;
use crate::domain::ohlcv::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AtrMode {
    #[default]
    HighLow,
    TrueRange,
}

impl AtrMode {
    pub fn bar_range(self, bar: &Bar, prev_close: Option<f64>) -> f64 {
        match (self, prev_close) {
            (AtrMode::TrueRange, Some(prev)) => bar.true_range(prev),
            _ => bar.range(),
        }
    }
}

pub fn calculate_atr(bars: &[Bar], period: usize, mode: AtrMode) -> Vec<Option<f64>> {
    let ranges: Vec<f64> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let prev_close = i.checked_sub(1).map(|p| bars[p].close);
            mode.bar_range(bar, prev_close)
        })
        .collect();
    calculate_sma(&ranges, period)
}
