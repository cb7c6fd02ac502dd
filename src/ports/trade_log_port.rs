//! Trade log sink port trait.

use crate::domain::error::TrendpilotError;
use crate::domain::position::TradeRecord;

pub trait TradeLogSink {
    fn record(&mut self, trade: &TradeRecord) -> Result<(), TrendpilotError>;
}

/// Keeps trades in memory; used when no trade log file is configured.
impl TradeLogSink for Vec<TradeRecord> {
    fn record(&mut self, trade: &TradeRecord) -> Result<(), TrendpilotError> {
        self.push(trade.clone());
        Ok(())
    }
}
