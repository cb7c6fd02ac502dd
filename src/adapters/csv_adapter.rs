//! CSV adapters: bar source, appending trade log and summary report.

use crate::domain::backtest::BacktestResult;
use crate::domain::config::EngineConfig;
use crate::domain::error::TrendpilotError;
use crate::domain::ohlcv::Bar;
use crate::domain::position::TradeRecord;
use crate::ports::data_port::BarSource;
use crate::ports::report_port::ReportPort;
use crate::ports::trade_log_port::TradeLogSink;
use chrono::{NaiveDate, NaiveDateTime};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use tracing::debug;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const TRADE_LOG_HEADER: [&str; 9] = [
    "symbol",
    "entry_time",
    "entry_price",
    "size",
    "exit_time",
    "exit_price",
    "pnl",
    "return_pct",
    "exit_reason",
];

/// Reads `timestamp,open,high,low,close,volume` files.
///
/// `path` is either a single file or a directory holding `<SYMBOL>.csv`.
pub struct CsvAdapter {
    path: PathBuf,
}

impl CsvAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        if self.path.is_dir() {
            self.path.join(format!("{symbol}.csv"))
        } else {
            self.path.clone()
        }
    }
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn field(record: &csv::StringRecord, index: usize, name: &str, line: u64) -> Result<f64, TrendpilotError> {
    record
        .get(index)
        .ok_or_else(|| TrendpilotError::Data {
            reason: format!("line {line}: missing {name} column"),
        })?
        .trim()
        .parse()
        .map_err(|e| TrendpilotError::Data {
            reason: format!("line {line}: invalid {name} value: {e}"),
        })
}

impl BarSource for CsvAdapter {
    fn fetch_bars(&self, symbol: &str) -> Result<Vec<Bar>, TrendpilotError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| TrendpilotError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            let ts_str = record.get(0).ok_or_else(|| TrendpilotError::Data {
                reason: format!("line {line}: missing timestamp column"),
            })?;
            let timestamp = parse_timestamp(ts_str).ok_or_else(|| TrendpilotError::Data {
                reason: format!("line {line}: invalid timestamp '{ts_str}'"),
            })?;

            bars.push(Bar {
                timestamp,
                open: field(&record, 1, "open", line)?,
                high: field(&record, 2, "high", line)?,
                low: field(&record, 3, "low", line)?,
                close: field(&record, 4, "close", line)?,
                volume: field(&record, 5, "volume", line)?,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        if let Some(pair) = bars.windows(2).find(|w| w[0].timestamp >= w[1].timestamp) {
            return Err(TrendpilotError::Data {
                reason: format!("duplicate timestamp {} in {}", pair[1].timestamp, path.display()),
            });
        }

        debug!(symbol, bars = bars.len(), path = %path.display(), "loaded bars");
        Ok(bars)
    }
}

/// Appends closed trades to a CSV file, writing the header only when the
/// file is new or empty.
pub struct CsvTradeLog {
    path: PathBuf,
}

impl CsvTradeLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

pub fn trade_row(trade: &TradeRecord) -> Vec<String> {
    vec![
        trade.symbol.clone(),
        trade.entry_time.format(TIMESTAMP_FORMAT).to_string(),
        format!("{:.4}", trade.entry_price),
        trade.size.to_string(),
        trade.exit_time.format(TIMESTAMP_FORMAT).to_string(),
        format!("{:.4}", trade.exit_price),
        format!("{:.2}", trade.pnl),
        format!("{:.2}", trade.return_pct),
        trade.exit_reason.clone(),
    ]
}

impl TradeLogSink for CsvTradeLog {
    fn record(&mut self, trade: &TradeRecord) -> Result<(), TrendpilotError> {
        let is_new = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_new {
            wtr.write_record(TRADE_LOG_HEADER)?;
        }
        wtr.write_record(trade_row(trade))?;
        wtr.flush()?;
        Ok(())
    }
}

/// Two-column `metric,value` summary.
pub struct CsvReportAdapter;

impl ReportPort for CsvReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        config: &EngineConfig,
        output_path: &str,
    ) -> Result<(), TrendpilotError> {
        let mut wtr = csv::Writer::from_path(output_path)?;
        wtr.write_record(["metric", "value"])?;
        wtr.write_record(["strategy", config.name.as_str()])?;
        wtr.write_record(["profile", config.profile.name()])?;
        wtr.write_record(["exit_policy", config.exit.name()])?;
        for (metric, value) in result.metrics.rows() {
            wtr.write_record([metric, value.as_str()])?;
        }
        wtr.write_record(["bar_failures", result.failures.len().to_string().as_str()])?;
        wtr.flush()?;
        Ok(())
    }
}
