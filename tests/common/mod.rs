#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
pub use trendpilot::domain::config::EngineConfig;
pub use trendpilot::domain::error::TrendpilotError;
use trendpilot::domain::indicator::{AtrMode, IndicatorParams, MaKind};
use trendpilot::domain::lifecycle::{ExitPolicy, TrailMode};
pub use trendpilot::domain::ohlcv::Bar;
use trendpilot::domain::order_intent::{OrderId, OrderIntent, OrderStatus, OrderUpdate};
use trendpilot::domain::signal::SignalProfile;
use trendpilot::ports::account_port::AccountPort;
use trendpilot::ports::order_port::OrderRouter;

pub const SYMBOL: &str = "TEST";

pub fn ts(minute: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 4)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
        + Duration::minutes(minute)
}

pub fn make_bar(minute: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Bar {
    Bar {
        timestamp: ts(minute),
        open,
        high,
        low,
        close,
        volume,
    }
}

/// Flat tape, a two-bar dip, then a 4x volume bar where the 2-bar average
/// crosses the 3-bar average. Each bar spans close +/- 0.5.
pub fn spike_bars() -> Vec<Bar> {
    let closes = [10.0, 10.0, 10.0, 10.0, 9.0, 9.0, 11.0];
    let volumes = [100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 400.0];
    closes
        .iter()
        .zip(volumes)
        .enumerate()
        .map(|(i, (&c, v))| make_bar(i as i64, c, c + 0.5, c - 0.5, c, v))
        .collect()
}

/// Spike entry at 11, half taken off at 13.25 on bar 8, the rest stopped by
/// the trailing stop at 10.55 on bar 10.
pub fn staged_round_trip_bars() -> Vec<Bar> {
    let mut bars = spike_bars();
    bars.extend([
        make_bar(7, 11.0, 11.5, 10.8, 11.3, 100.0),
        make_bar(8, 12.0, 13.5, 11.9, 13.4, 100.0),
        make_bar(9, 13.5, 14.0, 13.2, 13.8, 100.0),
        make_bar(10, 12.0, 12.2, 10.0, 10.2, 100.0),
    ]);
    bars
}

/// Spike entry at 11, percent band exit decided on bar 8, filled at 11.8.
pub fn band_round_trip_bars() -> Vec<Bar> {
    let mut bars = spike_bars();
    bars.extend([
        make_bar(7, 11.0, 11.2, 10.9, 11.0, 100.0),
        make_bar(8, 11.2, 11.7, 11.1, 11.6, 100.0),
        make_bar(9, 11.8, 11.9, 11.5, 11.7, 100.0),
    ]);
    bars
}

fn small_params() -> IndicatorParams {
    IndicatorParams {
        ma_kind: MaKind::Simple,
        short_ma_period: 2,
        mid_ma_period: 3,
        long_ma_period: None,
        volume_period: 4,
        atr_period: 2,
        atr_mode: AtrMode::HighLow,
    }
}

pub fn band_config() -> EngineConfig {
    EngineConfig {
        name: "band".into(),
        profile: SignalProfile::VolumeMomentum {
            ratio_threshold: 1.5,
        },
        indicators: small_params(),
        exit: ExitPolicy::PercentBand {
            take_profit_pct: 0.05,
            stop_loss_pct: 0.03,
        },
        risk_fraction: 0.5,
    }
}

pub fn staged_config() -> EngineConfig {
    EngineConfig {
        name: "staged".into(),
        exit: ExitPolicy::Staged {
            stop_multiplier: 1.5,
            risk_reward_ratio: 1.5,
            trail: TrailMode::Atr { multiplier: 3.0 },
        },
        ..band_config()
    }
}

pub fn bars_csv(bars: &[Bar]) -> String {
    let mut out = String::from("timestamp,open,high,low,close,volume\n");
    for b in bars {
        writeln!(
            out,
            "{},{},{},{},{},{}",
            b.timestamp.format("%Y-%m-%d %H:%M:%S"),
            b.open,
            b.high,
            b.low,
            b.close,
            b.volume
        )
        .unwrap();
    }
    out
}

pub fn write_bars(dir: &Path, bars: &[Bar]) -> PathBuf {
    let path = dir.join(format!("{SYMBOL}.csv"));
    std::fs::write(&path, bars_csv(bars)).unwrap();
    path
}

pub struct FixedAccount(pub f64);

impl AccountPort for FixedAccount {
    fn available_capital(&self) -> Result<f64, TrendpilotError> {
        Ok(self.0)
    }
}

/// Accepts everything after the first `fail_submits` submissions, which
/// fail as transport errors. Resting and market orders alike are only
/// acknowledged, never filled.
#[derive(Default)]
pub struct RecordingRouter {
    pub fail_submits: usize,
    pub submitted: Vec<OrderIntent>,
    pub canceled: Vec<OrderId>,
    updates: Vec<OrderUpdate>,
}

impl RecordingRouter {
    pub fn failing(fail_submits: usize) -> Self {
        Self {
            fail_submits,
            ..Self::default()
        }
    }
}

impl OrderRouter for RecordingRouter {
    fn submit(&mut self, intent: &OrderIntent) -> Result<(), TrendpilotError> {
        if self.fail_submits > 0 {
            self.fail_submits -= 1;
            return Err(TrendpilotError::Transport {
                symbol: SYMBOL.into(),
                timestamp: NaiveDateTime::default(),
                reason: "connection reset".into(),
            });
        }
        self.submitted.push(intent.clone());
        self.updates.push(OrderUpdate {
            id: intent.id,
            status: OrderStatus::Submitted,
        });
        Ok(())
    }

    fn cancel(&mut self, id: OrderId) -> Result<(), TrendpilotError> {
        self.canceled.push(id);
        self.updates.push(OrderUpdate {
            id,
            status: OrderStatus::Canceled,
        });
        Ok(())
    }

    fn poll_updates(&mut self) -> Vec<OrderUpdate> {
        std::mem::take(&mut self.updates)
    }
}
