//! Indicator engine.
//!
//! This module provides the rolling statistics the entry rules read:
//! - `IndicatorParams`: window lengths and averaging choices
//! - `IndicatorSet`: per-bar derived values, each `None` until defined
//! - `IndicatorEngine`: incremental computation, one bar at a time
//! - `compute_raw_indicators` and `apply_warmup`: batch computation over a
//!   whole history
//!
//! Until the largest configured window is populated every field of the
//! reported set is `None`, so no rule can fire on a partially warmed-up
//! history. Crossovers are taken from the ungated averages, so the first
//! warm bar already carries one when both averages had a prior value.

pub mod atr;
pub mod crossover;
pub mod ema;
pub mod sma;

use std::fmt;
use std::str::FromStr;

pub use atr::AtrMode;
pub use crossover::CrossState;

use crate::domain::ohlcv::Bar;
use atr::calculate_atr;
use crossover::calculate_crossover;
use ema::{ExponentialMean, calculate_ema};
use sma::{RollingMean, calculate_sma};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaKind {
    #[default]
    Simple,
    Exponential,
}

impl fmt::Display for MaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaKind::Simple => write!(f, "sma"),
            MaKind::Exponential => write!(f, "ema"),
        }
    }
}

impl FromStr for MaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sma" | "simple" => Ok(MaKind::Simple),
            "ema" | "exponential" => Ok(MaKind::Exponential),
            other => Err(format!("unknown moving average kind '{other}'")),
        }
    }
}

impl FromStr for AtrMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high_low" | "simple" => Ok(AtrMode::HighLow),
            "true_range" => Ok(AtrMode::TrueRange),
            other => Err(format!("unknown atr mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorParams {
    pub ma_kind: MaKind,
    pub short_ma_period: usize,
    pub mid_ma_period: usize,
    /// `None` disables the long trend average.
    pub long_ma_period: Option<usize>,
    pub volume_period: usize,
    pub atr_period: usize,
    pub atr_mode: AtrMode,
}

impl IndicatorParams {
    /// Number of bars before any indicator is reported.
    pub fn warmup(&self) -> usize {
        [
            self.short_ma_period,
            self.mid_ma_period,
            self.long_ma_period.unwrap_or(0),
            self.volume_period,
            self.atr_period,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
        .max(1)
    }
}

impl Default for IndicatorParams {
    fn default() -> Self {
        IndicatorParams {
            ma_kind: MaKind::Simple,
            short_ma_period: 5,
            mid_ma_period: 10,
            long_ma_period: None,
            volume_period: 20,
            atr_period: 14,
            atr_mode: AtrMode::HighLow,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IndicatorSet {
    pub volume_average: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub short_ma: Option<f64>,
    pub mid_ma: Option<f64>,
    pub long_ma: Option<f64>,
    pub atr: Option<f64>,
    /// Short MA against mid MA.
    pub short_mid_cross: Option<CrossState>,
    /// Close against short MA.
    pub close_short_cross: Option<CrossState>,
}

impl IndicatorSet {
    pub fn undefined() -> Self {
        Self::default()
    }
}

/// Zero or undefined averages give an undefined ratio rather than infinity.
pub fn volume_ratio(volume: f64, average: Option<f64>) -> Option<f64> {
    match average {
        Some(avg) if avg > 0.0 => Some(volume / avg),
        _ => None,
    }
}

#[derive(Debug, Clone)]
enum MovingAverage {
    Simple(RollingMean),
    Exponential(ExponentialMean),
}

impl MovingAverage {
    fn new(kind: MaKind, period: usize) -> Self {
        match kind {
            MaKind::Simple => MovingAverage::Simple(RollingMean::new(period)),
            MaKind::Exponential => MovingAverage::Exponential(ExponentialMean::new(period)),
        }
    }

    fn push(&mut self, value: f64) -> Option<f64> {
        match self {
            MovingAverage::Simple(m) => m.push(value),
            MovingAverage::Exponential(m) => m.push(value),
        }
    }
}

/// Incremental indicator computation for a live or replayed bar stream.
///
/// Two views of the latest bar are kept: the reported set, blank until the
/// largest window is full, and the raw set, where each average is defined as
/// soon as its own window is. Crossovers always compare raw values, so a
/// cross on the first fully warmed-up bar is not lost.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    params: IndicatorParams,
    bars_seen: usize,
    short: MovingAverage,
    mid: MovingAverage,
    long: Option<MovingAverage>,
    volume: RollingMean,
    atr: RollingMean,
    prev_close: Option<f64>,
    raw: IndicatorSet,
    current: IndicatorSet,
}

impl IndicatorEngine {
    pub fn new(params: IndicatorParams) -> Self {
        Self {
            short: MovingAverage::new(params.ma_kind, params.short_ma_period),
            mid: MovingAverage::new(params.ma_kind, params.mid_ma_period),
            long: params
                .long_ma_period
                .map(|p| MovingAverage::new(params.ma_kind, p)),
            volume: RollingMean::new(params.volume_period),
            atr: RollingMean::new(params.atr_period),
            params,
            bars_seen: 0,
            prev_close: None,
            raw: IndicatorSet::undefined(),
            current: IndicatorSet::undefined(),
        }
    }

    pub fn current(&self) -> &IndicatorSet {
        &self.current
    }

    /// The latest set without the warmup gate.
    pub fn raw(&self) -> &IndicatorSet {
        &self.raw
    }

    /// Feed the next bar and return its indicator set.
    pub fn push(&mut self, bar: &Bar) -> IndicatorSet {
        self.bars_seen += 1;

        let short = self.short.push(bar.close);
        let mid = self.mid.push(bar.close);
        let long = self.long.as_mut().and_then(|m| m.push(bar.close));
        let volume_average = self.volume.push(bar.volume);
        let atr = self
            .atr
            .push(self.params.atr_mode.bar_range(bar, self.prev_close));

        let raw = IndicatorSet {
            volume_average,
            volume_ratio: volume_ratio(bar.volume, volume_average),
            short_ma: short,
            mid_ma: mid,
            long_ma: long,
            atr,
            short_mid_cross: CrossState::from_options(
                self.raw.short_ma,
                self.raw.mid_ma,
                short,
                mid,
            ),
            close_short_cross: CrossState::from_options(
                self.prev_close,
                self.raw.short_ma,
                Some(bar.close),
                short,
            ),
        };

        self.raw = raw;
        self.current = if self.bars_seen < self.params.warmup() {
            IndicatorSet::undefined()
        } else {
            raw
        };
        self.prev_close = Some(bar.close);
        self.current
    }
}

/// Batch computation of the ungated set for every bar in `bars`.
///
/// Bar `i` here equals [`IndicatorEngine::raw`] after pushing `bars[..=i]`.
pub fn compute_raw_indicators(bars: &[Bar], params: &IndicatorParams) -> Vec<IndicatorSet> {
    let closes: Vec<Option<f64>> = bars.iter().map(|b| Some(b.close)).collect();
    let close_values: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    let ma = |period: usize| match params.ma_kind {
        MaKind::Simple => calculate_sma(&close_values, period),
        MaKind::Exponential => calculate_ema(&close_values, period),
    };

    let short = ma(params.short_ma_period);
    let mid = ma(params.mid_ma_period);
    let long = params
        .long_ma_period
        .map(ma)
        .unwrap_or_else(|| vec![None; bars.len()]);
    let volume_average = calculate_sma(&volumes, params.volume_period);
    let atr = calculate_atr(bars, params.atr_period, params.atr_mode);
    let short_mid = calculate_crossover(&short, &mid);
    let close_short = calculate_crossover(&closes, &short);

    (0..bars.len())
        .map(|i| IndicatorSet {
            volume_average: volume_average[i],
            volume_ratio: volume_ratio(volumes[i], volume_average[i]),
            short_ma: short[i],
            mid_ma: mid[i],
            long_ma: long[i],
            atr: atr[i],
            short_mid_cross: short_mid[i],
            close_short_cross: close_short[i],
        })
        .collect()
}

/// Blank every set before the largest window is populated.
pub fn apply_warmup(raw: &[IndicatorSet], params: &IndicatorParams) -> Vec<IndicatorSet> {
    let warmup = params.warmup();
    raw.iter()
        .enumerate()
        .map(|(i, set)| {
            if i + 1 < warmup {
                IndicatorSet::undefined()
            } else {
                *set
            }
        })
        .collect()
}
