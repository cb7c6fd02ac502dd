//! Entry signal evaluation.
//!
//! Pure functions of the current bar, its indicator set and the previous
//! bar's close and indicator set. Any undefined input means no signal.

use std::fmt;
use std::str::FromStr;

use crate::domain::indicator::IndicatorSet;
use crate::domain::ohlcv::Bar;

/// Which entry rule family is active.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SignalProfile {
    /// Volume spike confirmed by a short/mid MA crossover on the same bar.
    VolumeMomentum { ratio_threshold: f64 },
    /// Volume spike while short MA sits above mid MA. No recency check.
    LiveMomentum { ratio_threshold: f64 },
    /// Trend filter plus an intrabar reversal or a pullback recovery.
    TrendPullback,
}

impl SignalProfile {
    pub fn name(&self) -> &'static str {
        match self {
            SignalProfile::VolumeMomentum { .. } => "volume_momentum",
            SignalProfile::LiveMomentum { .. } => "live_momentum",
            SignalProfile::TrendPullback => "trend_pullback",
        }
    }

    pub fn uses_long_ma(&self) -> bool {
        matches!(self, SignalProfile::TrendPullback)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    VolumeMomentum,
    LiveMomentum,
    TrendPullback,
}

impl FromStr for ProfileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "volume_momentum" => Ok(ProfileKind::VolumeMomentum),
            "live_momentum" => Ok(ProfileKind::LiveMomentum),
            "trend_pullback" => Ok(ProfileKind::TrendPullback),
            other => Err(format!("unknown signal profile '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPattern {
    VolumeSpikeCrossover,
    VolumeSpikeTrend,
    IntrabarReversal,
    PullbackRecovery,
}

impl fmt::Display for EntryPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryPattern::VolumeSpikeCrossover => "volume_spike_crossover",
            EntryPattern::VolumeSpikeTrend => "volume_spike_trend",
            EntryPattern::IntrabarReversal => "intrabar_reversal",
            EntryPattern::PullbackRecovery => "pullback_recovery",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntrySignal {
    pub pattern: EntryPattern,
    /// Reference price for sizing and exit levels (the bar close).
    pub price: f64,
}

/// Inputs from the bar before the current one. `indicators` is that bar's
/// ungated set, so its averages may be defined before the warmup completes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorBar<'a> {
    pub close: f64,
    pub indicators: &'a IndicatorSet,
}

pub fn evaluate_entry(
    profile: &SignalProfile,
    bar: &Bar,
    current: &IndicatorSet,
    prior: Option<PriorBar<'_>>,
) -> Option<EntrySignal> {
    let pattern = match profile {
        SignalProfile::VolumeMomentum { ratio_threshold } => {
            volume_momentum(*ratio_threshold, bar, current)
        }
        SignalProfile::LiveMomentum { ratio_threshold } => {
            live_momentum(*ratio_threshold, current)
        }
        SignalProfile::TrendPullback => trend_pullback(bar, current, prior),
    }?;
    Some(EntrySignal {
        pattern,
        price: bar.close,
    })
}

fn volume_momentum(threshold: f64, bar: &Bar, ind: &IndicatorSet) -> Option<EntryPattern> {
    let ratio = ind.volume_ratio?;
    let average = ind.volume_average?;
    let cross = ind.short_mid_cross?;

    let spike = ratio > threshold && bar.volume > threshold * average;
    (spike && cross.is_up()).then_some(EntryPattern::VolumeSpikeCrossover)
}

fn live_momentum(threshold: f64, ind: &IndicatorSet) -> Option<EntryPattern> {
    let ratio = ind.volume_ratio?;
    let short = ind.short_ma?;
    let mid = ind.mid_ma?;

    (ratio > threshold && short > mid).then_some(EntryPattern::VolumeSpikeTrend)
}

fn trend_pullback(
    bar: &Bar,
    ind: &IndicatorSet,
    prior: Option<PriorBar<'_>>,
) -> Option<EntryPattern> {
    let short = ind.short_ma?;
    let mid = ind.mid_ma?;
    let long = ind.long_ma?;

    if !(bar.close > long && short > mid) {
        return None;
    }

    if bar.low < short && bar.close > mid {
        return Some(EntryPattern::IntrabarReversal);
    }

    let prior = prior?;
    let prev_short = prior.indicators.short_ma?;
    let prev_mid = prior.indicators.mid_ma?;
    let in_pullback_zone = prior.close < prev_short && prior.close > prev_mid;
    let recovered = ind.close_short_cross?.is_up();

    (in_pullback_zone && recovered).then_some(EntryPattern::PullbackRecovery)
}
