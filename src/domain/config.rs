//! Engine configuration and its construction from a [`ConfigPort`].
//!
//! Every profile starts from its own defaults; keys present under
//! `[strategy]` override them.

use crate::domain::config_validation::validate_engine_config;
use crate::domain::error::TrendpilotError;
use crate::domain::indicator::{AtrMode, IndicatorParams, MaKind};
use crate::domain::lifecycle::{ExitPolicy, TrailMode};
use crate::domain::signal::{ProfileKind, SignalProfile};
use crate::ports::config_port::ConfigPort;

const SECTION: &str = "strategy";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub name: String,
    pub profile: SignalProfile,
    pub indicators: IndicatorParams,
    pub exit: ExitPolicy,
    /// Fraction of available capital committed per entry, in (0, 1].
    pub risk_fraction: f64,
}

impl EngineConfig {
    pub fn defaults(kind: ProfileKind) -> Self {
        match kind {
            ProfileKind::VolumeMomentum => EngineConfig {
                name: "volume_momentum".into(),
                profile: SignalProfile::VolumeMomentum {
                    ratio_threshold: 1.5,
                },
                indicators: IndicatorParams {
                    ma_kind: MaKind::Simple,
                    short_ma_period: 5,
                    mid_ma_period: 10,
                    long_ma_period: None,
                    volume_period: 20,
                    atr_period: 14,
                    atr_mode: AtrMode::HighLow,
                },
                exit: ExitPolicy::PercentBand {
                    take_profit_pct: 0.05,
                    stop_loss_pct: 0.03,
                },
                risk_fraction: 0.8,
            },
            ProfileKind::LiveMomentum => EngineConfig {
                name: "live_momentum".into(),
                profile: SignalProfile::LiveMomentum {
                    ratio_threshold: 1.45,
                },
                indicators: IndicatorParams {
                    ma_kind: MaKind::Simple,
                    short_ma_period: 5,
                    mid_ma_period: 10,
                    long_ma_period: None,
                    volume_period: 20,
                    atr_period: 14,
                    atr_mode: AtrMode::HighLow,
                },
                exit: ExitPolicy::AtrBracket {
                    stop_multiplier: 1.5,
                    take_profit_multiplier: 2.5,
                },
                risk_fraction: 0.5,
            },
            ProfileKind::TrendPullback => EngineConfig {
                name: "trend_pullback".into(),
                profile: SignalProfile::TrendPullback,
                indicators: IndicatorParams {
                    ma_kind: MaKind::Exponential,
                    short_ma_period: 10,
                    mid_ma_period: 20,
                    long_ma_period: Some(50),
                    volume_period: 20,
                    atr_period: 14,
                    atr_mode: AtrMode::HighLow,
                },
                exit: ExitPolicy::Staged {
                    stop_multiplier: 2.0,
                    risk_reward_ratio: 1.5,
                    trail: TrailMode::Atr { multiplier: 3.0 },
                },
                risk_fraction: 0.2,
            },
        }
    }

    /// Build and validate the engine configuration from `[strategy]`.
    pub fn from_port(config: &dyn ConfigPort) -> Result<Self, TrendpilotError> {
        let kind: ProfileKind = match config.get_string(SECTION, "profile") {
            Some(s) => s.parse().map_err(|reason| invalid("profile", reason))?,
            None => ProfileKind::VolumeMomentum,
        };
        let base = Self::defaults(kind);

        let name = config
            .get_string(SECTION, "name")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| base.name.clone());

        let profile = match base.profile {
            SignalProfile::VolumeMomentum { ratio_threshold } => SignalProfile::VolumeMomentum {
                ratio_threshold: config.get_double(SECTION, "volume_ratio_threshold", ratio_threshold)?,
            },
            SignalProfile::LiveMomentum { ratio_threshold } => SignalProfile::LiveMomentum {
                ratio_threshold: config.get_double(SECTION, "volume_ratio_threshold", ratio_threshold)?,
            },
            SignalProfile::TrendPullback => SignalProfile::TrendPullback,
        };

        let indicators = read_indicators(config, &base.indicators)?;
        let exit = read_exit_policy(config, &base.exit)?;
        let risk_fraction = config.get_double(SECTION, "risk_fraction", base.risk_fraction)?;

        let engine = EngineConfig {
            name,
            profile,
            indicators,
            exit,
            risk_fraction,
        };
        validate_engine_config(&engine)?;
        Ok(engine)
    }
}

fn read_indicators(
    config: &dyn ConfigPort,
    base: &IndicatorParams,
) -> Result<IndicatorParams, TrendpilotError> {
    let ma_kind = match config.get_string(SECTION, "ma_kind") {
        Some(s) => s.parse().map_err(|reason| invalid("ma_kind", reason))?,
        None => base.ma_kind,
    };
    let atr_mode = match config.get_string(SECTION, "atr_mode") {
        Some(s) => s.parse().map_err(|reason| invalid("atr_mode", reason))?,
        None => base.atr_mode,
    };
    let long = read_period(config, "long_ma_period", base.long_ma_period.unwrap_or(0))?;

    Ok(IndicatorParams {
        ma_kind,
        short_ma_period: read_period(config, "short_ma_period", base.short_ma_period)?,
        mid_ma_period: read_period(config, "mid_ma_period", base.mid_ma_period)?,
        long_ma_period: (long > 0).then_some(long),
        volume_period: read_period(config, "volume_period", base.volume_period)?,
        atr_period: read_period(config, "atr_period", base.atr_period)?,
        atr_mode,
    })
}

fn read_period(config: &dyn ConfigPort, key: &str, default: usize) -> Result<usize, TrendpilotError> {
    let value = config.get_int(SECTION, key, default as i64)?;
    usize::try_from(value).map_err(|_| invalid(key, format!("{key} must not be negative")))
}

/// `use_staged_exit` wins, then a positive `atr_take_profit_multiplier`
/// selects the bracket, otherwise the percent band applies.
fn read_exit_policy(
    config: &dyn ConfigPort,
    base: &ExitPolicy,
) -> Result<ExitPolicy, TrendpilotError> {
    let (stop, tp_mult, rr, trail_mult, trailing) = match *base {
        ExitPolicy::PercentBand { .. } => (0.0, 0.0, 1.5, 3.0, true),
        ExitPolicy::AtrBracket {
            stop_multiplier,
            take_profit_multiplier,
        } => (stop_multiplier, take_profit_multiplier, 1.5, 3.0, true),
        ExitPolicy::Staged {
            stop_multiplier,
            risk_reward_ratio,
            trail,
        } => match trail {
            TrailMode::Atr { multiplier } => (stop_multiplier, 0.0, risk_reward_ratio, multiplier, true),
            TrailMode::Breakeven => (stop_multiplier, 0.0, risk_reward_ratio, 3.0, false),
        },
    };
    let (tp_pct, sl_pct) = match *base {
        ExitPolicy::PercentBand {
            take_profit_pct,
            stop_loss_pct,
        } => (take_profit_pct, stop_loss_pct),
        _ => (0.05, 0.03),
    };

    let staged = config.get_bool(SECTION, "use_staged_exit", matches!(base, ExitPolicy::Staged { .. }))?;
    let stop_multiplier = config.get_double(SECTION, "atr_stop_multiplier", stop)?;
    let take_profit_multiplier = config.get_double(SECTION, "atr_take_profit_multiplier", tp_mult)?;

    if staged {
        let trail = if config.get_bool(SECTION, "use_trailing_stop", trailing)? {
            TrailMode::Atr {
                multiplier: config.get_double(SECTION, "atr_trail_multiplier", trail_mult)?,
            }
        } else {
            TrailMode::Breakeven
        };
        return Ok(ExitPolicy::Staged {
            stop_multiplier,
            risk_reward_ratio: config.get_double(SECTION, "risk_reward_ratio", rr)?,
            trail,
        });
    }

    if take_profit_multiplier > 0.0 {
        return Ok(ExitPolicy::AtrBracket {
            stop_multiplier,
            take_profit_multiplier,
        });
    }

    Ok(ExitPolicy::PercentBand {
        take_profit_pct: config.get_double(SECTION, "take_profit_pct", tp_pct)?,
        stop_loss_pct: config.get_double(SECTION, "stop_loss_pct", sl_pct)?,
    })
}

fn invalid(key: &str, reason: String) -> TrendpilotError {
    TrendpilotError::ConfigInvalid {
        section: SECTION.to_string(),
        key: key.to_string(),
        reason,
    }
}
