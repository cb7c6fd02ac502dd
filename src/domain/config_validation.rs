//! Configuration validation.
//!
//! Runs on the typed configs after defaults and overrides are merged, so
//! every rule sees the values the engine will actually use.

use crate::domain::backtest::BacktestConfig;
use crate::domain::config::EngineConfig;
use crate::domain::error::TrendpilotError;
use crate::domain::lifecycle::{ExitPolicy, TrailMode};
use crate::domain::signal::SignalProfile;

pub fn validate_engine_config(config: &EngineConfig) -> Result<(), TrendpilotError> {
    validate_periods(config)?;
    validate_ma_order(config)?;
    validate_threshold(config)?;
    validate_risk_fraction(config)?;
    validate_exit_policy(&config.exit)?;
    Ok(())
}

pub fn validate_backtest_config(config: &BacktestConfig) -> Result<(), TrendpilotError> {
    if config.symbol.trim().is_empty() {
        return Err(TrendpilotError::ConfigMissing {
            section: "backtest".to_string(),
            key: "symbol".to_string(),
        });
    }
    if !(config.initial_capital > 0.0) {
        return Err(invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    if config.commission_pct < 0.0 {
        return Err(invalid(
            "backtest",
            "commission_pct",
            "commission_pct must be non-negative",
        ));
    }
    Ok(())
}

fn validate_periods(config: &EngineConfig) -> Result<(), TrendpilotError> {
    let p = &config.indicators;
    let periods = [
        ("short_ma_period", Some(p.short_ma_period)),
        ("mid_ma_period", Some(p.mid_ma_period)),
        ("long_ma_period", p.long_ma_period),
        ("volume_period", Some(p.volume_period)),
        ("atr_period", Some(p.atr_period)),
    ];
    for (key, period) in periods {
        if period == Some(0) {
            return Err(invalid("strategy", key, &format!("{key} must be positive")));
        }
    }
    if config.profile.uses_long_ma() && p.long_ma_period.is_none() {
        return Err(invalid(
            "strategy",
            "long_ma_period",
            "trend_pullback requires a long moving average",
        ));
    }
    Ok(())
}

fn validate_ma_order(config: &EngineConfig) -> Result<(), TrendpilotError> {
    let p = &config.indicators;
    if p.short_ma_period >= p.mid_ma_period {
        return Err(invalid(
            "strategy",
            "short_ma_period",
            "short_ma_period must be less than mid_ma_period",
        ));
    }
    if p.long_ma_period.is_some_and(|long| p.mid_ma_period >= long) {
        return Err(invalid(
            "strategy",
            "mid_ma_period",
            "mid_ma_period must be less than long_ma_period",
        ));
    }
    Ok(())
}

fn validate_threshold(config: &EngineConfig) -> Result<(), TrendpilotError> {
    match config.profile {
        SignalProfile::VolumeMomentum { ratio_threshold }
        | SignalProfile::LiveMomentum { ratio_threshold }
            if !(ratio_threshold > 0.0) =>
        {
            Err(invalid(
                "strategy",
                "volume_ratio_threshold",
                "volume_ratio_threshold must be positive",
            ))
        }
        _ => Ok(()),
    }
}

fn validate_risk_fraction(config: &EngineConfig) -> Result<(), TrendpilotError> {
    let r = config.risk_fraction;
    if !(r > 0.0 && r <= 1.0) {
        return Err(invalid(
            "strategy",
            "risk_fraction",
            "risk_fraction must be in (0, 1]",
        ));
    }
    Ok(())
}

fn validate_exit_policy(exit: &ExitPolicy) -> Result<(), TrendpilotError> {
    match *exit {
        ExitPolicy::PercentBand {
            take_profit_pct,
            stop_loss_pct,
        } => {
            non_negative("take_profit_pct", take_profit_pct)?;
            non_negative("stop_loss_pct", stop_loss_pct)?;
        }
        ExitPolicy::AtrBracket {
            stop_multiplier,
            take_profit_multiplier,
        } => {
            non_negative("atr_stop_multiplier", stop_multiplier)?;
            non_negative("atr_take_profit_multiplier", take_profit_multiplier)?;
        }
        ExitPolicy::Staged {
            stop_multiplier,
            risk_reward_ratio,
            trail,
        } => {
            if !(stop_multiplier > 0.0) {
                return Err(invalid(
                    "strategy",
                    "atr_stop_multiplier",
                    "staged exit requires a positive atr_stop_multiplier",
                ));
            }
            non_negative("risk_reward_ratio", risk_reward_ratio)?;
            if let TrailMode::Atr { multiplier } = trail {
                non_negative("atr_trail_multiplier", multiplier)?;
            }
        }
    }
    Ok(())
}

fn non_negative(key: &str, value: f64) -> Result<(), TrendpilotError> {
    if !(value >= 0.0) {
        return Err(invalid(
            "strategy",
            key,
            &format!("{key} must be non-negative"),
        ));
    }
    Ok(())
}

fn invalid(section: &str, key: &str, reason: &str) -> TrendpilotError {
    TrendpilotError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
