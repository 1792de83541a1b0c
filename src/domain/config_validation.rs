//! Configuration validation.
//!
//! Checks a [`SimulationConfig`] before any position is simulated. Each rule
//! fails fast with `ConfigInvalid` naming the INI section and key.

use chrono::{NaiveDateTime, TimeDelta};

use crate::domain::config::{MAX_TAKE_PROFIT_TIERS, SimulationConfig};
use crate::domain::error::LiqsimError;

/// Longest day span accepted for horizons, lookbacks and rolling windows.
pub const MAX_WINDOW_DAYS: i64 = 3650;

pub fn validate_simulation_config(config: &SimulationConfig) -> Result<(), LiqsimError> {
    validate_stop_loss(config)?;
    validate_take_profit(config)?;
    validate_tiers(config)?;
    validate_trailing_stop(config)?;
    validate_breakeven(config)?;
    validate_rsi(config)?;
    validate_sizing(config)?;
    validate_horizon(config)?;
    validate_fees(config)?;
    Ok(())
}

/// `days` must lie in `1..=MAX_WINDOW_DAYS`.
pub fn require_days(section: &str, key: &str, days: i64) -> Result<(), LiqsimError> {
    if !(1..=MAX_WINDOW_DAYS).contains(&days) {
        return Err(LiqsimError::invalid(
            section,
            key,
            format!("{key} must be between 1 and {MAX_WINDOW_DAYS} days"),
        ));
    }
    Ok(())
}

/// `at` shifted by `days`, or `ConfigInvalid` on overflow.
pub fn offset_days(at: NaiveDateTime, days: i64, section: &str, key: &str) -> Result<NaiveDateTime, LiqsimError> {
    TimeDelta::try_days(days)
        .and_then(|delta| at.checked_add_signed(delta))
        .ok_or_else(|| LiqsimError::invalid(section, key, format!("{key} moves {at} out of range")))
}

fn require_finite(section: &str, key: &str, value: f64) -> Result<(), LiqsimError> {
    if !value.is_finite() {
        return Err(LiqsimError::invalid(section, key, format!("{key} must be finite")));
    }
    Ok(())
}

fn require_positive(section: &str, key: &str, value: f64) -> Result<(), LiqsimError> {
    require_finite(section, key, value)?;
    if value <= 0.0 {
        return Err(LiqsimError::invalid(section, key, format!("{key} must be positive")));
    }
    Ok(())
}

fn require_percentage(section: &str, key: &str, value: f64) -> Result<(), LiqsimError> {
    require_positive(section, key, value)?;
    if value > 100.0 {
        return Err(LiqsimError::invalid(
            section,
            key,
            format!("{key} must be in (0, 100]"),
        ));
    }
    Ok(())
}

fn validate_stop_loss(config: &SimulationConfig) -> Result<(), LiqsimError> {
    require_positive("simulation", "stop_loss", config.stop_loss_pct)
}

fn validate_take_profit(config: &SimulationConfig) -> Result<(), LiqsimError> {
    require_positive("simulation", "take_profit", config.take_profit_pct)
}

fn validate_tiers(config: &SimulationConfig) -> Result<(), LiqsimError> {
    if config.take_profit_tiers.len() > MAX_TAKE_PROFIT_TIERS {
        return Err(LiqsimError::invalid(
            "take_profit_tiers",
            "tiers",
            format!("at most {MAX_TAKE_PROFIT_TIERS} tiers are supported"),
        ));
    }
    for (i, tier) in config.take_profit_tiers.iter().enumerate() {
        let n = i + 1;
        require_positive("take_profit_tiers", &format!("tp{n}"), tier.trigger_pct)?;
        require_percentage("take_profit_tiers", &format!("tp{n}_amount"), tier.amount_pct)?;
    }
    Ok(())
}

fn validate_trailing_stop(config: &SimulationConfig) -> Result<(), LiqsimError> {
    match config.trailing_stop {
        Some(trailing) => {
            require_positive("trailing_stop", "pct", trailing.pct)?;
            if trailing.pct >= 100.0 {
                return Err(LiqsimError::invalid(
                    "trailing_stop",
                    "pct",
                    "pct must be below 100",
                ));
            }
            Ok(())
        }
        None => Ok(()),
    }
}

fn validate_breakeven(config: &SimulationConfig) -> Result<(), LiqsimError> {
    match config.breakeven {
        Some(be) => require_positive("breakeven", "trigger_pct", be.trigger_pct),
        None => Ok(()),
    }
}

fn validate_rsi(config: &SimulationConfig) -> Result<(), LiqsimError> {
    let Some(rsi) = config.rsi else {
        return Ok(());
    };
    for (key, value) in [("lower", rsi.lower), ("upper", rsi.upper)] {
        require_finite("rsi", key, value)?;
        if !(0.0..=100.0).contains(&value) {
            return Err(LiqsimError::invalid("rsi", key, format!("{key} must be in [0, 100]")));
        }
    }
    if rsi.lower >= rsi.upper {
        return Err(LiqsimError::invalid("rsi", "lower", "lower must be below upper"));
    }
    require_percentage("rsi", "sell_pct", rsi.sell_pct)?;
    require_positive("rsi", "activation_pct", rsi.activation_pct)?;
    if rsi.period == 0 {
        return Err(LiqsimError::invalid("rsi", "period", "period must be positive"));
    }
    Ok(())
}

fn validate_sizing(config: &SimulationConfig) -> Result<(), LiqsimError> {
    require_positive("simulation", "initial_capital", config.initial_capital)?;
    require_positive("simulation", "percentage_per_trade", config.percentage_per_trade)?;
    require_finite("simulation", "slippage_pct", config.slippage_pct)?;
    if config.slippage_pct < 0.0 || config.slippage_pct >= 100.0 {
        return Err(LiqsimError::invalid(
            "simulation",
            "slippage_pct",
            "slippage_pct must be in [0, 100)",
        ));
    }
    Ok(())
}

fn validate_horizon(config: &SimulationConfig) -> Result<(), LiqsimError> {
    require_days("simulation", "horizon_days", config.horizon_days)
}

fn validate_fees(config: &SimulationConfig) -> Result<(), LiqsimError> {
    for (key, rate) in [
        ("limit_rate", config.fees.limit_rate),
        ("market_rate", config.fees.market_rate),
    ] {
        require_finite("fees", key, rate)?;
        if !(0.0..1.0).contains(&rate) {
            return Err(LiqsimError::invalid("fees", key, format!("{key} must be in [0, 1)")));
        }
    }
    Ok(())
}
