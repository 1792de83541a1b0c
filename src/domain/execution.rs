//! Fills, fees, slippage and position sizing.
//!
//! Every opening or closing event becomes a [`Fill`]. A fill carries the
//! pre-fee P&L of the closed portion and the fee charged on it, so the
//! realized return of a position is always the sum of its fills.

use chrono::NaiveDateTime;
use std::fmt;

use crate::domain::config::SimulationConfig;
use crate::domain::position::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillKind {
    Entry,
    /// Zero-based index into the configured tier list.
    TakeProfitTier(usize),
    RsiScaleOut,
    TrailingStop,
    StopLoss,
    TakeProfit,
}

impl fmt::Display for FillKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillKind::Entry => write!(f, "entry"),
            FillKind::TakeProfitTier(i) => write!(f, "tp{}", i + 1),
            FillKind::RsiScaleOut => write!(f, "rsi"),
            FillKind::TrailingStop => write!(f, "trailing_stop"),
            FillKind::StopLoss => write!(f, "stop_loss"),
            FillKind::TakeProfit => write!(f, "take_profit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub kind: FillKind,
    pub size: f64,
    pub price: f64,
    /// (price - entry) x size x side sign; zero for the entry fill.
    pub gross_pnl: f64,
    /// Always non-negative.
    pub fee: f64,
    pub at: NaiveDateTime,
}

impl Fill {
    pub fn net(&self) -> f64 {
        self.gross_pnl - self.fee
    }
}

/// fee = size x price x rate
pub fn calculate_fee(size: f64, price: f64, rate: f64) -> f64 {
    size.abs() * price * rate
}

/// Entry price nudged against the trader: LONG fills below the open,
/// SHORT above it.
pub fn apply_entry_slippage(side: Side, market_price: f64, slippage_pct: f64) -> f64 {
    side.adverse_offset(market_price, slippage_pct)
}

/// Units to trade so that a full stop-out costs `percentage_per_trade`
/// percent of `capital_basis`, scaled by `weight`.
///
/// size = capital_basis / stop_loss_pct / entry_price x percentage_per_trade x weight
pub fn position_size(
    capital_basis: f64,
    entry_price: f64,
    weight: f64,
    config: &SimulationConfig,
) -> f64 {
    capital_basis / config.stop_loss_pct / entry_price * config.percentage_per_trade * weight
}

/// The opening fill: no P&L, limit-rate fee on the full notional.
pub fn open_fill(size: f64, entry_price: f64, at: NaiveDateTime, config: &SimulationConfig) -> Fill {
    Fill {
        kind: FillKind::Entry,
        size,
        price: entry_price,
        gross_pnl: 0.0,
        fee: calculate_fee(size, entry_price, config.fees.limit_rate),
        at,
    }
}

/// Close `size` units of a position opened at `entry_price`.
///
/// Steps:
/// 1. Gross P&L from the price move, signed by side
/// 2. Fee on the closed notional at `rate`
pub fn close_fill(
    kind: FillKind,
    side: Side,
    entry_price: f64,
    size: f64,
    price: f64,
    rate: f64,
    at: NaiveDateTime,
) -> Fill {
    Fill {
        kind,
        size,
        price,
        gross_pnl: side.pnl(entry_price, price, size),
        fee: calculate_fee(size, price, rate),
        at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(2, 5, 0)
            .unwrap()
    }

    #[test]
    fn fee_basic() {
        assert_relative_eq!(calculate_fee(2.0, 100.0, 0.0006), 0.12);
    }

    #[test]
    fn fee_is_non_negative_for_any_size_sign() {
        assert!(calculate_fee(-3.0, 50.0, 0.0002) >= 0.0);
    }

    #[test]
    fn slippage_long_buys_below_open() {
        assert_relative_eq!(apply_entry_slippage(Side::Long, 100.0, 0.01), 99.99);
    }

    #[test]
    fn slippage_short_sells_above_open() {
        assert_relative_eq!(apply_entry_slippage(Side::Short, 100.0, 0.01), 100.01);
    }

    #[test]
    fn zero_slippage_is_identity() {
        assert_eq!(apply_entry_slippage(Side::Long, 123.4, 0.0), 123.4);
    }

    #[test]
    fn size_formula() {
        let config = SimulationConfig {
            stop_loss_pct: 0.5,
            percentage_per_trade: 2.0,
            ..SimulationConfig::default()
        };
        // 10000 / 0.5 / 200 * 2 * 0.5 = 100
        assert_relative_eq!(position_size(10_000.0, 200.0, 0.5, &config), 100.0);
    }

    #[test]
    fn open_fill_uses_limit_rate() {
        let config = SimulationConfig::default();
        let fill = open_fill(10.0, 100.0, at(), &config);
        assert_eq!(fill.kind, FillKind::Entry);
        assert_eq!(fill.gross_pnl, 0.0);
        assert_relative_eq!(fill.fee, 10.0 * 100.0 * config.fees.limit_rate);
    }

    #[test]
    fn close_fill_short_profit() {
        let fill = close_fill(FillKind::TakeProfit, Side::Short, 100.0, 5.0, 96.0, 0.0002, at());
        assert_relative_eq!(fill.gross_pnl, 20.0);
        assert_relative_eq!(fill.fee, 5.0 * 96.0 * 0.0002);
        assert_relative_eq!(fill.net(), 20.0 - 0.096);
    }

    #[test]
    fn fill_kind_labels() {
        assert_eq!(FillKind::TakeProfitTier(0).to_string(), "tp1");
        assert_eq!(FillKind::RsiScaleOut.to_string(), "rsi");
    }
}
