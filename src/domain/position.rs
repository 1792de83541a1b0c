//! Position sides, candidate positions and closed position results.
//!
//! All direction-dependent price arithmetic goes through [`Side`]: a LONG
//! profits when price rises, a SHORT when it falls, and every helper below is
//! written once in terms of [`Side::sign`].

use chrono::NaiveDateTime;
use std::fmt;
use std::str::FromStr;

use crate::domain::candle::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for LONG, -1 for SHORT.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn reversed(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// `price` moved `pct` percent in the profitable direction.
    pub fn favorable_offset(self, price: f64, pct: f64) -> f64 {
        price + self.sign() * price * pct / 100.0
    }

    /// `price` moved `pct` percent in the losing direction.
    pub fn adverse_offset(self, price: f64, pct: f64) -> f64 {
        price - self.sign() * price * pct / 100.0
    }

    /// High for LONG, low for SHORT.
    pub fn favorable_extreme(self, candle: &Candle) -> f64 {
        match self {
            Side::Long => candle.high,
            Side::Short => candle.low,
        }
    }

    /// Low for LONG, high for SHORT.
    pub fn adverse_extreme(self, candle: &Candle) -> f64 {
        match self {
            Side::Long => candle.low,
            Side::Short => candle.high,
        }
    }

    /// `price` is at or beyond `level` in the profitable direction.
    pub fn reached(self, price: f64, level: f64) -> bool {
        self.sign() * (price - level) >= 0.0
    }

    /// `price` is strictly beyond `level` in the profitable direction.
    pub fn beyond(self, price: f64, level: f64) -> bool {
        self.sign() * (price - level) > 0.0
    }

    /// `price` is at or beyond `level` in the losing direction.
    pub fn breached(self, price: f64, level: f64) -> bool {
        self.sign() * (price - level) <= 0.0
    }

    /// The stop level closer to locking in profit.
    pub fn tighter(self, a: f64, b: f64) -> f64 {
        match self {
            Side::Long => a.max(b),
            Side::Short => a.min(b),
        }
    }

    /// Signed profit of moving `size` units from `entry` to `exit`.
    pub fn pnl(self, entry: f64, exit: f64, size: f64) -> f64 {
        self.sign() * (exit - entry) * size
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LONG" | "BUY" => Ok(Side::Long),
            "SHORT" | "SELL" => Ok(Side::Short),
            other => Err(format!("unknown side '{other}'")),
        }
    }
}

/// Which signal family produced a candidate position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StrategyTag {
    Live,
    Reversed,
    Journaling,
}

impl StrategyTag {
    pub const ALL: [StrategyTag; 3] = [StrategyTag::Live, StrategyTag::Reversed, StrategyTag::Journaling];

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyTag::Live => "live",
            StrategyTag::Reversed => "reversed",
            StrategyTag::Journaling => "journaling",
        }
    }
}

impl fmt::Display for StrategyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "live" => Ok(StrategyTag::Live),
            "reversed" => Ok(StrategyTag::Reversed),
            "journaling" => Ok(StrategyTag::Journaling),
            other => Err(format!("unknown strategy tag '{other}'")),
        }
    }
}

/// The liquidation event a candidate was derived from. Only used for
/// filtering and bucketing.
#[derive(Debug, Clone, PartialEq)]
pub struct LiquidationContext {
    pub triggered_at: NaiveDateTime,
    pub amount: i64,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePosition {
    pub id: u64,
    pub symbol: String,
    pub timeframe: String,
    pub side: Side,
    pub start: NaiveDateTime,
    pub strategy: StrategyTag,
    pub liquidation: LiquidationContext,
    pub candles_before_entry: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Loss,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Win => write!(f, "WIN"),
            Outcome::Loss => write!(f, "LOSS"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    TrailingStop,
    StopLoss,
    TakeProfit,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::TrailingStop => write!(f, "trailing_stop"),
            ExitReason::StopLoss => write!(f, "stop_loss"),
            ExitReason::TakeProfit => write!(f, "take_profit"),
        }
    }
}

/// A simulated position that reached a terminal exit.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedPosition {
    pub position_id: u64,
    pub symbol: String,
    /// Side actually traded, after any reversal.
    pub side: Side,
    pub strategy: StrategyTag,
    pub start: NaiveDateTime,
    pub liquidation_at: NaiveDateTime,
    pub entry_price: f64,
    pub size: f64,
    pub closing_price: f64,
    /// Signed and fee-inclusive.
    pub realized_return: f64,
    pub fees: f64,
    pub outcome: Outcome,
    pub exit_reason: ExitReason,
    pub closed_at: NaiveDateTime,
}

impl ClosedPosition {
    pub fn is_win(&self) -> bool {
        self.outcome == Outcome::Win
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_candle() -> Candle {
        Candle {
            symbol: "BTCUSDT".into(),
            timeframe: "5m".into(),
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            open: 100.0,
            high: 110.0,
            low: 90.0,
            close: 105.0,
            volume: 1.0,
        }
    }

    #[test]
    fn offsets_mirror_by_side() {
        assert!((Side::Long.favorable_offset(100.0, 4.0) - 104.0).abs() < 1e-9);
        assert!((Side::Short.favorable_offset(100.0, 4.0) - 96.0).abs() < 1e-9);
        assert!((Side::Long.adverse_offset(100.0, 1.0) - 99.0).abs() < 1e-9);
        assert!((Side::Short.adverse_offset(100.0, 1.0) - 101.0).abs() < 1e-9);
    }

    #[test]
    fn extremes_by_side() {
        let candle = sample_candle();
        assert_eq!(Side::Long.favorable_extreme(&candle), 110.0);
        assert_eq!(Side::Long.adverse_extreme(&candle), 90.0);
        assert_eq!(Side::Short.favorable_extreme(&candle), 90.0);
        assert_eq!(Side::Short.adverse_extreme(&candle), 110.0);
    }

    #[test]
    fn reached_and_breached() {
        assert!(Side::Long.reached(104.0, 104.0));
        assert!(!Side::Long.beyond(104.0, 104.0));
        assert!(Side::Short.reached(95.0, 96.0));
        assert!(Side::Long.breached(99.0, 99.0));
        assert!(Side::Short.breached(101.5, 101.0));
        assert!(!Side::Short.breached(100.5, 101.0));
    }

    #[test]
    fn tighter_picks_profit_locking_level() {
        assert_eq!(Side::Long.tighter(99.0, 99.5), 99.5);
        assert_eq!(Side::Short.tighter(101.0, 100.5), 100.5);
    }

    #[test]
    fn pnl_is_direction_signed() {
        assert!((Side::Long.pnl(100.0, 104.0, 2.0) - 8.0).abs() < 1e-9);
        assert!((Side::Short.pnl(100.0, 104.0, 2.0) + 8.0).abs() < 1e-9);
    }

    #[test]
    fn reversed_flips() {
        assert_eq!(Side::Long.reversed(), Side::Short);
        assert_eq!(Side::Short.reversed().reversed(), Side::Short);
    }

    #[test]
    fn parse_side_and_tag() {
        assert_eq!("long".parse::<Side>().unwrap(), Side::Long);
        assert_eq!("SHORT".parse::<Side>().unwrap(), Side::Short);
        assert!("flat".parse::<Side>().is_err());
        assert_eq!("Reversed".parse::<StrategyTag>().unwrap(), StrategyTag::Reversed);
        assert_eq!(StrategyTag::Journaling.to_string(), "journaling");
        assert!("paper".parse::<StrategyTag>().is_err());
    }
}
