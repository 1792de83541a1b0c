//! Indicator helpers feeding exit decisions.
//!
//! Each indicator is a pure function over a trailing candle window and
//! returns a single value. Windows that are too short fail with
//! [`IndicatorError::InsufficientData`]; callers skip the decision rather
//! than guess.

pub mod rsi;
pub mod sma;

pub use rsi::relative_strength_index;
pub use sma::simple_moving_average;

use crate::domain::candle::Candle;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndicatorError {
    #[error("insufficient data: need {required} candles, got {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("indicator period must be positive")]
    ZeroPeriod,
}

/// How per-candle price changes are measured for RSI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeBasis {
    /// close[i] - close[i-1]; needs period + 1 candles.
    CloseToClose,
    /// close[i] - open[i]; needs period candles.
    OpenToClose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
}

impl PriceField {
    pub fn of(self, candle: &Candle) -> f64 {
        match self {
            PriceField::Open => candle.open,
            PriceField::High => candle.high,
            PriceField::Low => candle.low,
            PriceField::Close => candle.close,
        }
    }
}
