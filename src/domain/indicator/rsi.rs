//! RSI (Relative Strength Index) over a trailing window.
//!
//! Simple averaging, not Wilder smoothing: gains and losses over the last
//! `period` changes are each summed and divided by `period`.
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100

use crate::domain::candle::Candle;
use crate::domain::indicator::{ChangeBasis, IndicatorError};

pub fn relative_strength_index(
    candles: &[Candle],
    period: usize,
    basis: ChangeBasis,
) -> Result<f64, IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::ZeroPeriod);
    }

    let required = match basis {
        ChangeBasis::CloseToClose => period + 1,
        ChangeBasis::OpenToClose => period,
    };
    if candles.len() < required {
        return Err(IndicatorError::InsufficientData {
            required,
            available: candles.len(),
        });
    }

    let window = &candles[candles.len() - required..];
    let changes: Vec<f64> = match basis {
        ChangeBasis::CloseToClose => window.windows(2).map(|w| w[1].close - w[0].close).collect(),
        ChangeBasis::OpenToClose => window.iter().map(Candle::body).collect(),
    };

    let gain_sum: f64 = changes.iter().filter(|c| **c > 0.0).sum();
    let loss_sum: f64 = changes.iter().filter(|c| **c < 0.0).map(|c| -c).sum();

    let avg_gain = gain_sum / period as f64;
    let avg_loss = loss_sum / period as f64;

    if avg_loss == 0.0 {
        return Ok(100.0);
    }
    Ok(100.0 - (100.0 / (1.0 + avg_gain / avg_loss)))
}
