//! Simple moving average of one price field.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorError, PriceField};

/// Mean of `field` over the last `period` candles.
///
/// Callers may pass a longer history; only the trailing `period` candles
/// count and anything earlier is ignored.
pub fn simple_moving_average(
    candles: &[Candle],
    period: usize,
    field: PriceField,
) -> Result<f64, IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::ZeroPeriod);
    }
    if candles.len() < period {
        return Err(IndicatorError::InsufficientData {
            required: period,
            available: candles.len(),
        });
    }

    let window = &candles[candles.len() - period..];
    let sum: f64 = window.iter().map(|c| field.of(c)).sum();
    Ok(sum / period as f64)
}
