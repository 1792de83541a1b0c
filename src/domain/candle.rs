//! Price candles and ordered candle series.

use chrono::NaiveDateTime;

use crate::domain::error::LiqsimError;

#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub symbol: String,
    pub timeframe: String,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// close - open
    pub fn body(&self) -> f64 {
        self.close - self.open
    }

    /// Rejects candles whose prices cannot describe a real bar.
    pub fn validate(&self) -> Result<(), LiqsimError> {
        let prices = [self.open, self.high, self.low, self.close];
        let reason = if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            Some("prices must be finite and positive")
        } else if self.high < self.low {
            Some("high is below low")
        } else if self.open > self.high
            || self.close > self.high
            || self.open < self.low
            || self.close < self.low
        {
            Some("open/close outside the high-low range")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(LiqsimError::InvalidCandle {
                symbol: self.symbol.clone(),
                timestamp: self.timestamp,
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Candles for one (symbol, timeframe), ascending and unique by timestamp.
#[derive(Debug, Clone, Default)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(mut candles: Vec<Candle>) -> Self {
        candles.sort_by_key(|c| c.timestamp);
        candles.dedup_by_key(|c| c.timestamp);
        Self { candles }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    /// Candles with `start <= timestamp < end`.
    pub fn window(&self, start: NaiveDateTime, end: NaiveDateTime) -> &[Candle] {
        let lo = self.candles.partition_point(|c| c.timestamp < start);
        let hi = self.candles.partition_point(|c| c.timestamp < end);
        if lo >= hi {
            &[]
        } else {
            &self.candles[lo..hi]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn make_candle(timestamp: NaiveDateTime, open: f64, close: f64) -> Candle {
        Candle {
            symbol: "BTCUSDT".into(),
            timeframe: "5m".into(),
            timestamp,
            open,
            high: open.max(close) + 1.0,
            low: open.min(close) - 1.0,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn body_is_signed() {
        assert!((make_candle(ts(1, 0, 0), 100.0, 102.0).body() - 2.0).abs() < f64::EPSILON);
        assert!((make_candle(ts(1, 0, 0), 100.0, 97.0).body() + 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn validate_rejects_inverted_range() {
        let mut candle = make_candle(ts(1, 0, 0), 100.0, 101.0);
        candle.high = 90.0;
        let err = candle.validate().unwrap_err();
        assert!(matches!(err, LiqsimError::InvalidCandle { .. }));
    }

    #[test]
    fn validate_rejects_non_finite() {
        let mut candle = make_candle(ts(1, 0, 0), 100.0, 101.0);
        candle.close = f64::NAN;
        assert!(candle.validate().is_err());
    }

    #[test]
    fn validate_accepts_regular_candle() {
        assert!(make_candle(ts(1, 0, 0), 100.0, 101.0).validate().is_ok());
    }

    #[test]
    fn series_sorts_and_dedups() {
        let series = CandleSeries::new(vec![
            make_candle(ts(1, 0, 10), 3.0, 3.0),
            make_candle(ts(1, 0, 0), 1.0, 1.0),
            make_candle(ts(1, 0, 5), 2.0, 2.0),
            make_candle(ts(1, 0, 5), 9.0, 9.0),
        ]);
        assert_eq!(series.len(), 3);
        let opens: Vec<f64> = series.candles().iter().map(|c| c.open).collect();
        assert_eq!(opens, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn window_is_half_open() {
        let series = CandleSeries::new(
            (0..6)
                .map(|i| make_candle(ts(1, 0, i * 5), 100.0, 100.0))
                .collect(),
        );
        let window = series.window(ts(1, 0, 5), ts(1, 0, 20));
        assert_eq!(window.len(), 3);
        assert_eq!(window[0].timestamp, ts(1, 0, 5));
        assert_eq!(window[2].timestamp, ts(1, 0, 15));
    }

    #[test]
    fn window_outside_range_is_empty() {
        let series = CandleSeries::new(vec![make_candle(ts(1, 0, 0), 100.0, 100.0)]);
        assert!(series.window(ts(2, 0, 0), ts(3, 0, 0)).is_empty());
        assert!(series.window(ts(1, 0, 5), ts(1, 0, 0)).is_empty());
    }
}
