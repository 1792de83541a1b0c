#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
pub use liqsim::domain::candle::Candle;
use liqsim::domain::error::LiqsimError;
use liqsim::domain::filter::PositionFilter;
pub use liqsim::domain::position::{CandidatePosition, LiquidationContext, Side, StrategyTag};
use liqsim::ports::data_port::{CandleSource, PositionSource};
use std::cell::Cell;
use std::collections::HashMap;

pub const SYMBOL: &str = "BTCUSDT";
pub const TIMEFRAME: &str = "5m";

pub struct MockCandleSource {
    pub data: HashMap<String, Vec<Candle>>,
    pub errors: HashMap<String, String>,
}

impl MockCandleSource {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_candles(mut self, symbol: &str, candles: Vec<Candle>) -> Self {
        self.data.insert(symbol.to_string(), candles);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl CandleSource for MockCandleSource {
    fn fetch_candles(
        &self,
        symbol: &str,
        _timeframe: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Candle>, LiqsimError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(LiqsimError::Database {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(symbol)
            .map(|candles| {
                candles
                    .iter()
                    .filter(|c| c.timestamp >= start && c.timestamp < end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Counts reads so tests can assert on caching.
pub struct CountingSource<S> {
    pub inner: S,
    pub calls: Cell<usize>,
}

impl<S: CandleSource> CountingSource<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: Cell::new(0),
        }
    }
}

impl<S: CandleSource> CandleSource for CountingSource<S> {
    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Candle>, LiqsimError> {
        self.calls.set(self.calls.get() + 1);
        self.inner.fetch_candles(symbol, timeframe, start, end)
    }
}

pub struct MockPositionSource {
    pub positions: Vec<CandidatePosition>,
}

impl PositionSource for MockPositionSource {
    fn fetch_positions(&self, filter: &PositionFilter) -> Result<Vec<CandidatePosition>, LiqsimError> {
        Ok(filter.apply(self.positions.clone()))
    }
}

/// 2024-01-15 00:00 (a Monday) plus `i` five-minute steps.
pub fn ts(i: i64) -> NaiveDateTime {
    base_date().and_hms_opt(0, 0, 0).unwrap() + TimeDelta::minutes(5 * i)
}

pub fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
}

pub fn make_candle(i: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
    Candle {
        symbol: SYMBOL.to_string(),
        timeframe: TIMEFRAME.to_string(),
        timestamp: ts(i),
        open,
        high,
        low,
        close,
        volume: 1.0,
    }
}

/// Candle that opens at `open`, closes at `close` and has a wick of `wick`
/// beyond both.
pub fn bar(i: i64, open: f64, close: f64, wick: f64) -> Candle {
    make_candle(i, open, open.max(close) + wick, open.min(close) - wick, close)
}

/// Flat candles from `from` (inclusive) to `to` (exclusive) at `price`.
pub fn flat(from: i64, to: i64, price: f64) -> Vec<Candle> {
    (from..to).map(|i| bar(i, price, price, 0.05)).collect()
}

pub fn make_position(id: u64, start: i64, side: Side) -> CandidatePosition {
    CandidatePosition {
        id,
        symbol: SYMBOL.to_string(),
        timeframe: TIMEFRAME.to_string(),
        side,
        start: ts(start),
        strategy: StrategyTag::Live,
        liquidation: LiquidationContext {
            triggered_at: ts(start - 1),
            amount: 10_000,
            count: 1,
        },
        candles_before_entry: Some(2),
    }
}

pub fn tagged(mut position: CandidatePosition, strategy: StrategyTag) -> CandidatePosition {
    position.strategy = strategy;
    position
}
