//! Data access port traits.

use chrono::NaiveDateTime;

use crate::domain::candle::Candle;
use crate::domain::error::LiqsimError;
use crate::domain::filter::PositionFilter;
use crate::domain::position::CandidatePosition;

pub trait CandleSource {
    /// Candles with `start <= timestamp < end`, ascending.
    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Candle>, LiqsimError>;
}

pub trait PositionSource {
    /// Matching positions, ascending by start.
    fn fetch_positions(&self, filter: &PositionFilter) -> Result<Vec<CandidatePosition>, LiqsimError>;
}

impl<T: CandleSource + ?Sized> CandleSource for Box<T> {
    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Candle>, LiqsimError> {
        (**self).fetch_candles(symbol, timeframe, start, end)
    }
}
