//! Read-through candle cache.
//!
//! Wraps any [`CandleSource`]. After [`CandleCache::prefetch`] a request that
//! falls inside a cached span is served from memory; anything else goes to
//! the wrapped source. Lookups never mutate, so one prefetched cache can be
//! shared across parallel runs.

use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::domain::candle::{Candle, CandleSeries};
use crate::domain::config_validation::offset_days;
use crate::domain::error::LiqsimError;
use crate::domain::position::CandidatePosition;
use crate::ports::data_port::CandleSource;

struct CachedSpan {
    start: NaiveDateTime,
    end: NaiveDateTime,
    series: CandleSeries,
}

impl CachedSpan {
    fn covers(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.start <= start && end <= self.end
    }
}

pub struct CandleCache<S> {
    inner: S,
    spans: HashMap<(String, String), CachedSpan>,
}

impl<S: CandleSource> CandleCache<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            spans: HashMap::new(),
        }
    }

    /// Loads `[start, end)` for one symbol and timeframe, widening any span
    /// already held.
    pub fn prefetch(
        &mut self,
        symbol: &str,
        timeframe: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<(), LiqsimError> {
        let key = (symbol.to_string(), timeframe.to_string());
        let (start, end) = match self.spans.get(&key) {
            Some(span) if span.covers(start, end) => return Ok(()),
            Some(span) => (span.start.min(start), span.end.max(end)),
            None => (start, end),
        };

        let candles = self.inner.fetch_candles(symbol, timeframe, start, end)?;
        tracing::debug!(symbol, timeframe, %start, %end, candles = candles.len(), "prefetched candles");
        self.spans.insert(
            key,
            CachedSpan {
                start,
                end,
                series: CandleSeries::new(candles),
            },
        );
        Ok(())
    }

    /// One prefetch per symbol and timeframe covering every position's
    /// lookahead window.
    pub fn prefetch_positions(
        &mut self,
        positions: &[CandidatePosition],
        horizon_days: i64,
    ) -> Result<(), LiqsimError> {
        let mut wanted: HashMap<(&str, &str), (NaiveDateTime, NaiveDateTime)> = HashMap::new();
        for p in positions {
            let end = offset_days(p.start, horizon_days, "simulation", "horizon_days")?;
            wanted
                .entry((p.symbol.as_str(), p.timeframe.as_str()))
                .and_modify(|(lo, hi)| {
                    *lo = (*lo).min(p.start);
                    *hi = (*hi).max(end);
                })
                .or_insert((p.start, end));
        }

        for ((symbol, timeframe), (start, end)) in wanted {
            self.prefetch(symbol, timeframe, start, end)?;
        }
        Ok(())
    }

    pub fn cached_len(&self, symbol: &str, timeframe: &str) -> usize {
        self.spans
            .get(&(symbol.to_string(), timeframe.to_string()))
            .map_or(0, |span| span.series.len())
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: CandleSource> CandleSource for CandleCache<S> {
    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Candle>, LiqsimError> {
        match self.spans.get(&(symbol.to_string(), timeframe.to_string())) {
            Some(span) if span.covers(start, end) => Ok(span.series.window(start, end).to_vec()),
            _ => self.inner.fetch_candles(symbol, timeframe, start, end),
        }
    }
}
