//! CSV file data adapters for candles and candidate positions.

use crate::domain::candle::Candle;
use crate::domain::error::LiqsimError;
use crate::domain::filter::PositionFilter;
use crate::domain::position::{CandidatePosition, LiquidationContext};
use crate::ports::data_port::{CandleSource, PositionSource};
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .map_err(|e| format!("invalid timestamp '{raw}': {e}"))
}

#[derive(Debug, Deserialize)]
struct CandleRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// One file per symbol and timeframe: `{symbol}_{timeframe}.csv`.
pub struct CsvCandleAdapter {
    base_path: PathBuf,
}

impl CsvCandleAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str, timeframe: &str) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", symbol, timeframe))
    }
}

impl CandleSource for CsvCandleAdapter {
    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Candle>, LiqsimError> {
        let path = self.csv_path(symbol, timeframe);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "no candle file");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(LiqsimError::Database {
                    reason: format!("failed to read {}: {}", path.display(), e),
                });
            }
        };

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut candles = Vec::new();

        for (line, result) in rdr.deserialize::<CandleRow>().enumerate() {
            let row = match result {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!(path = %path.display(), line = line + 2, error = %e, "skipping candle row");
                    continue;
                }
            };
            let timestamp = match parse_timestamp(&row.timestamp) {
                Ok(ts) => ts,
                Err(reason) => {
                    tracing::warn!(path = %path.display(), line = line + 2, %reason, "skipping candle row");
                    continue;
                }
            };

            if timestamp < start || timestamp >= end {
                continue;
            }

            candles.push(Candle {
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
                timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }

        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }
}

#[derive(Debug, Deserialize)]
struct PositionRow {
    id: u64,
    symbol: String,
    timeframe: String,
    side: String,
    start: String,
    strategy: String,
    liquidation_at: String,
    liquidation_amount: i64,
    liquidation_count: u32,
    candles_before_entry: Option<u32>,
}

impl PositionRow {
    fn into_candidate(self) -> Result<CandidatePosition, String> {
        Ok(CandidatePosition {
            id: self.id,
            symbol: self.symbol,
            timeframe: self.timeframe,
            side: self.side.parse()?,
            start: parse_timestamp(&self.start)?,
            strategy: self.strategy.parse()?,
            liquidation: LiquidationContext {
                triggered_at: parse_timestamp(&self.liquidation_at)?,
                amount: self.liquidation_amount,
                count: self.liquidation_count,
            },
            candles_before_entry: self.candles_before_entry,
        })
    }
}

/// Candidate positions from a single CSV file, filtered in memory.
pub struct CsvPositionAdapter {
    path: PathBuf,
}

impl CsvPositionAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl PositionSource for CsvPositionAdapter {
    fn fetch_positions(&self, filter: &PositionFilter) -> Result<Vec<CandidatePosition>, LiqsimError> {
        let content = fs::read_to_string(&self.path).map_err(|e| LiqsimError::Database {
            reason: format!("failed to read {}: {}", self.path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut positions = Vec::new();

        for (line, result) in rdr.deserialize::<PositionRow>().enumerate() {
            let candidate = result
                .map_err(|e| e.to_string())
                .and_then(PositionRow::into_candidate);
            match candidate {
                Ok(candidate) => positions.push(candidate),
                Err(reason) => {
                    tracing::warn!(path = %self.path.display(), line = line + 2, %reason, "skipping position row");
                }
            }
        }

        Ok(filter.apply(positions))
    }
}
