//! SQLite data adapter for candles and candidate positions.

use crate::domain::candle::Candle;
use crate::domain::error::LiqsimError;
use crate::domain::filter::PositionFilter;
use crate::domain::position::{CandidatePosition, LiquidationContext, Side, StrategyTag};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{CandleSource, PositionSource};
use chrono::NaiveDateTime;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn pool_error(e: r2d2::Error) -> LiqsimError {
    LiqsimError::Database {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> LiqsimError {
    LiqsimError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn format_ts(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn column_ts(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(index)?;
    NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn column_parsed<T>(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.get(index)?;
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, e.into()))
}

#[derive(Clone)]
pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, LiqsimError> {
        let db_path = config
            .get_string("sqlite", "path")
            .ok_or_else(|| LiqsimError::ConfigMissing {
                section: "sqlite".into(),
                key: "path".into(),
            })?;

        let pool_size = u32::try_from(config.get_int("sqlite", "pool_size", 4)?)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| LiqsimError::invalid("sqlite", "pool_size", "pool_size must be a positive integer"))?;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, LiqsimError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(pool_error)?;
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, LiqsimError> {
        self.pool.get().map_err(pool_error)
    }

    pub fn initialize_schema(&self) -> Result<(), LiqsimError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS candles (
                    symbol TEXT NOT NULL,
                    timeframe TEXT NOT NULL,
                    timestamp TEXT NOT NULL,
                    open REAL NOT NULL,
                    high REAL NOT NULL,
                    low REAL NOT NULL,
                    close REAL NOT NULL,
                    volume REAL NOT NULL,
                    PRIMARY KEY (symbol, timeframe, timestamp)
                );
                CREATE TABLE IF NOT EXISTS positions (
                    id INTEGER PRIMARY KEY,
                    symbol TEXT NOT NULL,
                    timeframe TEXT NOT NULL,
                    side TEXT NOT NULL,
                    start TEXT NOT NULL,
                    strategy TEXT NOT NULL,
                    liquidation_at TEXT NOT NULL,
                    liquidation_amount INTEGER NOT NULL,
                    liquidation_count INTEGER NOT NULL,
                    candles_before_entry INTEGER
                );
                CREATE INDEX IF NOT EXISTS idx_positions_start ON positions(start);",
            )
            .map_err(query_error)
    }

    pub fn insert_candles(&self, candles: &[Candle]) -> Result<(), LiqsimError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;

        for candle in candles {
            tx.execute(
                "INSERT OR REPLACE INTO candles (symbol, timeframe, timestamp, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    candle.symbol,
                    candle.timeframe,
                    format_ts(candle.timestamp),
                    candle.open,
                    candle.high,
                    candle.low,
                    candle.close,
                    candle.volume
                ],
            )
            .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)
    }

    pub fn insert_positions(&self, positions: &[CandidatePosition]) -> Result<(), LiqsimError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;

        for p in positions {
            tx.execute(
                "INSERT OR REPLACE INTO positions
                 (id, symbol, timeframe, side, start, strategy, liquidation_at,
                  liquidation_amount, liquidation_count, candles_before_entry)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    p.id as i64,
                    p.symbol,
                    p.timeframe,
                    p.side.to_string(),
                    format_ts(p.start),
                    p.strategy.as_str(),
                    format_ts(p.liquidation.triggered_at),
                    p.liquidation.amount,
                    p.liquidation.count,
                    p.candles_before_entry
                ],
            )
            .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)
    }
}

impl CandleSource for SqliteAdapter {
    fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Candle>, LiqsimError> {
        let conn = self.conn()?;

        let query = "SELECT symbol, timeframe, timestamp, open, high, low, close, volume
                     FROM candles
                     WHERE symbol = ?1 AND timeframe = ?2 AND timestamp >= ?3 AND timestamp < ?4
                     ORDER BY timestamp ASC";

        let mut stmt = conn.prepare(query).map_err(query_error)?;
        let rows = stmt
            .query_map(
                params![symbol, timeframe, format_ts(start), format_ts(end)],
                |row| {
                    Ok(Candle {
                        symbol: row.get(0)?,
                        timeframe: row.get(1)?,
                        timestamp: column_ts(row, 2)?,
                        open: row.get(3)?,
                        high: row.get(4)?,
                        low: row.get(5)?,
                        close: row.get(6)?,
                        volume: row.get(7)?,
                    })
                },
            )
            .map_err(query_error)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_error)
    }
}

impl PositionSource for SqliteAdapter {
    /// Side, timeframe, start range and liquidation amount narrow the query;
    /// the remaining criteria are applied in memory.
    fn fetch_positions(&self, filter: &PositionFilter) -> Result<Vec<CandidatePosition>, LiqsimError> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(side) = filter.side {
            clauses.push("side = ?");
            values.push(Value::Text(side.to_string()));
        }
        if let Some(tf) = &filter.timeframe {
            clauses.push("timeframe = ?");
            values.push(Value::Text(tf.clone()));
        }
        if let Some(from) = filter.start_from {
            clauses.push("start >= ?");
            values.push(Value::Text(format_ts(from)));
        }
        if let Some(before) = filter.start_before {
            clauses.push("start < ?");
            values.push(Value::Text(format_ts(before)));
        }
        if let Some(min) = filter.min_liquidation_amount {
            clauses.push("liquidation_amount >= ?");
            values.push(Value::Integer(min));
        }
        if let Some(max) = filter.max_liquidation_amount {
            clauses.push("liquidation_amount <= ?");
            values.push(Value::Integer(max));
        }

        let mut query = String::from(
            "SELECT id, symbol, timeframe, side, start, strategy, liquidation_at,
                    liquidation_amount, liquidation_count, candles_before_entry
             FROM positions",
        );
        if !clauses.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&clauses.join(" AND "));
        }
        query.push_str(" ORDER BY start ASC, id ASC");

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&query).map_err(query_error)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                let id: i64 = row.get(0)?;
                Ok(CandidatePosition {
                    id: id as u64,
                    symbol: row.get(1)?,
                    timeframe: row.get(2)?,
                    side: column_parsed::<Side>(row, 3)?,
                    start: column_ts(row, 4)?,
                    strategy: column_parsed::<StrategyTag>(row, 5)?,
                    liquidation: LiquidationContext {
                        triggered_at: column_ts(row, 6)?,
                        amount: row.get(7)?,
                        count: row.get(8)?,
                    },
                    candles_before_entry: row.get(9)?,
                })
            })
            .map_err(query_error)?;

        let positions = rows.collect::<Result<Vec<_>, _>>().map_err(query_error)?;
        Ok(filter.apply(positions))
    }
}
