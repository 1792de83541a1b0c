//! Hour weights from dated algorithm-input CSV tables.
//!
//! Files are named `algorithm_input-{YYYY-MM-DD}-{tag}.csv` with columns
//! `hour,trade,weight,tp,sl`.

use crate::domain::error::LiqsimError;
use crate::domain::position::StrategyTag;
use crate::ports::weight_port::WeightLookup;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

pub const FILE_PREFIX: &str = "algorithm_input-";

type HourTable = [Option<f64>; 24];

#[derive(Debug, Deserialize)]
struct WeightRow {
    hour: u32,
    trade: bool,
    weight: Option<f64>,
}

/// `algorithm_input-2024-03-01-live.csv` -> (2024-03-01, Live)
pub fn parse_file_name(name: &str) -> Option<(NaiveDate, StrategyTag)> {
    let stem = name.strip_prefix(FILE_PREFIX)?.strip_suffix(".csv")?;
    let (date, tag) = (stem.get(..10)?, stem.get(11..)?);
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some((date, tag.parse().ok()?))
}

pub fn file_name(as_of: NaiveDate, tag: StrategyTag) -> String {
    format!("{}{}-{}.csv", FILE_PREFIX, as_of.format("%Y-%m-%d"), tag)
}

#[derive(Debug, Default)]
pub struct CsvWeightTable {
    tables: HashMap<StrategyTag, BTreeMap<NaiveDate, HourTable>>,
}

impl CsvWeightTable {
    /// Loads every algorithm-input table in `dir`. Other files are ignored.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self, LiqsimError> {
        let dir = dir.as_ref();
        let mut table = CsvWeightTable::default();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some((date, tag)) = parse_file_name(&name.to_string_lossy()) else {
                continue;
            };
            let hours = Self::read_table(&entry.path())?;
            table.tables.entry(tag).or_default().insert(date, hours);
        }

        tracing::debug!(
            dir = %dir.display(),
            tables = table.tables.values().map(BTreeMap::len).sum::<usize>(),
            "loaded weight tables"
        );
        Ok(table)
    }

    fn read_table(path: &Path) -> Result<HourTable, LiqsimError> {
        let content = fs::read_to_string(path)?;
        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut hours: HourTable = [None; 24];

        for (line, result) in rdr.deserialize::<WeightRow>().enumerate() {
            let row = match result {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!(path = %path.display(), line = line + 2, error = %e, "skipping weight row");
                    continue;
                }
            };
            let Some(slot) = hours.get_mut(row.hour as usize) else {
                tracing::warn!(path = %path.display(), hour = row.hour, "hour out of range");
                continue;
            };
            *slot = if row.trade { row.weight } else { None };
        }
        Ok(hours)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl WeightLookup for CsvWeightTable {
    /// Uses the newest table dated on or before `as_of`, falling back to the
    /// newest table overall.
    fn weight(&self, hour: u32, strategy: StrategyTag, as_of: NaiveDate) -> Option<f64> {
        let dated = self.tables.get(&strategy)?;
        let (_, hours) = dated
            .range(..=as_of)
            .next_back()
            .or_else(|| dated.last_key_value())?;
        hours.get(hour as usize).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    fn write(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(name), content).unwrap();
    }

    fn setup() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "algorithm_input-2024-03-01-live.csv",
            "hour,trade,weight,tp,sl\n2,true,0.35,5.0,1.0\n3,false,,,\n",
        );
        write(
            &dir,
            "algorithm_input-2024-04-01-live.csv",
            "hour,trade,weight,tp,sl\n2,true,0.8,4.0,0.8\n",
        );
        write(
            &dir,
            "algorithm_input-2024-03-01-reversed.csv",
            "hour,trade,weight,tp,sl\n14,true,1.0,7.0,1.4\n",
        );
        write(&dir, "notes.txt", "ignored");
        dir
    }

    #[test]
    fn parses_file_names() {
        assert_eq!(
            parse_file_name("algorithm_input-2024-03-01-reversed.csv"),
            Some((day(3, 1), StrategyTag::Reversed))
        );
        assert_eq!(parse_file_name("data-2024-03-01-live.csv"), None);
        assert_eq!(parse_file_name("algorithm_input-2024-03-01-other.csv"), None);
        assert_eq!(file_name(day(3, 1), StrategyTag::Live), "algorithm_input-2024-03-01-live.csv");
    }

    #[test]
    fn newest_table_not_after_as_of() {
        let dir = setup();
        let table = CsvWeightTable::load(dir.path()).unwrap();
        assert_eq!(table.weight(2, StrategyTag::Live, day(3, 15)), Some(0.35));
        assert_eq!(table.weight(2, StrategyTag::Live, day(4, 1)), Some(0.8));
        assert_eq!(table.weight(3, StrategyTag::Live, day(3, 15)), None);
        assert_eq!(table.weight(14, StrategyTag::Reversed, day(3, 15)), Some(1.0));
    }

    #[test]
    fn falls_back_to_newest_overall() {
        let dir = setup();
        let table = CsvWeightTable::load(dir.path()).unwrap();
        assert_eq!(table.weight(2, StrategyTag::Live, day(1, 1)), Some(0.8));
    }

    #[test]
    fn unknown_strategy_not_traded() {
        let dir = setup();
        let table = CsvWeightTable::load(dir.path()).unwrap();
        assert_eq!(table.weight(2, StrategyTag::Journaling, day(3, 15)), None);
    }

    #[test]
    fn missing_dir_is_io_error() {
        let err = CsvWeightTable::load("/nonexistent/liqsim/weights").unwrap_err();
        assert!(matches!(err, LiqsimError::Io(_)));
    }
}
