//! Position sizing weight port.

use chrono::NaiveDate;

use crate::domain::position::StrategyTag;

pub trait WeightLookup {
    /// Sizing weight for positions triggered at `hour` (0..=23).
    ///
    /// `None` or a non-positive weight means the hour is not traded.
    fn weight(&self, hour: u32, strategy: StrategyTag, as_of: NaiveDate) -> Option<f64>;
}

/// Trades every hour at full size.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformWeight;

impl WeightLookup for UniformWeight {
    fn weight(&self, _hour: u32, _strategy: StrategyTag, _as_of: NaiveDate) -> Option<f64> {
        Some(1.0)
    }
}
