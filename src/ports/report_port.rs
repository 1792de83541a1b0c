//! Report generation port trait.

use std::path::Path;

use crate::domain::algorithm_input::HourScore;
use crate::domain::backtest::{HourComparison, RunResult};
use crate::domain::error::LiqsimError;
use crate::domain::metrics::{BucketStats, RollingWindow, Summary};
use crate::domain::portfolio::EquityPoint;

/// Everything a what-if report presents.
pub struct RunReport<'a> {
    pub result: &'a RunResult,
    pub summary: &'a Summary,
    /// Forward-filled daily curve.
    pub equity_curve: &'a [EquityPoint],
    pub hourly: &'a [BucketStats],
    pub weekdays: &'a [BucketStats],
    pub rolling: &'a [RollingWindow],
}

/// Port for writing run output. Rounding for display happens here, never
/// in the domain.
pub trait ReportPort {
    fn write_run(&self, report: &RunReport<'_>, output_dir: &Path) -> Result<(), LiqsimError>;

    fn write_per_hour(&self, rows: &[HourComparison], output_path: &Path) -> Result<(), LiqsimError>;

    fn write_algorithm_input(&self, rows: &[HourScore], output_path: &Path) -> Result<(), LiqsimError>;
}
