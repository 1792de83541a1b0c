//! CSV report adapter implementing ReportPort.

use std::fs;
use std::path::Path;

use chrono::Weekday;
use serde::Serialize;

use crate::domain::algorithm_input::HourScore;
use crate::domain::backtest::HourComparison;
use crate::domain::error::LiqsimError;
use crate::domain::metrics::BucketStats;
use crate::domain::portfolio::StreakState;
use crate::ports::report_port::{ReportPort, RunReport};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn write_rows<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<(), LiqsimError> {
    let mut writer = csv::Writer::from_path(path).map_err(std::io::Error::from)?;
    for row in rows {
        writer.serialize(row).map_err(std::io::Error::from)?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct ResultRow {
    position_id: u64,
    symbol: String,
    side: String,
    strategy: &'static str,
    start: String,
    liquidation_at: String,
    entry_price: f64,
    size: f64,
    closing_price: f64,
    realized_return: f64,
    fees: f64,
    outcome: String,
    exit_reason: String,
    closed_at: String,
}

#[derive(Serialize)]
struct EquityRow {
    date: String,
    equity: f64,
}

#[derive(Serialize)]
struct SummaryRow {
    metric: &'static str,
    value: String,
}

#[derive(Serialize)]
struct BucketRow {
    bucket: String,
    trades: u32,
    wins: u32,
    losses: u32,
    ratio_pct: f64,
    longest_win_streak: u32,
    longest_loss_streak: u32,
    r_multiple: f64,
    net_return: f64,
}

impl BucketRow {
    fn new(bucket: String, stats: &BucketStats) -> Self {
        BucketRow {
            bucket,
            trades: stats.trades,
            wins: stats.wins,
            losses: stats.losses,
            ratio_pct: round2(stats.ratio * 100.0),
            longest_win_streak: stats.longest_win_streak,
            longest_loss_streak: stats.longest_loss_streak,
            r_multiple: round2(stats.r_multiple),
            net_return: round2(stats.net_return),
        }
    }
}

#[derive(Serialize)]
struct PerHourRow {
    hour: u32,
    live_trades: u32,
    live_ratio_pct: f64,
    live_r: f64,
    reversed_trades: u32,
    reversed_ratio_pct: f64,
    reversed_r: f64,
}

#[derive(Serialize)]
struct AlgorithmRow {
    hour: u32,
    trade: bool,
    weight: Option<f64>,
    tp: Option<f64>,
    sl: Option<f64>,
}

fn streak_label(streak: StreakState) -> String {
    match streak {
        StreakState::None => "none".into(),
        StreakState::Winning(n) => format!("winning {n}"),
        StreakState::Losing(n) => format!("losing {n}"),
    }
}

pub struct CsvReportAdapter;

impl ReportPort for CsvReportAdapter {
    fn write_run(&self, report: &RunReport<'_>, output_dir: &Path) -> Result<(), LiqsimError> {
        fs::create_dir_all(output_dir)?;

        let results = report.result.results.iter().map(|r| ResultRow {
            position_id: r.position_id,
            symbol: r.symbol.clone(),
            side: r.side.to_string(),
            strategy: r.strategy.as_str(),
            start: r.start.format(TIMESTAMP_FORMAT).to_string(),
            liquidation_at: r.liquidation_at.format(TIMESTAMP_FORMAT).to_string(),
            entry_price: round2(r.entry_price),
            size: r.size,
            closing_price: round2(r.closing_price),
            realized_return: round2(r.realized_return),
            fees: round2(r.fees),
            outcome: r.outcome.to_string(),
            exit_reason: r.exit_reason.to_string(),
            closed_at: r.closed_at.format(TIMESTAMP_FORMAT).to_string(),
        });
        write_rows(&output_dir.join("results.csv"), results)?;

        let equity = report.equity_curve.iter().map(|p| EquityRow {
            date: p.date.format("%Y-%m-%d").to_string(),
            equity: round2(p.equity),
        });
        write_rows(&output_dir.join("equity.csv"), equity)?;

        let s = report.summary;
        let summary = [
            ("trades", s.trades.to_string()),
            ("wins", s.wins.to_string()),
            ("losses", s.losses.to_string()),
            ("ratio_pct", round2(s.ratio * 100.0).to_string()),
            ("initial_capital", round2(s.initial_capital).to_string()),
            ("final_capital", round2(s.final_capital).to_string()),
            ("total_return", round2(s.total_return).to_string()),
            ("average_return", round2(s.average_return).to_string()),
            ("reward_per_trade_pct", round2(s.reward_per_trade).to_string()),
            ("longest_win_streak", s.longest_win_streak.to_string()),
            ("longest_loss_streak", s.longest_loss_streak.to_string()),
            ("current_streak", streak_label(s.streak)),
            ("r_multiple", round2(s.r_multiple).to_string()),
            ("skipped", report.result.skipped.len().to_string()),
            ("unclosed", report.result.unclosed.len().to_string()),
        ]
        .into_iter()
        .map(|(metric, value)| SummaryRow { metric, value });
        write_rows(&output_dir.join("summary.csv"), summary)?;

        let hourly = report
            .hourly
            .iter()
            .enumerate()
            .map(|(hour, stats)| BucketRow::new(format!("{hour:02}"), stats));
        write_rows(&output_dir.join("hourly.csv"), hourly)?;

        let weekdays = report.weekdays.iter().enumerate().map(|(i, stats)| {
            let day = Weekday::try_from(i as u8).map_or_else(|_| i.to_string(), |d| d.to_string());
            BucketRow::new(day, stats)
        });
        write_rows(&output_dir.join("weekdays.csv"), weekdays)?;

        let rolling = report
            .rolling
            .iter()
            .map(|w| BucketRow::new(format!("{}d", w.days), &w.stats));
        write_rows(&output_dir.join("rolling.csv"), rolling)?;

        tracing::info!(dir = %output_dir.display(), rows = report.result.results.len(), "report written");
        Ok(())
    }

    fn write_per_hour(&self, rows: &[HourComparison], output_path: &Path) -> Result<(), LiqsimError> {
        let rows = rows.iter().map(|r| PerHourRow {
            hour: r.hour,
            live_trades: r.live.trades,
            live_ratio_pct: round2(r.live.ratio * 100.0),
            live_r: round2(r.live.r_multiple),
            reversed_trades: r.reversed.trades,
            reversed_ratio_pct: round2(r.reversed.ratio * 100.0),
            reversed_r: round2(r.reversed.r_multiple),
        });
        write_rows(output_path, rows)
    }

    fn write_algorithm_input(&self, rows: &[HourScore], output_path: &Path) -> Result<(), LiqsimError> {
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let rows = rows.iter().map(|r| AlgorithmRow {
            hour: r.hour,
            trade: r.trade,
            weight: r.weight,
            tp: r.best.map(|(tp, _)| tp),
            sl: r.best.map(|(_, sl)| sl),
        });
        write_rows(output_path, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::csv_weight_adapter::{CsvWeightTable, file_name};
    use crate::domain::backtest::RunResult;
    use crate::domain::metrics::{RMultipleWeights, Summary, equity_curve, hourly_breakdown, weekday_breakdown};
    use crate::domain::portfolio::{EquityPoint, RunState};
    use crate::domain::position::{ClosedPosition, ExitReason, Outcome, Side, StrategyTag};
    use crate::ports::weight_port::WeightLookup;
    use chrono::{NaiveDate, NaiveDateTime};
    use tempfile::TempDir;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn sample_closed() -> ClosedPosition {
        ClosedPosition {
            position_id: 11,
            symbol: "BTCUSDT".into(),
            side: Side::Long,
            strategy: StrategyTag::Live,
            start: at(15, 2),
            liquidation_at: at(15, 1),
            entry_price: 99.99,
            size: 100.01,
            closing_price: 103.98959,
            realized_return: 395.123456,
            fees: 4.0123,
            outcome: Outcome::Win,
            exit_reason: ExitReason::TakeProfit,
            closed_at: at(15, 6),
        }
    }

    #[test]
    fn round2_rounds_half_away() {
        assert_eq!(round2(1.005_000_1), 1.01);
        assert_eq!(round2(-2.344), -2.34);
    }

    #[test]
    fn write_run_creates_all_files() {
        let dir = TempDir::new().unwrap();
        let closed = sample_closed();
        let mut run = RunState::new(10_000.0);
        run.record(&closed, None);
        let result = RunResult {
            results: vec![closed],
            run,
            equity: vec![EquityPoint {
                date: at(15, 0).date(),
                equity: 10_395.123456,
            }],
            skipped: Vec::new(),
            unclosed: vec![12],
        };
        let summary = Summary::compute(&result.run, &result.results, 5.0, RMultipleWeights::default());
        let curve = equity_curve(&result.equity, 10_000.0);
        let hourly = hourly_breakdown(&result.results, 5.0, RMultipleWeights::NONE);
        let weekdays = weekday_breakdown(&result.results, 5.0, RMultipleWeights::NONE);
        let report = RunReport {
            result: &result,
            summary: &summary,
            equity_curve: &curve,
            hourly: &hourly,
            weekdays: &weekdays,
            rolling: &[],
        };

        let out = dir.path().join("run");
        CsvReportAdapter.write_run(&report, &out).unwrap();

        let results = fs::read_to_string(out.join("results.csv")).unwrap();
        let mut lines = results.lines();
        assert!(lines.next().unwrap().starts_with("position_id,symbol,side"));
        let row = lines.next().unwrap();
        assert!(row.contains("395.12"));
        assert!(row.contains("WIN"));
        assert!(row.contains("2024-01-15 02:00:00"));

        let equity = fs::read_to_string(out.join("equity.csv")).unwrap();
        assert!(equity.contains("2024-01-15,10395.12"));

        let summary = fs::read_to_string(out.join("summary.csv")).unwrap();
        assert!(summary.contains("unclosed,1"));
        assert!(summary.contains("current_streak,winning 1"));

        let hourly = fs::read_to_string(out.join("hourly.csv")).unwrap();
        assert_eq!(hourly.lines().count(), 25);
        assert!(hourly.contains("02,1,1,0,100.0"));

        let weekdays = fs::read_to_string(out.join("weekdays.csv")).unwrap();
        assert!(weekdays.contains("Mon,1,1,0"));
        assert!(out.join("rolling.csv").exists());
    }

    #[test]
    fn algorithm_input_readable_by_weight_table() {
        let dir = TempDir::new().unwrap();
        let as_of = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let rows: Vec<HourScore> = (0..24)
            .map(|hour| HourScore {
                hour,
                trades: 0,
                pairs: Vec::new(),
                trade: hour == 2,
                weight: (hour == 2).then_some(0.42),
                best: (hour == 2).then_some((5.0, 1.0)),
            })
            .collect();

        let path = dir.path().join(file_name(as_of, StrategyTag::Live));
        CsvReportAdapter.write_algorithm_input(&rows, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("hour,trade,weight,tp,sl\n"));
        assert!(content.contains("2,true,0.42,5.0,1.0"));
        assert!(content.contains("3,false,,,"));

        let table = CsvWeightTable::load(dir.path()).unwrap();
        assert_eq!(table.weight(2, StrategyTag::Live, as_of), Some(0.42));
        assert_eq!(table.weight(3, StrategyTag::Live, as_of), None);
    }
}
