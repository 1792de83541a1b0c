//! Run statistics: summary scalars, bucketed breakdowns, rolling windows and
//! the daily equity curve.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use super::config_validation::{offset_days, require_days};
use super::error::LiqsimError;

use super::portfolio::{EquityPoint, RunState, StreakState, StreakTracker};
use super::position::{ClosedPosition, Outcome, StrategyTag};

/// Fee drag subtracted per trade when scoring in R multiples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RMultipleWeights {
    pub win_fee_drag: f64,
    pub loss_fee_drag: f64,
}

impl RMultipleWeights {
    pub const NONE: RMultipleWeights = RMultipleWeights {
        win_fee_drag: 0.0,
        loss_fee_drag: 0.0,
    };
}

impl Default for RMultipleWeights {
    fn default() -> Self {
        RMultipleWeights {
            win_fee_drag: 0.05,
            loss_fee_drag: 0.1,
        }
    }
}

/// tp/sl x wins - wins x win_fee_drag - losses - losses x loss_fee_drag
pub fn r_multiple(reward_ratio: f64, wins: u32, losses: u32, weights: RMultipleWeights) -> f64 {
    let w = wins as f64;
    let l = losses as f64;
    reward_ratio * w - w * weights.win_fee_drag - l - l * weights.loss_fee_drag
}

/// Fraction of trades won; 0 when there are none.
pub fn win_ratio(wins: u32, losses: u32) -> f64 {
    let trades = wins + losses;
    if trades == 0 {
        0.0
    } else {
        wins as f64 / trades as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketStats {
    pub wins: u32,
    pub losses: u32,
    pub trades: u32,
    pub ratio: f64,
    pub longest_win_streak: u32,
    pub longest_loss_streak: u32,
    pub r_multiple: f64,
    pub net_return: f64,
}

impl BucketStats {
    pub fn empty() -> Self {
        BucketStats {
            wins: 0,
            losses: 0,
            trades: 0,
            ratio: 0.0,
            longest_win_streak: 0,
            longest_loss_streak: 0,
            r_multiple: 0.0,
            net_return: 0.0,
        }
    }

    /// Stats over `results`, which must be in chronological order for the
    /// streak figures to mean anything.
    pub fn from_results<'a>(
        results: impl IntoIterator<Item = &'a ClosedPosition>,
        reward_ratio: f64,
        weights: RMultipleWeights,
    ) -> Self {
        let mut streaks = StreakTracker::new();
        let mut wins = 0u32;
        let mut losses = 0u32;
        let mut net_return = 0.0;

        for closed in results {
            match closed.outcome {
                Outcome::Win => wins += 1,
                Outcome::Loss => losses += 1,
            }
            streaks.record(closed.outcome);
            net_return += closed.realized_return;
        }

        BucketStats {
            wins,
            losses,
            trades: wins + losses,
            ratio: win_ratio(wins, losses),
            longest_win_streak: streaks.longest_win_streak,
            longest_loss_streak: streaks.longest_loss_streak,
            r_multiple: r_multiple(reward_ratio, wins, losses, weights),
            net_return,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub wins: u32,
    pub losses: u32,
    pub trades: u32,
    pub ratio: f64,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub total_return: f64,
    /// Mean realized return per closed position.
    pub average_return: f64,
    /// Geometric mean growth per trade, in percent.
    pub reward_per_trade: f64,
    pub longest_win_streak: u32,
    pub longest_loss_streak: u32,
    pub streak: StreakState,
    pub r_multiple: f64,
}

impl Summary {
    pub fn compute(
        run: &RunState,
        results: &[ClosedPosition],
        reward_ratio: f64,
        weights: RMultipleWeights,
    ) -> Self {
        let trades = run.trades();
        let total_return = run.capital - run.initial_capital;

        let average_return = if results.is_empty() {
            0.0
        } else {
            results.iter().map(|r| r.realized_return).sum::<f64>() / results.len() as f64
        };

        Summary {
            wins: run.wins,
            losses: run.losses,
            trades,
            ratio: win_ratio(run.wins, run.losses),
            initial_capital: run.initial_capital,
            final_capital: run.capital,
            total_return,
            average_return,
            reward_per_trade: reward_per_trade(run.initial_capital, run.capital, trades),
            longest_win_streak: run.streaks.longest_win_streak,
            longest_loss_streak: run.streaks.longest_loss_streak,
            streak: run.streaks.state(),
            r_multiple: r_multiple(reward_ratio, run.wins, run.losses, weights),
        }
    }
}

/// ((final / initial)^(1 / trades) - 1) x 100; 0 with no trades or when
/// capital is wiped out.
pub fn reward_per_trade(initial_capital: f64, final_capital: f64, trades: u32) -> f64 {
    if trades == 0 || initial_capital <= 0.0 || final_capital <= 0.0 {
        return 0.0;
    }
    ((final_capital / initial_capital).powf(1.0 / trades as f64) - 1.0) * 100.0
}

fn chronological(results: &[ClosedPosition]) -> Vec<&ClosedPosition> {
    let mut sorted: Vec<&ClosedPosition> = results.iter().collect();
    sorted.sort_by(|a, b| a.start.cmp(&b.start).then(a.position_id.cmp(&b.position_id)));
    sorted
}

fn bucketed<const N: usize>(
    results: &[ClosedPosition],
    reward_ratio: f64,
    weights: RMultipleWeights,
    key: impl Fn(&ClosedPosition) -> usize,
) -> [BucketStats; N] {
    let sorted = chronological(results);
    std::array::from_fn(|bucket| {
        BucketStats::from_results(
            sorted.iter().copied().filter(|r| key(r) == bucket),
            reward_ratio,
            weights,
        )
    })
}

/// One bucket per start hour, 0..=23.
pub fn hourly_breakdown(
    results: &[ClosedPosition],
    reward_ratio: f64,
    weights: RMultipleWeights,
) -> [BucketStats; 24] {
    bucketed(results, reward_ratio, weights, |r| r.start.hour() as usize)
}

/// One bucket per start weekday, Monday first.
pub fn weekday_breakdown(
    results: &[ClosedPosition],
    reward_ratio: f64,
    weights: RMultipleWeights,
) -> [BucketStats; 7] {
    bucketed(results, reward_ratio, weights, |r| {
        r.start.weekday().num_days_from_monday() as usize
    })
}

pub fn strategy_breakdown(
    results: &[ClosedPosition],
    reward_ratio: f64,
    weights: RMultipleWeights,
) -> Vec<(StrategyTag, BucketStats)> {
    let sorted = chronological(results);
    StrategyTag::ALL
        .iter()
        .map(|tag| {
            let stats = BucketStats::from_results(
                sorted.iter().copied().filter(|r| r.strategy == *tag),
                reward_ratio,
                weights,
            );
            (*tag, stats)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollingWindow {
    pub days: i64,
    pub stats: BucketStats,
}

/// Stats over positions starting in `[as_of - days, as_of)` for each
/// window length. Every length must be a valid day span.
pub fn rolling_windows(
    results: &[ClosedPosition],
    as_of: NaiveDate,
    windows_days: &[i64],
    reward_ratio: f64,
    weights: RMultipleWeights,
) -> Result<Vec<RollingWindow>, LiqsimError> {
    let sorted = chronological(results);
    let end: NaiveDateTime = as_of.and_time(chrono::NaiveTime::MIN);
    windows_days
        .iter()
        .map(|&days| {
            require_days("statistics", "rolling_windows", days)?;
            let start = offset_days(end, -days, "statistics", "rolling_windows")?;
            let stats = BucketStats::from_results(
                sorted
                    .iter()
                    .copied()
                    .filter(|r| r.start >= start && r.start < end),
                reward_ratio,
                weights,
            );
            Ok(RollingWindow { days, stats })
        })
        .collect()
}

/// One point per calendar day from the first to the last recorded date.
///
/// Days without a recorded point carry the previous equity forward; when
/// several points share a date the last one wins. No points, no curve.
pub fn equity_curve(points: &[EquityPoint], initial_capital: f64) -> Vec<EquityPoint> {
    let (Some(first), Some(last)) = (
        points.iter().map(|p| p.date).min(),
        points.iter().map(|p| p.date).max(),
    ) else {
        return Vec::new();
    };

    let mut sorted: Vec<&EquityPoint> = points.iter().collect();
    sorted.sort_by_key(|p| p.date);

    let mut curve = Vec::new();
    let mut equity = initial_capital;
    let mut next = sorted.into_iter().peekable();
    let mut day = first;
    while day <= last {
        while let Some(point) = next.next_if(|p| p.date == day) {
            equity = point.equity;
        }
        curve.push(EquityPoint { date: day, equity });
        match day.succ_opt() {
            Some(d) => day = d,
            None => break,
        }
    }
    curve
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::{ExitReason, Side};
    use approx::assert_relative_eq;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn closed(id: u64, day: u32, hour: u32, outcome: Outcome, realized_return: f64) -> ClosedPosition {
        let start = date(day).and_hms_opt(hour, 0, 0).unwrap();
        ClosedPosition {
            position_id: id,
            symbol: "BTCUSDT".into(),
            side: Side::Long,
            strategy: StrategyTag::Live,
            start,
            liquidation_at: start,
            entry_price: 100.0,
            size: 1.0,
            closing_price: 101.0,
            realized_return,
            fees: 0.0,
            outcome,
            exit_reason: ExitReason::TakeProfit,
            closed_at: start,
        }
    }

    #[test]
    fn r_multiple_formula() {
        // 5 x 3 - 3 x 0.05 - 2 - 2 x 0.1
        assert_relative_eq!(
            r_multiple(5.0, 3, 2, RMultipleWeights::default()),
            15.0 - 0.15 - 2.0 - 0.2,
            epsilon = 1e-12
        );
        assert_relative_eq!(r_multiple(5.0, 3, 2, RMultipleWeights::NONE), 13.0);
    }

    #[test]
    fn ratio_zero_without_trades() {
        assert_eq!(win_ratio(0, 0), 0.0);
        assert_relative_eq!(win_ratio(3, 1), 0.75);
    }

    #[test]
    fn reward_per_trade_geometric() {
        // 10000 -> 12100 over 2 trades = 10% per trade
        assert_relative_eq!(reward_per_trade(10_000.0, 12_100.0, 2), 10.0, epsilon = 1e-9);
        assert_eq!(reward_per_trade(10_000.0, 12_100.0, 0), 0.0);
        assert_eq!(reward_per_trade(10_000.0, -5.0, 3), 0.0);
    }

    #[test]
    fn bucket_streaks_follow_chronology() {
        let results = vec![
            closed(3, 3, 2, Outcome::Loss, -1.0),
            closed(1, 1, 2, Outcome::Win, 2.0),
            closed(2, 2, 2, Outcome::Win, 2.0),
        ];
        let hours = hourly_breakdown(&results, 4.0, RMultipleWeights::NONE);
        let bucket = hours[2];
        assert_eq!(bucket.trades, 3);
        assert_eq!(bucket.longest_win_streak, 2);
        assert_eq!(bucket.longest_loss_streak, 1);
        assert_relative_eq!(bucket.net_return, 3.0);
        assert_relative_eq!(bucket.r_multiple, 7.0);
        assert_eq!(hours[3], BucketStats::empty());
    }

    #[test]
    fn weekday_buckets() {
        // Jan 1 2024 is Monday, Jan 3 Wednesday
        let results = vec![
            closed(1, 1, 0, Outcome::Win, 1.0),
            closed(2, 3, 0, Outcome::Loss, -1.0),
        ];
        let days = weekday_breakdown(&results, 2.0, RMultipleWeights::NONE);
        assert_eq!(days[0].wins, 1);
        assert_eq!(days[2].losses, 1);
        assert_eq!(days[1].trades, 0);
    }

    #[test]
    fn strategy_buckets_cover_all_tags() {
        let mut reversed = closed(2, 2, 0, Outcome::Win, 1.0);
        reversed.strategy = StrategyTag::Reversed;
        let results = vec![closed(1, 1, 0, Outcome::Loss, -1.0), reversed];
        let by_tag = strategy_breakdown(&results, 2.0, RMultipleWeights::NONE);
        assert_eq!(by_tag.len(), 3);
        assert_eq!(by_tag[0], (StrategyTag::Live, BucketStats::from_results(&results[..1], 2.0, RMultipleWeights::NONE)));
        assert_eq!(by_tag[1].1.wins, 1);
        assert_eq!(by_tag[2].1.trades, 0);
    }

    #[test]
    fn rolling_windows_exclude_as_of_day() {
        let results = vec![
            closed(1, 1, 0, Outcome::Win, 1.0),
            closed(2, 20, 0, Outcome::Loss, -1.0),
            closed(3, 30, 0, Outcome::Win, 1.0),
        ];
        let windows = rolling_windows(&results, date(30), &[15, 90], 2.0, RMultipleWeights::NONE).unwrap();
        assert_eq!(windows[0].days, 15);
        assert_eq!(windows[0].stats.trades, 1);
        assert_eq!(windows[0].stats.losses, 1);
        assert_eq!(windows[1].stats.trades, 2);
    }

    #[test]
    fn rolling_window_length_bounded() {
        for days in [0, 3651, i64::MAX] {
            let err = rolling_windows(&[], date(30), &[90, days], 2.0, RMultipleWeights::NONE).unwrap_err();
            assert!(matches!(err, LiqsimError::ConfigInvalid { ref key, .. } if key == "rolling_windows"));
        }
    }

    #[test]
    fn equity_curve_forward_fills() {
        let points = vec![
            EquityPoint { date: date(1), equity: 10_100.0 },
            EquityPoint { date: date(4), equity: 9_900.0 },
            EquityPoint { date: date(4), equity: 9_950.0 },
        ];
        let curve = equity_curve(&points, 10_000.0);
        let values: Vec<f64> = curve.iter().map(|p| p.equity).collect();
        assert_eq!(values, vec![10_100.0, 10_100.0, 10_100.0, 9_950.0]);
        assert_eq!(curve[0].date, date(1));
        assert_eq!(curve[3].date, date(4));
    }

    #[test]
    fn equity_curve_empty() {
        assert!(equity_curve(&[], 10_000.0).is_empty());
    }

    #[test]
    fn summary_from_run_state() {
        let mut run = RunState::new(10_000.0);
        let results = vec![
            closed(1, 1, 0, Outcome::Win, 500.0),
            closed(2, 2, 0, Outcome::Loss, -100.0),
        ];
        for r in &results {
            run.record(r, None);
        }
        let summary = Summary::compute(&run, &results, 10.0, RMultipleWeights::NONE);
        assert_eq!(summary.trades, 2);
        assert_relative_eq!(summary.ratio, 0.5);
        assert_relative_eq!(summary.final_capital, 10_400.0);
        assert_relative_eq!(summary.total_return, 400.0);
        assert_relative_eq!(summary.average_return, 200.0);
        assert_relative_eq!(summary.r_multiple, 9.0);
        assert_eq!(summary.streak, StreakState::Losing(1));
        assert!(summary.reward_per_trade > 0.0);
    }

    #[test]
    fn summary_empty_run() {
        let run = RunState::new(10_000.0);
        let summary = Summary::compute(&run, &[], 10.0, RMultipleWeights::default());
        assert_eq!(summary.trades, 0);
        assert_eq!(summary.ratio, 0.0);
        assert_eq!(summary.reward_per_trade, 0.0);
        assert_eq!(summary.average_return, 0.0);
        assert_eq!(summary.streak, StreakState::None);
    }
}
