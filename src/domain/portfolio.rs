//! Running portfolio state across one what-if run.

use chrono::{NaiveDate, NaiveDateTime};

use super::position::{ClosedPosition, Outcome, Side};

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakState {
    None,
    Winning(u32),
    Losing(u32),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreakTracker {
    pub current_win_streak: u32,
    pub current_loss_streak: u32,
    pub longest_win_streak: u32,
    pub longest_loss_streak: u32,
}

impl StreakTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_win(&mut self) {
        self.current_loss_streak = 0;
        self.current_win_streak += 1;
        self.longest_win_streak = self.longest_win_streak.max(self.current_win_streak);
    }

    pub fn record_loss(&mut self) {
        self.current_win_streak = 0;
        self.current_loss_streak += 1;
        self.longest_loss_streak = self.longest_loss_streak.max(self.current_loss_streak);
    }

    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Win => self.record_win(),
            Outcome::Loss => self.record_loss(),
        }
    }

    pub fn state(&self) -> StreakState {
        if self.current_win_streak > 0 {
            StreakState::Winning(self.current_win_streak)
        } else if self.current_loss_streak > 0 {
            StreakState::Losing(self.current_loss_streak)
        } else {
            StreakState::None
        }
    }
}

/// Last candle consumed by a closed position, per side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SideClock {
    pub long: Option<NaiveDateTime>,
    pub short: Option<NaiveDateTime>,
}

impl SideClock {
    pub fn get(&self, side: Side) -> Option<NaiveDateTime> {
        match side {
            Side::Long => self.long,
            Side::Short => self.short,
        }
    }

    /// Moves the clock forward; never backward.
    pub fn advance(&mut self, side: Side, at: NaiveDateTime) {
        let slot = match side {
            Side::Long => &mut self.long,
            Side::Short => &mut self.short,
        };
        *slot = Some(slot.map_or(at, |prev| prev.max(at)));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    pub initial_capital: f64,
    pub capital: f64,
    pub wins: u32,
    pub losses: u32,
    pub streaks: StreakTracker,
    pub last_consumed: SideClock,
}

impl RunState {
    pub fn new(initial_capital: f64) -> Self {
        RunState {
            initial_capital,
            capital: initial_capital,
            wins: 0,
            losses: 0,
            streaks: StreakTracker::new(),
            last_consumed: SideClock::default(),
        }
    }

    /// Capital used to size the next position.
    pub fn capital_basis(&self, compound: bool) -> f64 {
        if compound { self.capital } else { self.initial_capital }
    }

    pub fn trades(&self) -> u32 {
        self.wins + self.losses
    }

    /// Folds one closed position into the running totals.
    pub fn record(&mut self, closed: &ClosedPosition, last_candle_at: Option<NaiveDateTime>) {
        self.capital += closed.realized_return;
        match closed.outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
        }
        self.streaks.record(closed.outcome);
        self.last_consumed
            .advance(closed.side, last_candle_at.unwrap_or(closed.closed_at));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::{ExitReason, StrategyTag};

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn sample_closed(side: Side, outcome: Outcome, realized_return: f64) -> ClosedPosition {
        ClosedPosition {
            position_id: 1,
            symbol: "BTCUSDT".into(),
            side,
            strategy: StrategyTag::Live,
            start: at(1),
            liquidation_at: at(1),
            entry_price: 100.0,
            size: 1.0,
            closing_price: 101.0,
            realized_return,
            fees: 0.0,
            outcome,
            exit_reason: ExitReason::TakeProfit,
            closed_at: at(5),
        }
    }

    #[test]
    fn streak_sequence() {
        let mut tracker = StreakTracker::new();
        assert_eq!(tracker.state(), StreakState::None);
        use Outcome::*;
        for outcome in [Win, Win, Loss, Win, Win, Win, Loss, Loss] {
            tracker.record(outcome);
        }
        assert_eq!(tracker.longest_win_streak, 3);
        assert_eq!(tracker.longest_loss_streak, 2);
        assert_eq!(tracker.state(), StreakState::Losing(2));
    }

    #[test]
    fn win_resets_loss_streak() {
        let mut tracker = StreakTracker::new();
        tracker.record_loss();
        tracker.record_loss();
        tracker.record_win();
        assert_eq!(tracker.current_loss_streak, 0);
        assert_eq!(tracker.state(), StreakState::Winning(1));
        assert_eq!(tracker.longest_loss_streak, 2);
    }

    #[test]
    fn side_clock_is_per_side_and_monotonic() {
        let mut clock = SideClock::default();
        clock.advance(Side::Long, at(5));
        clock.advance(Side::Long, at(3));
        assert_eq!(clock.get(Side::Long), Some(at(5)));
        assert_eq!(clock.get(Side::Short), None);
    }

    #[test]
    fn capital_basis_respects_compounding() {
        let mut run = RunState::new(10_000.0);
        run.record(&sample_closed(Side::Long, Outcome::Win, 250.0), None);
        assert!((run.capital_basis(true) - 10_250.0).abs() < f64::EPSILON);
        assert!((run.capital_basis(false) - 10_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn record_updates_counters_and_clock() {
        let mut run = RunState::new(10_000.0);
        run.record(&sample_closed(Side::Short, Outcome::Loss, -100.0), Some(at(4)));
        run.record(&sample_closed(Side::Short, Outcome::Win, 300.0), None);
        assert_eq!(run.wins, 1);
        assert_eq!(run.losses, 1);
        assert_eq!(run.trades(), 2);
        assert!((run.capital - 10_200.0).abs() < f64::EPSILON);
        assert_eq!(run.last_consumed.get(Side::Short), Some(at(5)));
        assert_eq!(run.last_consumed.get(Side::Long), None);
    }
}
