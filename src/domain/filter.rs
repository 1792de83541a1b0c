//! Candidate position selection criteria.

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};

use crate::domain::position::{CandidatePosition, Side, StrategyTag};

/// Every criterion is optional; an empty list or `None` accepts everything.
/// Hour and weekday criteria apply to the position start.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionFilter {
    pub side: Option<Side>,
    pub timeframe: Option<String>,
    pub strategies: Vec<StrategyTag>,
    /// Inclusive.
    pub start_from: Option<NaiveDateTime>,
    /// Exclusive.
    pub start_before: Option<NaiveDateTime>,
    pub hours: Vec<u32>,
    pub weekdays: Vec<Weekday>,
    pub min_liquidation_amount: Option<i64>,
    pub max_liquidation_amount: Option<i64>,
    pub min_candles_before_entry: Option<u32>,
    pub max_candles_before_entry: Option<u32>,
}

impl PositionFilter {
    pub fn matches(&self, position: &CandidatePosition) -> bool {
        let start = position.start;
        let amount = position.liquidation.amount;

        self.side.is_none_or(|side| position.side == side)
            && self
                .timeframe
                .as_ref()
                .is_none_or(|tf| position.timeframe == *tf)
            && (self.strategies.is_empty() || self.strategies.contains(&position.strategy))
            && self.start_from.is_none_or(|from| start >= from)
            && self.start_before.is_none_or(|before| start < before)
            && (self.hours.is_empty() || self.hours.contains(&start.hour()))
            && (self.weekdays.is_empty() || self.weekdays.contains(&start.weekday()))
            && self.min_liquidation_amount.is_none_or(|min| amount >= min)
            && self.max_liquidation_amount.is_none_or(|max| amount <= max)
            && self.candles_before_entry_matches(position.candles_before_entry)
    }

    fn candles_before_entry_matches(&self, value: Option<u32>) -> bool {
        if self.min_candles_before_entry.is_none() && self.max_candles_before_entry.is_none() {
            return true;
        }
        match value {
            Some(n) => {
                self.min_candles_before_entry.is_none_or(|min| n >= min)
                    && self.max_candles_before_entry.is_none_or(|max| n <= max)
            }
            None => false,
        }
    }

    /// Keeps matching positions, ordered by start then id.
    pub fn apply(&self, positions: Vec<CandidatePosition>) -> Vec<CandidatePosition> {
        let mut kept: Vec<CandidatePosition> =
            positions.into_iter().filter(|p| self.matches(p)).collect();
        kept.sort_by(|a, b| a.start.cmp(&b.start).then(a.id.cmp(&b.id)));
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::LiquidationContext;
    use chrono::NaiveDate;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        // 2024-01-01 is a Monday
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn position(id: u64, start: NaiveDateTime, amount: i64) -> CandidatePosition {
        CandidatePosition {
            id,
            symbol: "BTCUSDT".into(),
            timeframe: "5m".into(),
            side: Side::Long,
            start,
            strategy: StrategyTag::Live,
            liquidation: LiquidationContext {
                triggered_at: start,
                amount,
                count: 1,
            },
            candles_before_entry: Some(1),
        }
    }

    #[test]
    fn empty_filter_accepts_all() {
        assert!(PositionFilter::default().matches(&position(1, at(1, 3), 10)));
    }

    #[test]
    fn hour_and_weekday() {
        let filter = PositionFilter {
            hours: vec![2, 3],
            weekdays: vec![Weekday::Mon],
            ..Default::default()
        };
        assert!(filter.matches(&position(1, at(1, 3), 10)));
        assert!(!filter.matches(&position(2, at(1, 4), 10)));
        assert!(!filter.matches(&position(3, at(2, 3), 10)));
    }

    #[test]
    fn start_range_is_half_open() {
        let filter = PositionFilter {
            start_from: Some(at(2, 0)),
            start_before: Some(at(3, 0)),
            ..Default::default()
        };
        assert!(filter.matches(&position(1, at(2, 0), 10)));
        assert!(!filter.matches(&position(2, at(3, 0), 10)));
        assert!(!filter.matches(&position(3, at(1, 23), 10)));
    }

    #[test]
    fn liquidation_amount_bounds_inclusive() {
        let filter = PositionFilter {
            min_liquidation_amount: Some(100),
            max_liquidation_amount: Some(200),
            ..Default::default()
        };
        assert!(filter.matches(&position(1, at(1, 0), 100)));
        assert!(filter.matches(&position(2, at(1, 0), 200)));
        assert!(!filter.matches(&position(3, at(1, 0), 99)));
        assert!(!filter.matches(&position(4, at(1, 0), 201)));
    }

    #[test]
    fn candles_before_entry_requires_value() {
        let filter = PositionFilter {
            max_candles_before_entry: Some(1),
            ..Default::default()
        };
        let mut p = position(1, at(1, 0), 10);
        assert!(filter.matches(&p));
        p.candles_before_entry = Some(2);
        assert!(!filter.matches(&p));
        p.candles_before_entry = None;
        assert!(!filter.matches(&p));
    }

    #[test]
    fn strategy_and_side() {
        let filter = PositionFilter {
            side: Some(Side::Short),
            strategies: vec![StrategyTag::Reversed],
            ..Default::default()
        };
        let mut p = position(1, at(1, 0), 10);
        assert!(!filter.matches(&p));
        p.side = Side::Short;
        p.strategy = StrategyTag::Reversed;
        assert!(filter.matches(&p));
    }

    #[test]
    fn apply_sorts_by_start() {
        let positions = vec![
            position(3, at(3, 0), 10),
            position(1, at(1, 0), 10),
            position(2, at(2, 0), 10),
        ];
        let ids: Vec<u64> = PositionFilter::default()
            .apply(positions)
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
