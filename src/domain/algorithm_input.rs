//! Per-hour regime scoring: replays recent candidates under a ladder of
//! plain stop-loss / take-profit pairs and turns the best score into a
//! sizing weight.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use super::config::SimulationConfig;
use super::config_validation::{offset_days, require_days};
use super::error::LiqsimError;
use super::metrics::{RMultipleWeights, r_multiple};
use super::position::{CandidatePosition, Outcome};
use super::simulator::{ReplayContext, replay};
use crate::ports::data_port::CandleSource;

/// `(take_profit_pct, stop_loss_pct)` pairs, each five times reward to risk.
pub const FIVE_R_LADDER: [(f64, f64); 5] = [(3.0, 0.6), (4.0, 0.8), (5.0, 1.0), (6.0, 1.2), (7.0, 1.4)];

#[derive(Debug, Clone, PartialEq)]
pub struct AlgorithmSettings {
    pub ladder: Vec<(f64, f64)>,
    pub lookback_days: i64,
    pub short_window_days: i64,
    pub horizon_days: i64,
    pub slippage_pct: f64,
    pub fee_drag: RMultipleWeights,
    /// Minimum score for an hour to be traded.
    pub min_score: f64,
}

impl Default for AlgorithmSettings {
    fn default() -> Self {
        AlgorithmSettings {
            ladder: FIVE_R_LADDER.to_vec(),
            lookback_days: 180,
            short_window_days: 90,
            horizon_days: 14,
            slippage_pct: 0.01,
            fee_drag: RMultipleWeights::default(),
            min_score: 0.1,
        }
    }
}

impl AlgorithmSettings {
    /// Day spans and the score threshold. The ladder pairs are checked as
    /// simulation configs when scoring starts.
    pub fn validate(&self) -> Result<(), LiqsimError> {
        require_days("algorithm", "lookback_days", self.lookback_days)?;
        require_days("algorithm", "short_window_days", self.short_window_days)?;
        require_days("algorithm", "horizon_days", self.horizon_days)?;
        if self.short_window_days > self.lookback_days {
            return Err(LiqsimError::invalid(
                "algorithm",
                "short_window_days",
                "short_window_days must not exceed lookback_days",
            ));
        }
        if !self.min_score.is_finite() {
            return Err(LiqsimError::invalid("algorithm", "min_score", "min_score must be finite"));
        }
        if self.ladder.is_empty() {
            return Err(LiqsimError::invalid("algorithm", "ladder", "ladder must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairScore {
    pub take_profit_pct: f64,
    pub stop_loss_pct: f64,
    pub wins: u32,
    pub losses: u32,
    pub long_window_r: f64,
    pub short_window_r: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HourScore {
    pub hour: u32,
    /// Closed positions under the first ladder pair.
    pub trades: u32,
    pub pairs: Vec<PairScore>,
    pub trade: bool,
    /// Present only when `trade` is set.
    pub weight: Option<f64>,
    /// Best `(take_profit_pct, stop_loss_pct)`; present only when `trade`
    /// is set.
    pub best: Option<(f64, f64)>,
}

/// Long window counts twice, short window four times, halved.
pub fn regime_score(long_window_r: f64, short_window_r: f64) -> f64 {
    (long_window_r * 2.0 + short_window_r * 4.0) / 2.0
}

/// Maps a score to a sizing weight in `[0, 1]`, rounded to 2 decimals.
pub fn hour_weight(score: f64, min_score: f64) -> f64 {
    let mut w = if score >= min_score { score / 20.0 } else { 0.0 };
    if w >= 1.0 {
        w = w * 0.5 + 0.5;
    }
    ((w / 2.0).min(1.0) * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, Default)]
struct WindowCounts {
    wins: u32,
    losses: u32,
    long_wins: u32,
    long_losses: u32,
    short_wins: u32,
    short_losses: u32,
}

impl WindowCounts {
    fn add(&mut self, outcome: Outcome, in_long: bool, in_short: bool) {
        let win = outcome == Outcome::Win;
        let bump = |w: &mut u32, l: &mut u32| if win { *w += 1 } else { *l += 1 };
        bump(&mut self.wins, &mut self.losses);
        if in_long {
            bump(&mut self.long_wins, &mut self.long_losses);
        }
        if in_short {
            bump(&mut self.short_wins, &mut self.short_losses);
        }
    }
}

/// Scores every hour of day as of `as_of`.
///
/// Candidates are bucketed by the hour their liquidation triggered and
/// only those starting in `[as_of - lookback_days, as_of)` count. Each is
/// replayed with plain rules for at most `horizon_days`, never past
/// `as_of`. Window membership is measured from the liquidation date.
pub fn algorithm_input(
    candidates: &[CandidatePosition],
    source: &dyn CandleSource,
    as_of: NaiveDate,
    settings: &AlgorithmSettings,
) -> Result<Vec<HourScore>, LiqsimError> {
    settings.validate()?;
    let configs: Vec<SimulationConfig> = settings
        .ladder
        .iter()
        .map(|&(tp, sl)| SimulationConfig {
            horizon_days: settings.horizon_days,
            slippage_pct: settings.slippage_pct,
            ..SimulationConfig::plain(sl, tp)
        })
        .collect();
    for config in &configs {
        config.validate()?;
    }

    let cutoff: NaiveDateTime = as_of.and_time(NaiveTime::MIN);
    let window_start = offset_days(cutoff, -settings.lookback_days, "algorithm", "lookback_days")?;

    let mut selected: Vec<&CandidatePosition> = candidates
        .iter()
        .filter(|p| p.start >= window_start && p.start < cutoff)
        .collect();
    selected.sort_by(|a, b| {
        a.liquidation
            .triggered_at
            .cmp(&b.liquidation.triggered_at)
            .then(a.id.cmp(&b.id))
    });

    // counts[hour][pair]
    let mut counts = vec![vec![WindowCounts::default(); configs.len()]; 24];

    for position in selected {
        let end = offset_days(position.start, settings.horizon_days, "algorithm", "horizon_days")?.min(cutoff);
        let candles = source.fetch_candles(&position.symbol, &position.timeframe, position.start, end)?;

        let age = (as_of - position.liquidation.triggered_at.date()).num_days();
        let in_long = age <= settings.lookback_days;
        let in_short = age <= settings.short_window_days;
        let hour = position.liquidation.triggered_at.hour() as usize;

        let ctx = ReplayContext {
            cutoff: Some(cutoff),
            ..ReplayContext::new(SimulationConfig::default().initial_capital)
        };
        for (index, config) in configs.iter().enumerate() {
            match replay(position, &candles, config, &ctx) {
                Ok(outcome) => {
                    if let Some(closed) = outcome.closed {
                        counts[hour][index].add(closed.outcome, in_long, in_short);
                    }
                }
                Err(e) if e.is_position_local() => {
                    tracing::debug!(position = position.id, error = %e, "skipping position");
                    break;
                }
                Err(e) => return Err(e),
            }
        }
    }

    let rows = counts
        .into_iter()
        .enumerate()
        .map(|(hour, per_pair)| score_hour(hour as u32, &per_pair, settings))
        .collect();
    Ok(rows)
}

fn score_hour(hour: u32, per_pair: &[WindowCounts], settings: &AlgorithmSettings) -> HourScore {
    let pairs: Vec<PairScore> = settings
        .ladder
        .iter()
        .zip(per_pair)
        .map(|(&(tp, sl), c)| {
            let ratio = tp / sl;
            let long_window_r = r_multiple(ratio, c.long_wins, c.long_losses, settings.fee_drag);
            let short_window_r = r_multiple(ratio, c.short_wins, c.short_losses, settings.fee_drag);
            PairScore {
                take_profit_pct: tp,
                stop_loss_pct: sl,
                wins: c.wins,
                losses: c.losses,
                long_window_r,
                short_window_r,
                score: regime_score(long_window_r, short_window_r),
            }
        })
        .collect();

    // first pair wins ties
    let best = pairs.iter().fold(None::<&PairScore>, |best, p| match best {
        Some(b) if b.score >= p.score => Some(b),
        _ => Some(p),
    });

    let trades = pairs.first().map_or(0, |p| p.wins + p.losses);
    let trade = best.is_some_and(|b| b.score >= settings.min_score);

    HourScore {
        hour,
        trades,
        weight: best
            .filter(|_| trade)
            .map(|b| hour_weight(b.score, settings.min_score)),
        best: best
            .filter(|_| trade)
            .map(|b| (b.take_profit_pct, b.stop_loss_pct)),
        pairs,
        trade,
    }
}
