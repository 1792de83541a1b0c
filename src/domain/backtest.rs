//! Portfolio runner: folds candidate positions through the simulator in start
//! order, carrying capital, streaks and the per-side overlap clock.

use chrono::Timelike;
use rayon::prelude::*;

use super::config::{ReversalMode, SimulationConfig};
use super::error::LiqsimError;
use super::metrics::{BucketStats, RMultipleWeights};
use super::portfolio::{EquityPoint, RunState};
use super::position::{CandidatePosition, ClosedPosition};
use super::simulator::{ReplayContext, horizon_end, replay};
use crate::ports::data_port::CandleSource;
use crate::ports::weight_port::WeightLookup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The weight lookup returned no weight or a non-positive one.
    NotTraded,
    NoCandles,
    InvalidCandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedPosition {
    pub position_id: u64,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub struct RunResult {
    /// Closed positions, most recent first.
    pub results: Vec<ClosedPosition>,
    pub run: RunState,
    /// Capital after each close, keyed by the position's start date, in
    /// chronological order.
    pub equity: Vec<EquityPoint>,
    pub skipped: Vec<SkippedPosition>,
    /// Entered but still open when the horizon ran out.
    pub unclosed: Vec<u64>,
}

/// Runs every candidate against `config`.
///
/// Candidates are processed in ascending `(start, id)` order regardless of
/// input order. Positions without usable candle data are skipped and the run
/// continues; storage errors abort the run.
pub fn run_what_if(
    candidates: &[CandidatePosition],
    source: &dyn CandleSource,
    config: &SimulationConfig,
    weights: &dyn WeightLookup,
) -> Result<RunResult, LiqsimError> {
    config.validate()?;

    let mut ordered: Vec<&CandidatePosition> = candidates.iter().collect();
    ordered.sort_by(|a, b| a.start.cmp(&b.start).then(a.id.cmp(&b.id)));

    let mut run = RunState::new(config.initial_capital);
    let mut results: Vec<ClosedPosition> = Vec::new();
    let mut equity = Vec::new();
    let mut skipped = Vec::new();
    let mut unclosed = Vec::new();

    for position in ordered {
        let trigger = position.liquidation.triggered_at;
        let weight = weights
            .weight(trigger.hour(), position.strategy, trigger.date())
            .filter(|w| *w > 0.0);
        let Some(weight) = weight else {
            tracing::debug!(position = position.id, hour = trigger.hour(), "hour not traded");
            skipped.push(SkippedPosition {
                position_id: position.id,
                reason: SkipReason::NotTraded,
            });
            continue;
        };

        let candles = source.fetch_candles(
            &position.symbol,
            &position.timeframe,
            position.start,
            horizon_end(position, config)?,
        )?;

        let side = config.reversal.effective_side(position);
        let ctx = ReplayContext {
            capital_basis: run.capital_basis(config.compound),
            weight,
            overlap_guard: if config.no_overlap {
                run.last_consumed.get(side)
            } else {
                None
            },
            cutoff: None,
        };

        let outcome = match replay(position, &candles, config, &ctx) {
            Ok(outcome) => outcome,
            Err(e) if e.is_position_local() => {
                tracing::debug!(position = position.id, error = %e, "skipping position");
                let reason = match e {
                    LiqsimError::NoCandlesInWindow { .. } => SkipReason::NoCandles,
                    _ => SkipReason::InvalidCandle,
                };
                skipped.push(SkippedPosition {
                    position_id: position.id,
                    reason,
                });
                continue;
            }
            Err(e) => return Err(e),
        };

        match outcome.closed {
            Some(closed) => {
                run.record(&closed, outcome.last_candle_at);
                equity.push(EquityPoint {
                    date: closed.start.date(),
                    equity: run.capital,
                });
                results.insert(0, closed);
            }
            None => {
                if !outcome.fills.is_empty() {
                    unclosed.push(position.id);
                }
            }
        }
    }

    tracing::info!(
        trades = run.trades(),
        wins = run.wins,
        losses = run.losses,
        capital = run.capital,
        skipped = skipped.len(),
        unclosed = unclosed.len(),
        "what-if run complete"
    );

    Ok(RunResult {
        results,
        run,
        equity,
        skipped,
        unclosed,
    })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourComparison {
    pub hour: u32,
    /// Only reversed-tagged positions flipped.
    pub live: BucketStats,
    /// Every position flipped.
    pub reversed: BucketStats,
}

/// Runs each start hour separately, once as traded live and once fully
/// reversed. R multiples carry no fee drag.
pub fn per_hour_breakdown(
    candidates: &[CandidatePosition],
    source: &dyn CandleSource,
    config: &SimulationConfig,
    weights: &dyn WeightLookup,
) -> Result<Vec<HourComparison>, LiqsimError> {
    let live_config = SimulationConfig {
        reversal: ReversalMode::ReverseTagged,
        ..config.clone()
    };
    let reversed_config = SimulationConfig {
        reversal: ReversalMode::ReverseAll,
        ..config.clone()
    };
    let ratio = config.reward_ratio();

    let mut rows = Vec::with_capacity(24);
    for hour in 0..24u32 {
        let bucket: Vec<CandidatePosition> = candidates
            .iter()
            .filter(|p| p.start.hour() == hour)
            .cloned()
            .collect();

        let live = run_what_if(&bucket, source, &live_config, weights)?;
        let reversed = run_what_if(&bucket, source, &reversed_config, weights)?;

        rows.push(HourComparison {
            hour,
            live: BucketStats::from_results(live.results.iter().rev(), ratio, RMultipleWeights::NONE),
            reversed: BucketStats::from_results(
                reversed.results.iter().rev(),
                ratio,
                RMultipleWeights::NONE,
            ),
        });
    }
    Ok(rows)
}

/// Runs each configuration independently in parallel. Results keep the order
/// of `configs`.
pub fn run_sweep(
    configs: &[SimulationConfig],
    candidates: &[CandidatePosition],
    source: &(dyn CandleSource + Sync),
    weights: &(dyn WeightLookup + Sync),
) -> Vec<Result<RunResult, LiqsimError>> {
    configs
        .par_iter()
        .map(|config| run_what_if(candidates, source, config, weights))
        .collect()
}
