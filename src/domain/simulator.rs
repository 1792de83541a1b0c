//! Single-position lifecycle: entry, candle replay, terminal exit.

use chrono::NaiveDateTime;

use crate::domain::candle::Candle;
use crate::domain::config::SimulationConfig;
use crate::domain::config_validation::offset_days;
use crate::domain::error::LiqsimError;
use crate::domain::execution::{Fill, apply_entry_slippage, position_size};
use crate::domain::exit_rules::{CandleVerdict, SimulationState, evaluate_candle};
use crate::domain::position::{CandidatePosition, ClosedPosition};

/// Per-position inputs supplied by the portfolio runner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayContext {
    pub capital_basis: f64,
    /// Sizing multiplier from the weight lookup.
    pub weight: f64,
    /// Last candle consumed by an earlier position on the traded side.
    pub overlap_guard: Option<NaiveDateTime>,
    /// Candles at or after this instant are ignored. Defaults to the
    /// position's horizon.
    pub cutoff: Option<NaiveDateTime>,
}

impl ReplayContext {
    pub fn new(capital_basis: f64) -> Self {
        ReplayContext {
            capital_basis,
            weight: 1.0,
            overlap_guard: None,
            cutoff: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Replay {
    /// `None` when the position never reached a terminal exit.
    pub closed: Option<ClosedPosition>,
    pub last_candle_at: Option<NaiveDateTime>,
    pub fills: Vec<Fill>,
}

/// End of the lookahead window for `position`.
pub fn horizon_end(position: &CandidatePosition, config: &SimulationConfig) -> Result<NaiveDateTime, LiqsimError> {
    offset_days(position.start, config.horizon_days, "simulation", "horizon_days")
}

/// Simulates one position with weight 1 and no overlap guard.
///
/// Returns `Ok(None)` when the position is still open once the candles (or
/// the horizon) run out.
pub fn simulate(
    position: &CandidatePosition,
    candles: &[Candle],
    config: &SimulationConfig,
    capital_basis: f64,
) -> Result<Option<ClosedPosition>, LiqsimError> {
    config.validate()?;
    let replay = replay(position, candles, config, &ReplayContext::new(capital_basis))?;
    Ok(replay.closed)
}

/// Replays `candles` against `position`. Assumes `config` is already
/// validated and `candles` are ascending by timestamp.
///
/// Steps:
/// 1. Restrict candles to `[start, min(horizon, cutoff))`
/// 2. Apply reversal to get the traded side
/// 3. Entry price from the first open, with slippage
/// 4. Size from the capital basis and weight
/// 5. Feed candles to the exit rules until a terminal exit, an overlap
///    suppression or the end of the window
pub fn replay(
    position: &CandidatePosition,
    candles: &[Candle],
    config: &SimulationConfig,
    ctx: &ReplayContext,
) -> Result<Replay, LiqsimError> {
    let horizon = horizon_end(position, config)?;
    let end = ctx.cutoff.map_or(horizon, |cutoff| cutoff.min(horizon));

    let lo = candles.partition_point(|c| c.timestamp < position.start);
    let hi = candles.partition_point(|c| c.timestamp < end).max(lo);
    let window = &candles[lo..hi];

    let Some(first) = window.first() else {
        return Err(LiqsimError::NoCandlesInWindow {
            symbol: position.symbol.clone(),
            timeframe: position.timeframe.clone(),
            start: position.start,
            end,
        });
    };
    first.validate()?;

    let side = config.reversal.effective_side(position);
    let entry_price = apply_entry_slippage(side, first.open, config.slippage_pct);
    let size = position_size(ctx.capital_basis, entry_price, ctx.weight, config);

    if !size.is_finite() || size <= 0.0 {
        tracing::debug!(
            position = position.id,
            capital = ctx.capital_basis,
            weight = ctx.weight,
            "non-positive size, not entering"
        );
        return Ok(Replay {
            closed: None,
            last_candle_at: None,
            fills: Vec::new(),
        });
    }

    let mut state = SimulationState::open(side, entry_price, size, first.timestamp, config);

    for candle in window {
        candle.validate()?;
        match evaluate_candle(&mut state, config, candle, ctx.overlap_guard) {
            CandleVerdict::Continue => {}
            CandleVerdict::Suppressed => {
                tracing::debug!(
                    position = position.id,
                    %side,
                    at = %candle.timestamp,
                    "candle already consumed on this side"
                );
                break;
            }
            CandleVerdict::Closed(exit) => {
                tracing::debug!(
                    position = position.id,
                    %side,
                    reason = %exit.reason,
                    outcome = %exit.outcome,
                    price = exit.price,
                    pnl = state.realized_pnl,
                    "position closed"
                );
                let closed = ClosedPosition {
                    position_id: position.id,
                    symbol: position.symbol.clone(),
                    side,
                    strategy: position.strategy,
                    start: position.start,
                    liquidation_at: position.liquidation.triggered_at,
                    entry_price,
                    size,
                    closing_price: exit.price,
                    realized_return: state.realized_pnl,
                    fees: state.fees_paid,
                    outcome: exit.outcome,
                    exit_reason: exit.reason,
                    closed_at: exit.at,
                };
                return Ok(Replay {
                    closed: Some(closed),
                    last_candle_at: state.last_candle_at,
                    fills: state.fills,
                });
            }
        }
    }

    tracing::trace!(position = position.id, "no exit within window");
    Ok(Replay {
        closed: None,
        last_candle_at: state.last_candle_at,
        fills: state.fills,
    })
}
