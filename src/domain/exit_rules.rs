//! Per-candle exit rule evaluation.
//!
//! [`evaluate_candle`] applies the exit rules to one candle in fixed
//! priority order:
//!
//! 1. Overlap suppression
//! 2. Trailing stop (ratchet, then breach check)
//! 3. Fixed stop-loss
//! 4. Breakeven move (one-shot)
//! 5. Take-profit tiers in configured order (one-shot each)
//! 6. Final take-profit
//! 7. RSI scale-out
//!
//! Steps 2, 3 and 6 are terminal. Steps 5 and 7 close part of the open size.

use chrono::NaiveDateTime;
use std::collections::VecDeque;

use crate::domain::candle::Candle;
use crate::domain::config::{SimulationConfig, TriggerPrice};
use crate::domain::execution::{Fill, FillKind, close_fill, open_fill};
use crate::domain::indicator::{ChangeBasis, relative_strength_index};
use crate::domain::position::{ExitReason, Outcome, Side};

const BREAKEVEN_BIT: u16 = 1;

/// Fired-once markers for the breakeven move and each take-profit tier.
///
/// Bit 0 is breakeven, bit `n + 1` is tier `n`. Bits are only ever set, so a
/// rule that has fired can never fire again for the same position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OneShotFlags(u16);

impl OneShotFlags {
    fn tier_bit(index: usize) -> u16 {
        1 << (index + 1)
    }

    /// Marks `bit` fired. Returns `true` only the first time.
    fn fire(&mut self, bit: u16) -> bool {
        let fresh = self.0 & bit == 0;
        self.0 |= bit;
        fresh
    }

    pub fn fire_breakeven(&mut self) -> bool {
        self.fire(BREAKEVEN_BIT)
    }

    pub fn fire_tier(&mut self, index: usize) -> bool {
        self.fire(Self::tier_bit(index))
    }

    pub fn breakeven_fired(&self) -> bool {
        self.0 & BREAKEVEN_BIT != 0
    }

    pub fn tier_fired(&self, index: usize) -> bool {
        self.0 & Self::tier_bit(index) != 0
    }
}

/// RSI scale-out fires when RSI crosses into the exit zone and re-arms once
/// it leaves it again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RsiLatch {
    #[default]
    Armed,
    Fired,
}

#[derive(Debug, Clone)]
pub struct SimulationState {
    pub side: Side,
    pub entry_price: f64,
    pub initial_size: f64,
    pub open_size: f64,
    /// Net of fees, including the opening fee.
    pub realized_pnl: f64,
    pub fees_paid: f64,
    /// Signed: negative once the breakeven move has flipped it.
    pub stop_loss_pct: f64,
    pub trailing_price: Option<f64>,
    pub flags: OneShotFlags,
    pub rsi_latch: RsiLatch,
    rsi_buffer: VecDeque<Candle>,
    pub last_candle_at: Option<NaiveDateTime>,
    pub fills: Vec<Fill>,
}

impl SimulationState {
    /// Opens the position: books the entry fill and arms the trailing stop.
    pub fn open(
        side: Side,
        entry_price: f64,
        size: f64,
        opened_at: NaiveDateTime,
        config: &SimulationConfig,
    ) -> Self {
        let entry = open_fill(size, entry_price, opened_at, config);
        let trailing_price = config
            .trailing_stop
            .map(|t| side.adverse_offset(entry_price, t.pct));
        let rsi_capacity = config.rsi.map(|r| r.period).unwrap_or(0);

        SimulationState {
            side,
            entry_price,
            initial_size: size,
            open_size: size,
            realized_pnl: entry.net(),
            fees_paid: entry.fee,
            stop_loss_pct: config.stop_loss_pct,
            trailing_price,
            flags: OneShotFlags::default(),
            rsi_latch: RsiLatch::Armed,
            rsi_buffer: VecDeque::with_capacity(rsi_capacity),
            last_candle_at: None,
            fills: vec![entry],
        }
    }

    pub fn stop_price(&self) -> f64 {
        self.side.adverse_offset(self.entry_price, self.stop_loss_pct)
    }

    /// Sum of sizes closed so far.
    pub fn closed_size(&self) -> f64 {
        self.fills
            .iter()
            .filter(|f| f.kind != FillKind::Entry)
            .map(|f| f.size)
            .sum()
    }

    fn book(&mut self, fill: Fill) {
        self.open_size -= fill.size;
        self.realized_pnl += fill.net();
        self.fees_paid += fill.fee;
        self.fills.push(fill);
    }

    fn close_part(&mut self, kind: FillKind, size: f64, price: f64, rate: f64, at: NaiveDateTime) {
        let fill = close_fill(kind, self.side, self.entry_price, size, price, rate, at);
        tracing::trace!(%kind, size, price, "partial exit");
        self.book(fill);
    }

    fn close_all(
        &mut self,
        kind: FillKind,
        reason: ExitReason,
        price: f64,
        rate: f64,
        at: NaiveDateTime,
    ) -> TerminalExit {
        let size = self.open_size;
        let fill = close_fill(kind, self.side, self.entry_price, size, price, rate, at);
        self.book(fill);
        self.open_size = 0.0;

        let outcome = match reason {
            ExitReason::StopLoss => Outcome::Loss,
            ExitReason::TakeProfit => Outcome::Win,
            ExitReason::TrailingStop if self.realized_pnl > 0.0 => Outcome::Win,
            ExitReason::TrailingStop => Outcome::Loss,
        };

        TerminalExit {
            reason,
            price,
            outcome,
            at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerminalExit {
    pub reason: ExitReason,
    pub price: f64,
    pub outcome: Outcome,
    pub at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CandleVerdict {
    /// Position still open; feed the next candle.
    Continue,
    Closed(TerminalExit),
    /// Candle was already consumed by an earlier position on this side.
    Suppressed,
}

fn trigger_price(side: Side, candle: &Candle, policy: TriggerPrice) -> f64 {
    match policy {
        TriggerPrice::Close => candle.close,
        TriggerPrice::Extreme => side.favorable_extreme(candle),
    }
}

/// Price level `fraction_pct` percent of the way to the take-profit.
fn take_profit_fraction(state: &SimulationState, config: &SimulationConfig, fraction_pct: f64) -> f64 {
    state
        .side
        .favorable_offset(state.entry_price, fraction_pct / 100.0 * config.take_profit_pct)
}

/// Applies every exit rule to `candle` and mutates `state`.
///
/// `overlap_guard` is the last candle consumed by an earlier position on
/// the same side; it only matters when `config.no_overlap` is set.
pub fn evaluate_candle(
    state: &mut SimulationState,
    config: &SimulationConfig,
    candle: &Candle,
    overlap_guard: Option<NaiveDateTime>,
) -> CandleVerdict {
    let side = state.side;
    let at = candle.timestamp;

    // 1. overlap suppression
    if config.no_overlap && overlap_guard.is_some_and(|guard| at < guard) {
        return CandleVerdict::Suppressed;
    }
    state.last_candle_at = Some(at);

    // 2. trailing stop
    if let (Some(trailing), Some(previous)) = (config.trailing_stop, state.trailing_price) {
        let from_extreme = side.adverse_offset(side.favorable_extreme(candle), trailing.pct);
        let ratcheted = side.tighter(side.tighter(previous, state.stop_price()), from_extreme);
        state.trailing_price = Some(ratcheted);

        if side.breached(side.adverse_extreme(candle), ratcheted) {
            let exit = state.close_all(
                FillKind::TrailingStop,
                ExitReason::TrailingStop,
                ratcheted,
                config.fees.market_rate,
                at,
            );
            return CandleVerdict::Closed(exit);
        }
    }

    // 3. fixed stop-loss
    let stop = state.stop_price();
    if side.breached(side.adverse_extreme(candle), stop) {
        let exit = state.close_all(
            FillKind::StopLoss,
            ExitReason::StopLoss,
            stop,
            config.fees.market_rate,
            at,
        );
        return CandleVerdict::Closed(exit);
    }

    // 4. breakeven move
    if let Some(be) = config.breakeven {
        let level = take_profit_fraction(state, config, be.trigger_pct);
        if !state.flags.breakeven_fired() && side.beyond(side.favorable_extreme(candle), level) {
            state.flags.fire_breakeven();
            state.stop_loss_pct = -state.stop_loss_pct;
            tracing::trace!(stop = state.stop_price(), "stop moved past entry");
        }
    }

    // 5. take-profit tiers
    let tested = trigger_price(side, candle, config.take_profit_trigger);
    for (index, tier) in config.take_profit_tiers.iter().enumerate() {
        if state.flags.tier_fired(index) {
            continue;
        }
        let level = take_profit_fraction(state, config, tier.trigger_pct);
        if side.reached(tested, level) && state.flags.fire_tier(index) {
            let size = state.open_size * tier.amount_pct / 100.0;
            state.close_part(
                FillKind::TakeProfitTier(index),
                size,
                level,
                config.fees.limit_rate,
                at,
            );
        }
    }

    // 6. final take-profit
    let target = side.favorable_offset(state.entry_price, config.take_profit_pct);
    if side.reached(tested, target) {
        let exit = state.close_all(
            FillKind::TakeProfit,
            ExitReason::TakeProfit,
            target,
            config.fees.limit_rate,
            at,
        );
        return CandleVerdict::Closed(exit);
    }

    // 7. RSI scale-out
    if let Some(rsi) = config.rsi {
        if state.rsi_buffer.len() == rsi.period {
            state.rsi_buffer.pop_front();
        }
        state.rsi_buffer.push_back(candle.clone());

        let distance = rsi.activation_pct / 100.0 * config.take_profit_pct;
        let moved = candle.low <= Side::Long.adverse_offset(state.entry_price, distance)
            || candle.high >= Side::Long.favorable_offset(state.entry_price, distance);

        if moved && state.open_size > 0.0 {
            let window = state.rsi_buffer.make_contiguous();
            if let Ok(value) = relative_strength_index(window, rsi.period, ChangeBasis::OpenToClose) {
                let in_zone = match side {
                    Side::Long => value >= rsi.upper,
                    Side::Short => value <= rsi.lower,
                };
                match (in_zone, state.rsi_latch) {
                    (true, RsiLatch::Armed) => {
                        state.rsi_latch = RsiLatch::Fired;
                        let size = state.open_size * rsi.sell_pct / 100.0;
                        state.close_part(
                            FillKind::RsiScaleOut,
                            size,
                            candle.close,
                            config.fees.market_rate,
                            at,
                        );
                    }
                    (false, RsiLatch::Fired) => state.rsi_latch = RsiLatch::Armed,
                    _ => {}
                }
            }
        }
    }

    CandleVerdict::Continue
}
