//! Simulation parameters for one what-if run.

use crate::domain::config_validation::validate_simulation_config;
use crate::domain::error::LiqsimError;
use crate::domain::position::{CandidatePosition, Side, StrategyTag};

/// Most take-profit tiers a configuration may carry.
pub const MAX_TAKE_PROFIT_TIERS: usize = 9;

/// Partial close at `trigger_pct` percent of the take-profit distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TakeProfitTier {
    /// Percent of the full take-profit distance, e.g. 50 = halfway.
    pub trigger_pct: f64,
    /// Percent of the remaining open size to close.
    pub amount_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingStop {
    pub pct: f64,
}

/// Moves the stop to the other side of entry once price has covered
/// `trigger_pct` percent of the take-profit distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakevenMove {
    pub trigger_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RsiScaleOut {
    pub lower: f64,
    pub upper: f64,
    /// Percent of the remaining open size sold per trigger.
    pub sell_pct: f64,
    pub period: usize,
    /// Percent of the take-profit distance price must travel, either way,
    /// before RSI is consulted.
    pub activation_pct: f64,
}

impl Default for RsiScaleOut {
    fn default() -> Self {
        RsiScaleOut {
            lower: 30.0,
            upper: 70.0,
            sell_pct: 25.0,
            period: 14,
            activation_pct: 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReversalMode {
    #[default]
    None,
    /// Flip every candidate that is not already tagged `reversed`.
    ReverseAll,
    /// Flip only candidates tagged `reversed`.
    ReverseTagged,
}

impl ReversalMode {
    pub fn effective_side(self, position: &CandidatePosition) -> Side {
        let tagged = position.strategy == StrategyTag::Reversed;
        let flip = match self {
            ReversalMode::None => false,
            ReversalMode::ReverseAll => !tagged,
            ReversalMode::ReverseTagged => tagged,
        };
        if flip {
            position.side.reversed()
        } else {
            position.side
        }
    }
}

impl std::str::FromStr for ReversalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "none" | "" => Ok(ReversalMode::None),
            "reverse_all" | "all" => Ok(ReversalMode::ReverseAll),
            "reverse_tagged" | "tagged" => Ok(ReversalMode::ReverseTagged),
            other => Err(format!("unknown reversal mode '{other}'")),
        }
    }
}

/// Price tested against take-profit levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerPrice {
    #[default]
    Close,
    /// High for LONG, low for SHORT.
    Extreme,
}

impl std::str::FromStr for TriggerPrice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "close" => Ok(TriggerPrice::Close),
            "extreme" | "high_low" => Ok(TriggerPrice::Extreme),
            other => Err(format!("unknown trigger price '{other}'")),
        }
    }
}

/// Exchange fee rates as fractions (0.0006 = 0.06%).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeSchedule {
    pub limit_rate: f64,
    pub market_rate: f64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        FeeSchedule {
            limit_rate: 0.0002,
            market_rate: 0.0006,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    /// Evaluated in this order; never sorted.
    pub take_profit_tiers: Vec<TakeProfitTier>,
    pub trailing_stop: Option<TrailingStop>,
    pub breakeven: Option<BreakevenMove>,
    pub rsi: Option<RsiScaleOut>,
    pub compound: bool,
    pub percentage_per_trade: f64,
    pub no_overlap: bool,
    pub reversal: ReversalMode,
    pub horizon_days: i64,
    pub slippage_pct: f64,
    pub take_profit_trigger: TriggerPrice,
    pub fees: FeeSchedule,
    pub initial_capital: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            stop_loss_pct: 0.5,
            take_profit_pct: 5.0,
            take_profit_tiers: vec![
                TakeProfitTier {
                    trigger_pct: 50.0,
                    amount_pct: 20.0,
                },
                TakeProfitTier {
                    trigger_pct: 70.0,
                    amount_pct: 50.0,
                },
            ],
            trailing_stop: None,
            breakeven: None,
            rsi: None,
            compound: false,
            percentage_per_trade: 1.0,
            no_overlap: false,
            reversal: ReversalMode::None,
            horizon_days: 28,
            slippage_pct: 0.01,
            take_profit_trigger: TriggerPrice::Close,
            fees: FeeSchedule::default(),
            initial_capital: 10_000.0,
        }
    }
}

impl SimulationConfig {
    /// Plain stop-loss / take-profit rules with nothing else enabled.
    pub fn plain(stop_loss_pct: f64, take_profit_pct: f64) -> Self {
        SimulationConfig {
            stop_loss_pct,
            take_profit_pct,
            take_profit_tiers: Vec::new(),
            ..SimulationConfig::default()
        }
    }

    pub fn validate(&self) -> Result<(), LiqsimError> {
        validate_simulation_config(self)
    }

    /// Reward-to-risk ratio used by R-multiple scoring.
    pub fn reward_ratio(&self) -> f64 {
        self.take_profit_pct / self.stop_loss_pct
    }
}
