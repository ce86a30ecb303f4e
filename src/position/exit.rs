//! Exit rules
//!
//! [`observe`] folds a price tick into the position (peak, trailing arm,
//! creator holding); [`evaluate`] is pure and picks at most one action per
//! tick, in priority order: take-profit, trailing stop, stop-loss, curve
//! complete, creator exit, ladder step.

use std::fmt;

use crate::config::ExitConfig;
use crate::position::state::Position;

/// Percent thresholds are compared with this slack
const PCT_EPSILON: f64 = 1e-9;

/// One monitoring read
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub price: f64,
    pub complete: bool,
    /// `None` when the balance could not be read
    pub creator_balance: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    TakeProfit,
    TrailingStop,
    StopLoss,
    CurveComplete,
    CreatorExited,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::TakeProfit => "take profit",
            ExitReason::TrailingStop => "trailing stop",
            ExitReason::StopLoss => "stop loss",
            ExitReason::CurveComplete => "curve complete",
            ExitReason::CreatorExited => "creator exited",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitDecision {
    Hold,
    Full(ExitReason),
    /// Sell `fraction` of the remaining tokens; the position stays open
    Partial { step: usize, fraction: f64 },
}

pub fn observe(position: &mut Position, tick: &Tick, exits: &ExitConfig) {
    if tick.price > position.peak_price {
        position.peak_price = tick.price;
    }
    if !position.trailing_armed
        && position.profit_pct(position.peak_price) > exits.trailing_arm_pct + PCT_EPSILON
    {
        position.trailing_armed = true;
    }
    if tick.creator_balance.is_some_and(|b| b > 0) {
        position.creator_seen_holding = true;
    }
}

pub fn evaluate(position: &Position, tick: &Tick, exits: &ExitConfig) -> ExitDecision {
    let profit = position.profit_pct(tick.price);

    if profit + PCT_EPSILON >= exits.take_profit_pct {
        return ExitDecision::Full(ExitReason::TakeProfit);
    }
    if position.trailing_armed
        && exits.trailing_stop_pct > 0.0
        && position.drawdown_pct(tick.price) + PCT_EPSILON >= exits.trailing_stop_pct
    {
        return ExitDecision::Full(ExitReason::TrailingStop);
    }
    if profit <= -exits.stop_loss_pct + PCT_EPSILON {
        return ExitDecision::Full(ExitReason::StopLoss);
    }
    if tick.complete {
        return ExitDecision::Full(ExitReason::CurveComplete);
    }
    if position.creator_seen_holding && tick.creator_balance == Some(0) {
        return ExitDecision::Full(ExitReason::CreatorExited);
    }
    if let Some(step) = exits.ladder.get(position.ladder_index) {
        if profit + PCT_EPSILON >= step.profit_pct {
            return ExitDecision::Partial {
                step: position.ladder_index,
                fraction: step.sell_fraction,
            };
        }
    }
    ExitDecision::Hold
}

/// Raw token amount for a ladder step, never the whole position
pub fn partial_amount(token_amount: u64, fraction: f64) -> u64 {
    let amount = (token_amount as f64 * fraction.clamp(0.0, 1.0)).floor() as u64;
    amount.min(token_amount.saturating_sub(1))
}
