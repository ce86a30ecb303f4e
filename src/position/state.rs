//! Open position and its lifecycle
//!
//! `Monitoring -> Exiting -> Closed`. Closed is terminal; anything else is
//! rejected with [`Error::InvalidTransition`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CloseReason {
    Sold,
    ExitFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PositionState {
    Monitoring,
    Exiting,
    Closed(CloseReason),
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionState::Monitoring => write!(f, "monitoring"),
            PositionState::Exiting => write!(f, "exiting"),
            PositionState::Closed(CloseReason::Sold) => write!(f, "closed(sold)"),
            PositionState::Closed(CloseReason::ExitFailed) => write!(f, "closed(exit_failed)"),
        }
    }
}

impl PositionState {
    pub fn is_closed(&self) -> bool {
        matches!(self, PositionState::Closed(_))
    }

    fn allows(&self, to: &PositionState) -> bool {
        matches!(
            (self, to),
            (PositionState::Monitoring, PositionState::Exiting)
                | (PositionState::Exiting, PositionState::Closed(_))
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub mint: Pubkey,
    pub creator: Pubkey,
    /// Wallet that bought and must sell
    pub wallet: Pubkey,
    /// SOL per whole token at entry
    pub entry_price: f64,
    pub peak_price: f64,
    pub trailing_armed: bool,
    pub creator_seen_holding: bool,
    /// Next ladder step to consider
    pub ladder_index: usize,
    /// Raw token units still held
    pub token_amount: u64,
    /// SOL spent on entry, fees included
    pub cost_basis_sol: f64,
    /// SOL received from sells so far, fees deducted
    pub proceeds_sol: f64,
    pub state: PositionState,
    pub opened_at: DateTime<Utc>,
    pub entry_signature: String,
}

impl Position {
    pub fn open(
        mint: Pubkey,
        creator: Pubkey,
        wallet: Pubkey,
        entry_price: f64,
        token_amount: u64,
        cost_basis_sol: f64,
        entry_signature: String,
    ) -> Self {
        Self {
            mint,
            creator,
            wallet,
            entry_price,
            peak_price: entry_price,
            trailing_armed: false,
            creator_seen_holding: false,
            ladder_index: 0,
            token_amount,
            cost_basis_sol,
            proceeds_sol: 0.0,
            state: PositionState::Monitoring,
            opened_at: Utc::now(),
            entry_signature,
        }
    }

    pub fn transition(&mut self, to: PositionState) -> Result<()> {
        if !self.state.allows(&to) {
            return Err(Error::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        Ok(())
    }

    /// Percent gain of `price` over entry
    pub fn profit_pct(&self, price: f64) -> f64 {
        if self.entry_price <= 0.0 {
            return 0.0;
        }
        (price - self.entry_price) / self.entry_price * 100.0
    }

    /// Percent drop of `price` from the peak
    pub fn drawdown_pct(&self, price: f64) -> f64 {
        if self.peak_price <= 0.0 {
            return 0.0;
        }
        ((self.peak_price - price) / self.peak_price * 100.0).max(0.0)
    }

    pub fn realized_pnl_sol(&self) -> f64 {
        self.proceeds_sol - self.cost_basis_sol
    }

    pub fn short_mint(&self) -> String {
        let mint = self.mint.to_string();
        mint[..8.min(mint.len())].to_string()
    }
}
