//! Global fee budget
//!
//! Every settled submission reports its fee here. Once cumulative spend
//! reaches `initial_capital * fee_limit_fraction` no new entry is allowed;
//! exits are never gated by this.

use std::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::types::lamports_to_sol;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetState {
    pub initial_capital_lamports: u64,
    pub cumulative_fee_lamports: u64,
    pub limit_fraction: f64,
}

impl BudgetState {
    pub fn limit_lamports(&self) -> u64 {
        (self.initial_capital_lamports as f64 * self.limit_fraction) as u64
    }

    pub fn exhausted(&self) -> bool {
        self.cumulative_fee_lamports >= self.limit_lamports()
    }
}

pub struct BudgetGovernor {
    state: Mutex<BudgetState>,
}

impl BudgetGovernor {
    pub fn new(initial_capital_lamports: u64, limit_fraction: f64) -> Self {
        info!(
            "Fee budget: {:.4} SOL ({:.2}% of {:.4} SOL)",
            lamports_to_sol((initial_capital_lamports as f64 * limit_fraction) as u64),
            limit_fraction * 100.0,
            lamports_to_sol(initial_capital_lamports)
        );
        Self {
            state: Mutex::new(BudgetState {
                initial_capital_lamports,
                cumulative_fee_lamports: 0,
                limit_fraction,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BudgetState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `true` while new entries may still spend fees
    pub fn check_budget(&self) -> bool {
        !self.lock().exhausted()
    }

    /// [`check_budget`](Self::check_budget) as an error
    pub fn ensure_budget(&self) -> Result<()> {
        let state = *self.lock();
        if state.exhausted() {
            return Err(Error::BudgetExceeded {
                spent_lamports: state.cumulative_fee_lamports,
                limit_lamports: state.limit_lamports(),
            });
        }
        Ok(())
    }

    pub fn record_fee(&self, lamports: u64) {
        let mut state = self.lock();
        let was_exhausted = state.exhausted();
        state.cumulative_fee_lamports = state.cumulative_fee_lamports.saturating_add(lamports);
        if !was_exhausted && state.exhausted() {
            warn!(
                "Fee budget exhausted: {} of {} lamports spent, new entries stop",
                state.cumulative_fee_lamports,
                state.limit_lamports()
            );
        }
    }

    /// Apply a reloaded fraction; spend already recorded is kept
    pub fn set_limit_fraction(&self, fraction: f64) {
        if !(fraction > 0.0 && fraction <= 1.0) {
            warn!("Ignoring invalid fee limit fraction {}", fraction);
            return;
        }
        let mut state = self.lock();
        if (state.limit_fraction - fraction).abs() > f64::EPSILON {
            info!(
                "Fee limit fraction {} -> {}",
                state.limit_fraction, fraction
            );
            state.limit_fraction = fraction;
        }
    }

    pub fn snapshot(&self) -> BudgetState {
        *self.lock()
    }
}
