//! Transaction plans and submission outcomes

use solana_sdk::instruction::Instruction;
use solana_sdk::signature::Signature;
use std::fmt;

use crate::config::SubmissionConfig;

/// Base fee charged per transaction signature
pub const LAMPORTS_PER_SIGNATURE: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
    Transfer,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "buy"),
            TradeSide::Sell => write!(f, "sell"),
            TradeSide::Transfer => write!(f, "transfer"),
        }
    }
}

/// Everything needed to (re)build a transaction
///
/// A plan is signed afresh for every attempt; the signed form never outlives
/// the attempt that produced it.
#[derive(Debug, Clone)]
pub struct TxPlan {
    pub label: String,
    pub side: TradeSide,
    pub instructions: Vec<Instruction>,
    /// Relay tip; 0 sends directly
    pub tip_lamports: u64,
    pub priority_fee_micro_lamports: u64,
    pub compute_unit_limit: u32,
}

impl TxPlan {
    pub fn new(label: impl Into<String>, side: TradeSide, instructions: Vec<Instruction>) -> Self {
        Self {
            label: label.into(),
            side,
            instructions,
            tip_lamports: 0,
            priority_fee_micro_lamports: 0,
            compute_unit_limit: 0,
        }
    }

    pub fn with_tip(mut self, tip_lamports: u64) -> Self {
        self.tip_lamports = tip_lamports;
        self
    }

    /// Apply the configured compute-unit price and limit
    pub fn with_fees_from(mut self, config: &SubmissionConfig) -> Self {
        self.priority_fee_micro_lamports = config.priority_fee_micro_lamports;
        self.compute_unit_limit = config.compute_unit_limit;
        self
    }

    /// Network fee expected for one signature at the planned priority
    pub fn estimated_network_fee(&self) -> u64 {
        let priority = self.compute_unit_limit as u128 * self.priority_fee_micro_lamports as u128
            / 1_000_000;
        LAMPORTS_PER_SIGNATURE + priority as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitRoute {
    Relay { bundle_id: String },
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationStatus {
    Confirmed,
    /// Landed but the program failed; fees were still charged
    ConfirmedWithError(String),
    /// Not seen within the confirmation timeout; may still land
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct TxOutcome {
    pub signature: Signature,
    pub route: SubmitRoute,
    pub status: ConfirmationStatus,
    pub attempts: u32,
    /// Network fee plus relay tip; 0 while the outcome is unknown
    pub fee_lamports: u64,
}

impl TxOutcome {
    pub fn is_confirmed(&self) -> bool {
        self.status == ConfirmationStatus::Confirmed
    }

    pub fn is_timed_out(&self) -> bool {
        self.status == ConfirmationStatus::TimedOut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_estimate_includes_priority() {
        let plan = TxPlan::new("buy", TradeSide::Buy, Vec::new()).with_fees_from(&SubmissionConfig {
            priority_fee_micro_lamports: 100_000,
            compute_unit_limit: 200_000,
            ..Default::default()
        });
        // 200k CU at 0.1 lamport each
        assert_eq!(plan.estimated_network_fee(), 5_000 + 20_000);
    }

    #[test]
    fn test_new_plan_has_no_tip() {
        let plan = TxPlan::new("sell", TradeSide::Sell, Vec::new());
        assert_eq!(plan.tip_lamports, 0);
        assert_eq!(plan.estimated_network_fee(), LAMPORTS_PER_SIGNATURE);
        assert_eq!(plan.with_tip(1_000).tip_lamports, 1_000);
    }
}
