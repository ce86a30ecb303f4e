//! Shared domain types

use chrono::{DateTime, Utc};
use solana_sdk::pubkey::Pubkey;

/// A newly observed token awaiting the filter chain
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub mint: Pubkey,
    pub creator: Pubkey,
    /// Creation transaction signature
    pub signature: String,
    pub first_seen_at: DateTime<Utc>,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub uri: Option<String>,
}

impl Candidate {
    pub fn new(mint: Pubkey, creator: Pubkey, signature: impl Into<String>) -> Self {
        Self {
            mint,
            creator,
            signature: signature.into(),
            first_seen_at: Utc::now(),
            name: None,
            symbol: None,
            uri: None,
        }
    }

    pub fn short_mint(&self) -> String {
        let mint = self.mint.to_string();
        mint[..8.min(mint.len())].to_string()
    }
}

/// Point-in-time view of a bonding curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveSnapshot {
    /// SOL per whole token
    pub price_sol: f64,
    /// Percent of the graduation threshold already raised (0-100)
    pub progress_pct: f64,
    pub complete: bool,
}

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

pub fn sol_to_lamports(sol: f64) -> u64 {
    if sol <= 0.0 {
        return 0;
    }
    (sol * LAMPORTS_PER_SOL as f64).round() as u64
}

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}
