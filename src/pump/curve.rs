//! Bonding curve account decoding and constant-product math
//!
//! # WARNING: layout may change without notice
//! Pump.fun has modified their account layouts in the past. If decoding
//! starts failing, compare against a freshly fetched curve account.

use borsh::{BorshDeserialize, BorshSerialize};

use super::program::{ACCOUNT_DISCRIMINATORS, CURVE_GRADUATION_LAMPORTS, TOKEN_DECIMALS};
use crate::error::{Error, Result};
use crate::types::{CurveSnapshot, LAMPORTS_PER_SOL};

/// BondingCurve account state
#[derive(Debug, Clone, PartialEq, BorshDeserialize, BorshSerialize)]
pub struct BondingCurve {
    _discriminator: [u8; 8],
    pub virtual_token_reserves: u64,
    pub virtual_sol_reserves: u64,
    pub real_token_reserves: u64,
    pub real_sol_reserves: u64,
    pub token_total_supply: u64,
    /// Curve has migrated off pump.fun
    pub complete: bool,
}

impl BondingCurve {
    pub fn new(
        virtual_token_reserves: u64,
        virtual_sol_reserves: u64,
        real_token_reserves: u64,
        real_sol_reserves: u64,
        token_total_supply: u64,
        complete: bool,
    ) -> Self {
        Self {
            _discriminator: ACCOUNT_DISCRIMINATORS::BONDING_CURVE,
            virtual_token_reserves,
            virtual_sol_reserves,
            real_token_reserves,
            real_sol_reserves,
            token_total_supply,
            complete,
        }
    }

    /// Decode from raw account data, checking the discriminator
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(Error::CurveDecode("Account data too short".to_string()));
        }

        if data[..8] != ACCOUNT_DISCRIMINATORS::BONDING_CURVE {
            return Err(Error::CurveDecode(format!(
                "Wrong discriminator: expected {:?}, got {:?}",
                ACCOUNT_DISCRIMINATORS::BONDING_CURVE,
                &data[..8]
            )));
        }

        // Newer curves carry trailing fields (creator etc.); only the prefix is read
        let mut cursor = data;
        <Self as BorshDeserialize>::deserialize(&mut cursor)
            .map_err(|e| Error::CurveDecode(format!("Borsh decode failed: {}", e)))
    }

    /// SOL per whole token
    pub fn price_sol(&self) -> Result<f64> {
        if self.virtual_token_reserves == 0 {
            return Err(Error::CurveDecode("virtual token reserves are zero".into()));
        }
        let sol = self.virtual_sol_reserves as f64 / LAMPORTS_PER_SOL as f64;
        let tokens = self.virtual_token_reserves as f64 / 10f64.powi(TOKEN_DECIMALS as i32);
        Ok(sol / tokens)
    }

    /// Percent of the graduation threshold raised, capped at 100
    pub fn progress_pct(&self) -> f64 {
        if self.complete {
            return 100.0;
        }
        let pct = self.real_sol_reserves as f64 / CURVE_GRADUATION_LAMPORTS as f64 * 100.0;
        pct.min(100.0)
    }

    pub fn snapshot(&self) -> Result<CurveSnapshot> {
        Ok(CurveSnapshot {
            price_sol: self.price_sol()?,
            progress_pct: self.progress_pct(),
            complete: self.complete,
        })
    }

    /// Tokens received for `sol_in` lamports (x * y = k)
    pub fn tokens_for_sol(&self, sol_in: u64) -> Result<u64> {
        if self.virtual_sol_reserves == 0 || self.virtual_token_reserves == 0 {
            return Err(Error::CurveDecode("empty reserves".into()));
        }
        let k = self.virtual_sol_reserves as u128 * self.virtual_token_reserves as u128;
        let new_sol = self.virtual_sol_reserves as u128 + sol_in as u128;
        let new_tokens = k / new_sol;
        let out = (self.virtual_token_reserves as u128).saturating_sub(new_tokens);
        Ok(out.min(self.real_token_reserves as u128) as u64)
    }

    /// Lamports received for selling `token_in` raw token units
    pub fn sol_for_tokens(&self, token_in: u64) -> Result<u64> {
        if self.virtual_sol_reserves == 0 || self.virtual_token_reserves == 0 {
            return Err(Error::CurveDecode("empty reserves".into()));
        }
        let k = self.virtual_sol_reserves as u128 * self.virtual_token_reserves as u128;
        let new_tokens = self.virtual_token_reserves as u128 + token_in as u128;
        let new_sol = k / new_tokens;
        Ok((self.virtual_sol_reserves as u128).saturating_sub(new_sol) as u64)
    }
}

/// Upper bound on SOL spent for a buy
pub fn max_sol_with_slippage(expected: u64, slippage_bps: u32) -> u64 {
    let bump = expected as u128 * slippage_bps as u128 / 10_000;
    (expected as u128 + bump).min(u64::MAX as u128) as u64
}

/// Lower bound on SOL received for a sell
pub fn min_sol_with_slippage(expected: u64, slippage_bps: u32) -> u64 {
    let cut = expected as u128 * slippage_bps.min(10_000) as u128 / 10_000;
    (expected as u128 - cut) as u64
}
