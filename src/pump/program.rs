//! Pump.fun program constants, discriminators and address derivation
//!
//! # WARNING: These constants may change without notice
//! Pump.fun has historically modified their program behavior.
//! If transactions start failing or parsing breaks, these values
//! may need to be updated.
//!
//! Anchor uses the first 8 bytes of SHA-256("global:<instruction_name>")
//! as the instruction discriminator.

use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

pub const PUMP_PROGRAM_ID_STR: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";

lazy_static::lazy_static! {
    pub static ref PUMP_PROGRAM_ID: Pubkey =
        Pubkey::from_str(PUMP_PROGRAM_ID_STR).expect("Invalid pump program ID");

    /// Global config account
    pub static ref PUMP_GLOBAL: Pubkey =
        Pubkey::from_str("4wTV1YmiEkRvAtNtsSGPtUrqRYQMe5SKy2uB4Jjaxnjf").expect("Invalid global account");

    pub static ref PUMP_FEE_RECIPIENT: Pubkey =
        Pubkey::from_str("CebN5WGQ4jvEPvsVU4EoHEpgzq1VV7AbicfhtW4xC9iM").expect("Invalid fee recipient");

    pub static ref PUMP_EVENT_AUTHORITY: Pubkey =
        Pubkey::from_str("Ce6TQqeHC9p8KetsN6JsjHK7UTZk7nasjjnr7XxXp9F1").expect("Invalid event authority");
}

/// Real SOL a curve must raise before it completes
pub const CURVE_GRADUATION_LAMPORTS: u64 = 85_000_000_000;

/// Pump.fun tokens are minted with 6 decimals
pub const TOKEN_DECIMALS: u32 = 6;

/// Instruction discriminators (first 8 bytes of instruction data)
#[allow(non_snake_case)]
pub mod DISCRIMINATORS {
    /// SHA-256("global:buy")[0..8]
    pub const BUY: [u8; 8] = [102, 6, 61, 18, 1, 218, 235, 234];

    /// SHA-256("global:sell")[0..8]
    pub const SELL: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];
}

/// Account discriminators (first 8 bytes of account data)
#[allow(non_snake_case)]
pub mod ACCOUNT_DISCRIMINATORS {
    pub const BONDING_CURVE: [u8; 8] = [23, 183, 248, 55, 96, 216, 172, 96];
}

/// Jito tip accounts; the tip transfer goes in the last transaction of a bundle
pub const JITO_TIP_ACCOUNTS: [&str; 8] = [
    "96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5",
    "HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe",
    "Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY",
    "ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49",
    "DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh",
    "ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt",
    "DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL",
    "3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT",
];

/// Bonding curve PDA for a mint
pub fn derive_bonding_curve(mint: &Pubkey) -> Pubkey {
    let seeds: &[&[u8]] = &[b"bonding-curve", mint.as_ref()];
    Pubkey::find_program_address(seeds, &PUMP_PROGRAM_ID).0
}

/// Associated token account of `wallet` for `mint`
pub fn derive_ata(wallet: &Pubkey, mint: &Pubkey) -> Pubkey {
    spl_associated_token_account::get_associated_token_address(wallet, mint)
}

/// Calculate instruction discriminator from name
/// This follows Anchor's convention: SHA-256("global:<name>")[0..8]
pub fn calculate_discriminator(name: &str) -> [u8; 8] {
    use sha2::{Digest, Sha256};

    let preimage = format!("global:{}", name);
    let hash = Sha256::digest(preimage.as_bytes());

    let mut discriminator = [0u8; 8];
    discriminator.copy_from_slice(&hash[..8]);
    discriminator
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discriminator_calculation() {
        assert_eq!(calculate_discriminator("buy"), DISCRIMINATORS::BUY);
        assert_eq!(calculate_discriminator("sell"), DISCRIMINATORS::SELL);
    }

    #[test]
    fn test_program_id() {
        assert_eq!(PUMP_PROGRAM_ID.to_string(), PUMP_PROGRAM_ID_STR);
    }

    #[test]
    fn test_pda_derivation_is_deterministic() {
        let mint = Pubkey::new_unique();
        assert_eq!(derive_bonding_curve(&mint), derive_bonding_curve(&mint));

        let wallet = Pubkey::new_unique();
        assert_ne!(derive_ata(&wallet, &mint), derive_ata(&mint, &wallet));
    }

    #[test]
    fn test_tip_accounts_parse() {
        for account in JITO_TIP_ACCOUNTS {
            assert!(Pubkey::from_str(account).is_ok());
        }
    }
}
