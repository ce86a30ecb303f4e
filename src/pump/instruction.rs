//! Pump.fun buy/sell instruction encoding

use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

use super::program::{
    derive_ata, derive_bonding_curve, DISCRIMINATORS, PUMP_EVENT_AUTHORITY, PUMP_FEE_RECIPIENT,
    PUMP_GLOBAL, PUMP_PROGRAM_ID,
};

/// Addresses a trade against one curve touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeAccounts {
    pub mint: Pubkey,
    pub bonding_curve: Pubkey,
    pub associated_bonding_curve: Pubkey,
    pub user: Pubkey,
    pub user_token_account: Pubkey,
}

impl TradeAccounts {
    pub fn derive(mint: &Pubkey, user: &Pubkey) -> Self {
        let bonding_curve = derive_bonding_curve(mint);
        Self {
            mint: *mint,
            bonding_curve,
            associated_bonding_curve: derive_ata(&bonding_curve, mint),
            user: *user,
            user_token_account: derive_ata(user, mint),
        }
    }
}

fn encode(discriminator: [u8; 8], amount: u64, limit: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(24);
    data.extend_from_slice(&discriminator);
    data.extend_from_slice(&amount.to_le_bytes());
    data.extend_from_slice(&limit.to_le_bytes());
    data
}

/// Buy `token_amount` raw units, spending at most `max_sol_cost` lamports
pub fn buy(accounts: &TradeAccounts, token_amount: u64, max_sol_cost: u64) -> Instruction {
    // Order matters! Must match pump.fun program expectations
    let metas = vec![
        AccountMeta::new_readonly(*PUMP_GLOBAL, false),
        AccountMeta::new(*PUMP_FEE_RECIPIENT, false),
        AccountMeta::new_readonly(accounts.mint, false),
        AccountMeta::new(accounts.bonding_curve, false),
        AccountMeta::new(accounts.associated_bonding_curve, false),
        AccountMeta::new(accounts.user_token_account, false),
        AccountMeta::new(accounts.user, true),
        AccountMeta::new_readonly(solana_sdk::system_program::ID, false),
        AccountMeta::new_readonly(spl_token::ID, false),
        AccountMeta::new_readonly(solana_sdk::sysvar::rent::ID, false),
        AccountMeta::new_readonly(*PUMP_EVENT_AUTHORITY, false),
        AccountMeta::new_readonly(*PUMP_PROGRAM_ID, false),
    ];

    Instruction {
        program_id: *PUMP_PROGRAM_ID,
        accounts: metas,
        data: encode(DISCRIMINATORS::BUY, token_amount, max_sol_cost),
    }
}

/// Sell `token_amount` raw units, receiving at least `min_sol_output` lamports
pub fn sell(accounts: &TradeAccounts, token_amount: u64, min_sol_output: u64) -> Instruction {
    let metas = vec![
        AccountMeta::new_readonly(*PUMP_GLOBAL, false),
        AccountMeta::new(*PUMP_FEE_RECIPIENT, false),
        AccountMeta::new_readonly(accounts.mint, false),
        AccountMeta::new(accounts.bonding_curve, false),
        AccountMeta::new(accounts.associated_bonding_curve, false),
        AccountMeta::new(accounts.user_token_account, false),
        AccountMeta::new(accounts.user, true),
        AccountMeta::new_readonly(solana_sdk::system_program::ID, false),
        AccountMeta::new_readonly(spl_associated_token_account::ID, false),
        AccountMeta::new_readonly(spl_token::ID, false),
        AccountMeta::new_readonly(*PUMP_EVENT_AUTHORITY, false),
        AccountMeta::new_readonly(*PUMP_PROGRAM_ID, false),
    ];

    Instruction {
        program_id: *PUMP_PROGRAM_ID,
        accounts: metas,
        data: encode(DISCRIMINATORS::SELL, token_amount, min_sol_output),
    }
}

/// Create the user's token account if it does not exist yet
pub fn create_user_ata(accounts: &TradeAccounts) -> Instruction {
    spl_associated_token_account::instruction::create_associated_token_account_idempotent(
        &accounts.user,
        &accounts.user,
        &accounts.mint,
        &spl_token::ID,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buy_encoding() {
        let accounts = TradeAccounts::derive(&Pubkey::new_unique(), &Pubkey::new_unique());
        let ix = buy(&accounts, 1_000, 2_000);

        assert_eq!(ix.program_id, *PUMP_PROGRAM_ID);
        assert_eq!(&ix.data[..8], &DISCRIMINATORS::BUY);
        assert_eq!(u64::from_le_bytes(ix.data[8..16].try_into().unwrap()), 1_000);
        assert_eq!(u64::from_le_bytes(ix.data[16..24].try_into().unwrap()), 2_000);
        assert_eq!(ix.accounts.len(), 12);
        // The user is the only signer
        let signers: Vec<_> = ix.accounts.iter().filter(|m| m.is_signer).collect();
        assert_eq!(signers.len(), 1);
        assert_eq!(signers[0].pubkey, accounts.user);
    }

    #[test]
    fn test_sell_encoding() {
        let accounts = TradeAccounts::derive(&Pubkey::new_unique(), &Pubkey::new_unique());
        let ix = sell(&accounts, 500, 1);
        assert_eq!(&ix.data[..8], &DISCRIMINATORS::SELL);
        assert_eq!(ix.accounts[5].pubkey, accounts.user_token_account);
    }
}
