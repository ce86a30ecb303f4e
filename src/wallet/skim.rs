//! Profit skim
//!
//! After a profitable sell, move a fixed amount of SOL to the profit wallet.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::system_instruction;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{SubmissionConfig, WalletConfig};
use crate::error::{Error, Result};
use crate::trading::{TradeSide, TransactionSubmitter, TxOutcome, TxPlan};
use crate::types::sol_to_lamports;

pub struct ProfitSkimmer {
    destination: Pubkey,
    submitter: Arc<TransactionSubmitter>,
}

impl ProfitSkimmer {
    pub fn new(destination: Pubkey, submitter: Arc<TransactionSubmitter>) -> Self {
        Self {
            destination,
            submitter,
        }
    }

    /// `None` when no profit wallet is configured
    pub fn from_config(
        wallet: &WalletConfig,
        submitter: Arc<TransactionSubmitter>,
    ) -> Result<Option<Self>> {
        let Some(address) = wallet.profit_wallet.as_deref().filter(|a| !a.is_empty()) else {
            return Ok(None);
        };
        let destination = Pubkey::from_str(address)
            .map_err(|e| Error::Config(format!("Invalid profit wallet {}: {}", address, e)))?;
        Ok(Some(Self::new(destination, submitter)))
    }

    pub fn should_skim(pnl_sol: f64, wallet: &WalletConfig) -> bool {
        pnl_sol > wallet.skim_threshold_sol && wallet.skim_amount_sol > 0.0
    }

    pub fn plan(&self, from: &Pubkey, wallet: &WalletConfig) -> TxPlan {
        let lamports = sol_to_lamports(wallet.skim_amount_sol);
        TxPlan::new(
            format!("skim {} SOL", wallet.skim_amount_sol),
            TradeSide::Transfer,
            vec![system_instruction::transfer(from, &self.destination, lamports)],
        )
    }

    /// Transfer `skim_amount_sol` when `pnl_sol` clears the threshold
    pub async fn maybe_skim(
        &self,
        pnl_sol: f64,
        signer: &Keypair,
        wallet: &WalletConfig,
        policy: &SubmissionConfig,
    ) -> Result<Option<TxOutcome>> {
        if !Self::should_skim(pnl_sol, wallet) {
            return Ok(None);
        }
        let plan = self.plan(&signer.pubkey(), wallet);
        let outcome = self.submitter.submit(&plan, signer, policy).await?;
        if outcome.is_confirmed() {
            info!(
                "Skimmed {} SOL to {} (sig: {})",
                wallet.skim_amount_sol, self.destination, outcome.signature
            );
        } else {
            warn!("Skim transfer {} not confirmed: {:?}", outcome.signature, outcome.status);
        }
        Ok(Some(outcome))
    }
}
