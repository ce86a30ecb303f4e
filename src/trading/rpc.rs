//! Chain RPC boundary
//!
//! Everything the pipeline reads from or sends to the cluster goes through
//! [`ChainRpc`]. [`SolanaRpc`] is the production adapter over the nonblocking
//! `solana-client`; [`FailoverRpc`] picks between a primary and a backup
//! endpoint with a short health probe.

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::{RpcSendTransactionConfig, RpcTransactionConfig};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use solana_transaction_status::UiTransactionEncoding;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Result of a pre-flight simulation
#[derive(Debug, Clone, Default)]
pub struct SimulationResult {
    pub success: bool,
    pub error: Option<String>,
    pub compute_units: Option<u64>,
    pub logs: Vec<String>,
}

/// How a signature looks to the cluster once it is visible
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LandedStatus {
    Confirmed,
    Failed(String),
}

/// Signature touching an address, newest first
#[derive(Debug, Clone)]
pub struct RecentSignature {
    pub signature: String,
    pub block_time: Option<i64>,
}

#[async_trait]
pub trait ChainRpc: Send + Sync {
    fn endpoint(&self) -> &str;

    async fn health(&self) -> Result<()>;

    async fn latest_blockhash(&self) -> Result<Hash>;

    async fn simulate(&self, tx: &Transaction) -> Result<SimulationResult>;

    async fn send(&self, tx: &Transaction) -> Result<Signature>;

    /// `None` while the signature is not yet visible at confirmed commitment
    async fn signature_status(&self, signature: &Signature) -> Result<Option<LandedStatus>>;

    /// Network fee paid by a landed transaction
    async fn transaction_fee(&self, signature: &Signature) -> Result<Option<u64>>;

    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>>;

    async fn sol_balance(&self, address: &Pubkey) -> Result<u64>;

    async fn recent_signatures(&self, address: &Pubkey, limit: usize)
        -> Result<Vec<RecentSignature>>;

    /// Raw amounts of the largest token accounts for a mint, descending
    async fn largest_token_accounts(&self, mint: &Pubkey) -> Result<Vec<u64>>;

    async fn token_supply(&self, mint: &Pubkey) -> Result<u64>;
}

/// `solana-client` backed RPC
pub struct SolanaRpc {
    url: String,
    client: RpcClient,
}

impl SolanaRpc {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let url = url.into();
        let client =
            RpcClient::new_with_timeout_and_commitment(url.clone(), timeout, CommitmentConfig::confirmed());
        Self { url, client }
    }
}

fn parse_amount(raw: &str) -> Result<u64> {
    raw.parse::<u64>()
        .map_err(|e| Error::Rpc(format!("bad token amount {:?}: {}", raw, e)))
}

#[async_trait]
impl ChainRpc for SolanaRpc {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn health(&self) -> Result<()> {
        self.client.get_health().await?;
        Ok(())
    }

    async fn latest_blockhash(&self) -> Result<Hash> {
        Ok(self.client.get_latest_blockhash().await?)
    }

    async fn simulate(&self, tx: &Transaction) -> Result<SimulationResult> {
        let response = self.client.simulate_transaction(tx).await?;
        let value = response.value;
        let result = SimulationResult {
            success: value.err.is_none(),
            error: value.err.map(|e| e.to_string()),
            compute_units: value.units_consumed,
            logs: value.logs.unwrap_or_default(),
        };

        if result.success {
            debug!("Simulation succeeded, compute units: {:?}", result.compute_units);
        } else {
            warn!("Simulation failed: {:?}", result.error);
            for log in &result.logs {
                debug!("  Log: {}", log);
            }
        }
        Ok(result)
    }

    async fn send(&self, tx: &Transaction) -> Result<Signature> {
        // Already simulated; the submitter owns retries
        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            max_retries: Some(0),
            ..Default::default()
        };
        self.client
            .send_transaction_with_config(tx, config)
            .await
            .map_err(|e| Error::TransactionSend(e.to_string()))
    }

    async fn signature_status(&self, signature: &Signature) -> Result<Option<LandedStatus>> {
        let statuses = self.client.get_signature_statuses(&[*signature]).await?;
        let Some(Some(status)) = statuses.value.into_iter().next() else {
            return Ok(None);
        };

        if let Some(err) = &status.err {
            return Ok(Some(LandedStatus::Failed(err.to_string())));
        }
        if status.satisfies_commitment(CommitmentConfig::confirmed()) {
            Ok(Some(LandedStatus::Confirmed))
        } else {
            Ok(None)
        }
    }

    async fn transaction_fee(&self, signature: &Signature) -> Result<Option<u64>> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Json),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };
        let tx = self
            .client
            .get_transaction_with_config(signature, config)
            .await?;
        Ok(tx.transaction.meta.map(|meta| meta.fee))
    }

    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        let response = self
            .client
            .get_account_with_commitment(address, CommitmentConfig::confirmed())
            .await?;
        Ok(response.value.map(|account| account.data))
    }

    async fn sol_balance(&self, address: &Pubkey) -> Result<u64> {
        Ok(self.client.get_balance(address).await?)
    }

    async fn recent_signatures(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<RecentSignature>> {
        let config = GetConfirmedSignaturesForAddress2Config {
            limit: Some(limit),
            commitment: Some(CommitmentConfig::confirmed()),
            ..Default::default()
        };
        let signatures = self
            .client
            .get_signatures_for_address_with_config(address, config)
            .await?;
        Ok(signatures
            .into_iter()
            .map(|s| RecentSignature {
                signature: s.signature,
                block_time: s.block_time,
            })
            .collect())
    }

    async fn largest_token_accounts(&self, mint: &Pubkey) -> Result<Vec<u64>> {
        let accounts = self.client.get_token_largest_accounts(mint).await?;
        accounts
            .iter()
            .map(|account| parse_amount(&account.amount.amount))
            .collect()
    }

    async fn token_supply(&self, mint: &Pubkey) -> Result<u64> {
        let supply = self.client.get_token_supply(mint).await?;
        parse_amount(&supply.amount)
    }
}

/// Primary endpoint with an optional backup
#[derive(Clone)]
pub struct FailoverRpc {
    primary: Arc<dyn ChainRpc>,
    backup: Option<Arc<dyn ChainRpc>>,
}

impl FailoverRpc {
    pub fn new(primary: Arc<dyn ChainRpc>, backup: Option<Arc<dyn ChainRpc>>) -> Self {
        Self { primary, backup }
    }

    pub fn primary(&self) -> Arc<dyn ChainRpc> {
        self.primary.clone()
    }

    pub fn backup(&self) -> Option<Arc<dyn ChainRpc>> {
        self.backup.clone()
    }

    /// Probe the primary; fall over to the backup when it is slow or unhealthy
    pub async fn select(&self, probe_timeout: Duration) -> Arc<dyn ChainRpc> {
        let healthy = match tokio::time::timeout(probe_timeout, self.primary.health()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("Primary RPC {} unhealthy: {}", self.primary.endpoint(), e);
                false
            }
            Err(_) => {
                warn!(
                    "Primary RPC {} health probe timed out after {:?}",
                    self.primary.endpoint(),
                    probe_timeout
                );
                false
            }
        };

        if healthy {
            return self.primary.clone();
        }

        match &self.backup {
            Some(backup) => {
                warn!("Switching to backup RPC {}", backup.endpoint());
                backup.clone()
            }
            None => self.primary.clone(),
        }
    }
}
