//! Bundle relay (Jito block engine)
//!
//! A single `sendBundle` JSON-RPC call per plan. The relay never retries on
//! its own: a refused or failed bundle surfaces as [`Error::RelayRejection`]
//! and the submitter decides whether the direct path may take over.

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::Transaction;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::error::{Error, Result};
use crate::pump::program::JITO_TIP_ACCOUNTS;

/// Jito caps bundles at five transactions
pub const MAX_BUNDLE_LEN: usize = 5;

#[async_trait]
pub trait BundleRelay: Send + Sync {
    /// Submit a bundle, returning the relay's bundle id on acceptance
    async fn send_bundle(&self, transactions: &[Transaction]) -> Result<String>;

    /// Account the tip transfer must pay
    fn tip_account(&self) -> Pubkey;
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<String>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Jito block-engine client over plain JSON-RPC
pub struct JitoRelay {
    client: reqwest::Client,
    bundles_url: String,
    tip_accounts: Vec<Pubkey>,
}

impl JitoRelay {
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let tip_accounts = JITO_TIP_ACCOUNTS
            .iter()
            .map(|s| Pubkey::from_str(s))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Config(format!("Invalid tip account: {}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build relay client: {}", e)))?;

        let bundles_url = format!(
            "{}/api/v1/bundles",
            config.block_engine_url.trim_end_matches('/')
        );
        info!("Bundle relay initialized for {}", bundles_url);

        Ok(Self {
            client,
            bundles_url,
            tip_accounts,
        })
    }

    /// Cheap reachability check used by `sniper health`
    pub async fn ping(&self) -> Result<Duration> {
        let start = std::time::Instant::now();
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getTipAccounts",
            "params": []
        });
        self.client
            .post(&self.bundles_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(start.elapsed())
    }
}

fn encode_transactions(transactions: &[Transaction]) -> Result<Vec<String>> {
    transactions
        .iter()
        .map(|tx| {
            bincode::serialize(tx)
                .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes))
                .map_err(|e| Error::Serialization(e.to_string()))
        })
        .collect()
}

#[async_trait]
impl BundleRelay for JitoRelay {
    async fn send_bundle(&self, transactions: &[Transaction]) -> Result<String> {
        if transactions.is_empty() || transactions.len() > MAX_BUNDLE_LEN {
            return Err(Error::RelayRejection(format!(
                "bundle must hold 1..={} transactions, got {}",
                MAX_BUNDLE_LEN,
                transactions.len()
            )));
        }

        let encoded = encode_transactions(transactions)?;
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sendBundle",
            "params": [encoded, { "encoding": "base64" }]
        });

        let response = self
            .client
            .post(&self.bundles_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::RelayRejection(format!("relay POST failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(status = %status, body = %body, "Relay refused bundle");
            return Err(Error::RelayRejection(format!("HTTP {}: {}", status, body)));
        }

        let parsed: JsonRpcResponse = serde_json::from_str(&body)
            .map_err(|e| Error::RelayRejection(format!("unreadable relay reply: {}", e)))?;

        match (parsed.result, parsed.error) {
            (Some(bundle_id), _) => {
                debug!(bundle_id = %bundle_id, "Bundle accepted");
                Ok(bundle_id)
            }
            (None, Some(err)) => Err(Error::RelayRejection(format!(
                "{} (code {})",
                err.message, err.code
            ))),
            (None, None) => Err(Error::RelayRejection("empty relay reply".into())),
        }
    }

    fn tip_account(&self) -> Pubkey {
        use rand::Rng;
        let idx = rand::thread_rng().gen_range(0..self.tip_accounts.len());
        self.tip_accounts[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RelayConfig {
        RelayConfig {
            enabled: true,
            block_engine_url: "https://ny.mainnet.block-engine.jito.wtf/".to_string(),
            timeout_ms: 1000,
        }
    }

    #[test]
    fn test_relay_creation() {
        let relay = JitoRelay::new(&test_config()).unwrap();
        assert_eq!(relay.tip_accounts.len(), 8);
        assert_eq!(
            relay.bundles_url,
            "https://ny.mainnet.block-engine.jito.wtf/api/v1/bundles"
        );
        assert!(relay.tip_accounts.contains(&relay.tip_account()));
    }

    #[tokio::test]
    async fn test_empty_bundle_is_rejected_locally() {
        let relay = JitoRelay::new(&test_config()).unwrap();
        let err = relay.send_bundle(&[]).await.unwrap_err();
        assert!(matches!(err, Error::RelayRejection(_)));
    }

    #[test]
    fn test_reply_parsing() {
        let ok: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","result":"abc123","id":1}"#).unwrap();
        assert_eq!(ok.result.as_deref(), Some("abc123"));

        let err: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","error":{"code":-32602,"message":"bundle contains an expired blockhash"},"id":1}"#,
        )
        .unwrap();
        assert!(err.result.is_none());
        assert_eq!(err.error.unwrap().code, -32602);
    }
}
