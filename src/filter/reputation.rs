//! Analytics API client for token reputation

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

/// What the analytics service knows about a token
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenReport {
    /// 0-100, higher is worse; missing means unknown and is treated as worst
    #[serde(default = "worst_risk")]
    pub rug_risk: f64,
    #[serde(default)]
    pub bonding_curve_progress: f64,
}

fn worst_risk() -> f64 {
    100.0
}

#[async_trait]
pub trait ReputationApi: Send + Sync {
    async fn token_report(&self, mint: &Pubkey) -> Result<TokenReport>;
}

/// `GET {base}/tokens/{mint}`
pub struct HttpReputationApi {
    client: Client,
    base_url: String,
}

impl HttpReputationApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ReputationApi for HttpReputationApi {
    async fn token_report(&self, mint: &Pubkey) -> Result<TokenReport> {
        let url = format!("{}/tokens/{}", self.base_url, mint);
        debug!("Fetching reputation for {}", mint);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "analytics API returned {} for {}",
                response.status(),
                mint
            )));
        }

        response
            .json::<TokenReport>()
            .await
            .map_err(|e| Error::Serialization(format!("Failed to parse token report: {}", e)))
    }
}
