//! Order-flow metrics from Bitquery
//!
//! Two GraphQL queries per token: five minutes of pump.fun trades, then the
//! curve's progress and graduation flag.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;
use tracing::warn;

use crate::error::{Error, Result};

const TRADES_QUERY: &str = r#"
query PumpFunTokenStats($mint: String!) {
  Solana {
    DEXTrades(
      where: {
        Trade: {
          Currency: { MintAddress: { is: $mint } }
          Protocol: { Name: { is: "Pump.fun" } }
        }
        Block: { Time: { since: "-5 minutes" } }
      }
    ) {
      count: count
      buyVolume: TradeAmountInUSD(calculate: sum, where: { Side: { Type: { is: buy } } })
      sellVolume: TradeAmountInUSD(calculate: sum, where: { Side: { Type: { is: sell } } })
      uniqueBuyers: count(uniq: Trade_Buy_Account)
      uniqueSellers: count(uniq: Trade_Sell_Account)
    }
  }
}
"#;

const CURVE_QUERY: &str = r#"
query PumpFunBondingCurve($mint: String!) {
  Solana {
    PumpFunToken(where: { MintAddress: { is: $mint } }) {
      MintAddress
      BondingCurveProgressPercentage
      HasGraduated
    }
  }
}
"#;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowMetrics {
    pub trade_count: u64,
    pub buy_volume_usd: f64,
    pub sell_volume_usd: f64,
    pub unique_buyers: u32,
    pub unique_sellers: u32,
    pub progress_pct: f64,
    pub graduated: bool,
}

#[async_trait]
pub trait FlowMetricsSource: Send + Sync {
    /// `None` when the service has no data for the token
    async fn flow_metrics(&self, mint: &Pubkey) -> Result<Option<FlowMetrics>>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TradeStats {
    #[serde(default)]
    count: Option<Value>,
    #[serde(default)]
    buy_volume: Option<Value>,
    #[serde(default)]
    sell_volume: Option<Value>,
    #[serde(default)]
    unique_buyers: Option<Value>,
    #[serde(default)]
    unique_sellers: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CurveStats {
    #[serde(rename = "BondingCurveProgressPercentage", default)]
    progress: Option<Value>,
    #[serde(rename = "HasGraduated", default)]
    graduated: Option<bool>,
}

/// Bitquery returns numbers as JSON numbers or strings depending on the field
fn number(value: &Option<Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

pub struct BitqueryClient {
    client: Client,
    url: String,
    api_key: String,
}

impl BitqueryClient {
    pub fn new(url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn query(&self, query: &str, mint: &Pubkey) -> Result<Value> {
        let response = self
            .client
            .post(&self.url)
            .header("X-API-KEY", &self.api_key)
            .json(&json!({ "query": query, "variables": { "mint": mint.to_string() } }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Http(format!("Bitquery HTTP {}", response.status())));
        }

        let body: Value = response.json().await?;
        if let Some(errors) = body.get("errors") {
            warn!("Bitquery errors: {}", errors);
            return Err(Error::Http(format!("Bitquery errors: {}", errors)));
        }
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }
}

fn parse_trades(data: &Value) -> Result<TradeStats> {
    match data.pointer("/Solana/DEXTrades/0") {
        Some(first) => Ok(serde_json::from_value(first.clone())?),
        // No trades in the window
        None => Ok(TradeStats::default()),
    }
}

fn parse_curve(data: &Value) -> Result<Option<CurveStats>> {
    match data.pointer("/Solana/PumpFunToken/0") {
        Some(first) => Ok(Some(serde_json::from_value(first.clone())?)),
        None => Ok(None),
    }
}

fn combine(trades: TradeStats, curve: CurveStats) -> FlowMetrics {
    FlowMetrics {
        trade_count: number(&trades.count) as u64,
        buy_volume_usd: number(&trades.buy_volume),
        sell_volume_usd: number(&trades.sell_volume),
        unique_buyers: number(&trades.unique_buyers) as u32,
        unique_sellers: number(&trades.unique_sellers) as u32,
        progress_pct: number(&curve.progress),
        graduated: curve.graduated.unwrap_or(false),
    }
}

#[async_trait]
impl FlowMetricsSource for BitqueryClient {
    async fn flow_metrics(&self, mint: &Pubkey) -> Result<Option<FlowMetrics>> {
        let trades = parse_trades(&self.query(TRADES_QUERY, mint).await?)?;
        let Some(curve) = parse_curve(&self.query(CURVE_QUERY, mint).await?)? else {
            return Ok(None);
        };
        Ok(Some(combine(trades, curve)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_answer() {
        let trades = json!({
            "Solana": { "DEXTrades": [{
                "count": "42",
                "buyVolume": 2500.5,
                "sellVolume": "300.25",
                "uniqueBuyers": "12",
                "uniqueSellers": 4
            }]}
        });
        let curve = json!({
            "Solana": { "PumpFunToken": [{
                "MintAddress": "x",
                "BondingCurveProgressPercentage": "33.3",
                "HasGraduated": false
            }]}
        });

        let metrics = combine(
            parse_trades(&trades).unwrap(),
            parse_curve(&curve).unwrap().unwrap(),
        );
        assert_eq!(metrics.trade_count, 42);
        assert_eq!(metrics.unique_buyers, 12);
        assert_eq!(metrics.unique_sellers, 4);
        assert!((metrics.buy_volume_usd - 2500.5).abs() < 1e-9);
        assert!((metrics.progress_pct - 33.3).abs() < 1e-9);
        assert!(!metrics.graduated);
    }

    #[test]
    fn test_no_trades_is_zero_flow() {
        let trades = json!({ "Solana": { "DEXTrades": [] } });
        let stats = parse_trades(&trades).unwrap();
        assert_eq!(number(&stats.unique_buyers), 0.0);
    }

    #[test]
    fn test_unknown_token_is_none() {
        let curve = json!({ "Solana": { "PumpFunToken": [] } });
        assert!(parse_curve(&curve).unwrap().is_none());
    }
}
