//! Append-only trade journal
//!
//! One JSON object per line. Records are only ever appended.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: RecordKind,
    pub mint: String,
    pub wallet: String,
    pub signature: String,
    pub sol_amount: f64,
    pub token_amount: u64,
    pub price_sol: f64,
    pub fee_lamports: u64,
    /// Sells only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realized_pnl_sol: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TradeRecord {
    #[allow(clippy::too_many_arguments)]
    fn new(
        kind: RecordKind,
        mint: String,
        wallet: String,
        signature: String,
        sol_amount: f64,
        token_amount: u64,
        price_sol: f64,
        fee_lamports: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            mint,
            wallet,
            signature,
            sol_amount,
            token_amount,
            price_sol,
            fee_lamports,
            realized_pnl_sol: None,
            reason: None,
        }
    }

    pub fn buy(
        mint: String,
        wallet: String,
        signature: String,
        sol_amount: f64,
        token_amount: u64,
        price_sol: f64,
        fee_lamports: u64,
    ) -> Self {
        Self::new(RecordKind::Buy, mint, wallet, signature, sol_amount, token_amount, price_sol, fee_lamports)
    }

    pub fn sell(
        mint: String,
        wallet: String,
        signature: String,
        sol_amount: f64,
        token_amount: u64,
        price_sol: f64,
        fee_lamports: u64,
    ) -> Self {
        Self::new(RecordKind::Sell, mint, wallet, signature, sol_amount, token_amount, price_sol, fee_lamports)
    }

    pub fn with_pnl(mut self, realized_pnl_sol: f64, reason: impl Into<String>) -> Self {
        self.realized_pnl_sol = Some(realized_pnl_sol);
        self.reason = Some(reason.into());
        self
    }
}

#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn record(&self, record: &TradeRecord) -> Result<()>;
}

pub struct JsonlJournal {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every record in the file, oldest first
    pub async fn load(path: &Path) -> Result<Vec<TradeRecord>> {
        let data = match tokio::fs::read_to_string(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        data.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(Error::from))
            .collect()
    }
}

#[async_trait]
impl PersistenceSink for JsonlJournal {
    async fn record(&self, record: &TradeRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!("Journaled {:?} {} to {}", record.kind, record.mint, self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy() -> TradeRecord {
        TradeRecord::buy("mint".into(), "wallet".into(), "sig".into(), 0.1, 1_000, 1e-4, 5_000)
    }

    #[tokio::test]
    async fn test_records_append_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("trades.jsonl");
        let journal = JsonlJournal::new(&path);

        let first = buy();
        let second = TradeRecord::sell("mint".into(), "wallet".into(), "sig2".into(), 0.12, 1_000, 1.2e-4, 5_000)
            .with_pnl(0.02, "take profit");
        journal.record(&first).await.unwrap();
        journal.record(&second).await.unwrap();

        let records = JsonlJournal::load(&path).await.unwrap();
        assert_eq!(records, vec![first, second]);
        assert_eq!(records[1].kind, RecordKind::Sell);
        assert_eq!(records[1].realized_pnl_sol, Some(0.02));
    }

    #[tokio::test]
    async fn test_buy_lines_omit_pnl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.jsonl");
        JsonlJournal::new(&path).record(&buy()).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"kind\":\"buy\""));
        assert!(!raw.contains("realized_pnl_sol"));
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let records = JsonlJournal::load(&dir.path().join("none.jsonl")).await.unwrap();
        assert!(records.is_empty());
    }
}
