//! Best-effort alerts
//!
//! Alerts never block trading. [`AlertDispatcher`] queues them on a bounded
//! channel and a single worker forwards them to the real sink; a full queue
//! drops the alert with a warning.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    Bought {
        mint: String,
        sol: f64,
        signature: String,
    },
    Sold {
        mint: String,
        reason: String,
        pnl_sol: f64,
        signature: String,
    },
    ExitAttemptFailed {
        mint: String,
        attempt: u32,
        max_attempts: u32,
        error: String,
    },
    ExitAbandoned {
        mint: String,
        error: String,
    },
    Notice(String),
}

impl Alert {
    pub fn text(&self) -> String {
        match self {
            Alert::Bought { mint, sol, signature } => {
                format!("BUY {} for {:.4} SOL\ntx: {}", mint, sol, signature)
            }
            Alert::Sold { mint, reason, pnl_sol, signature } => format!(
                "SELL {} ({})\nPnL: {:+.4} SOL\ntx: {}",
                mint, reason, pnl_sol, signature
            ),
            Alert::ExitAttemptFailed { mint, attempt, max_attempts, error } => format!(
                "Sell of {} failed (attempt {}/{}): {}",
                mint, attempt, max_attempts, error
            ),
            Alert::ExitAbandoned { mint, error } => {
                format!("GAVE UP selling {}: {}\nManual exit required", mint, error)
            }
            Alert::Notice(text) => text.clone(),
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, alert: &Alert) -> Result<()>;
}

/// Bot API `sendMessage`
pub struct TelegramNotifier {
    client: Client,
    url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, chat_id: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: format!("https://api.telegram.org/bot{}/sendMessage", bot_token),
            chat_id: chat_id.to_string(),
        })
    }
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "chat_id": self.chat_id,
                "text": alert.text(),
                "disable_web_page_preview": true,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Http(format!("Telegram returned {}", response.status())));
        }
        Ok(())
    }
}

/// Writes alerts to the log only
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        info!("ALERT: {}", alert.text().replace('\n', " | "));
        Ok(())
    }
}

/// Queue in front of a slow sink
#[derive(Clone)]
pub struct AlertDispatcher {
    tx: async_channel::Sender<Alert>,
}

impl AlertDispatcher {
    /// The worker ends once every dispatcher clone is dropped
    pub fn spawn(sink: Arc<dyn NotificationSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = async_channel::bounded::<Alert>(capacity.max(1));
        let handle = tokio::spawn(async move {
            while let Ok(alert) = rx.recv().await {
                if let Err(e) = sink.notify(&alert).await {
                    warn!("Alert delivery failed: {}", e);
                }
            }
            debug!("Alert worker stopped");
        });
        (Self { tx }, handle)
    }
}

#[async_trait]
impl NotificationSink for AlertDispatcher {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        match self.tx.try_send(alert.clone()) {
            Ok(()) => Ok(()),
            Err(async_channel::TrySendError::Full(_)) => {
                warn!("Alert queue full, dropping alert");
                Ok(())
            }
            Err(async_channel::TrySendError::Closed(_)) => {
                Err(Error::Internal("alert worker stopped".into()))
            }
        }
    }
}
