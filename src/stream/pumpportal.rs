//! PumpPortal WebSocket event stream
//!
//! WebSocket endpoint: wss://pumpportal.fun/api/data
//! Documentation: https://pumpportal.fun/data-api/real-time
//!
//! Only `subscribeNewToken` is used; every `create` message becomes a
//! [`Candidate`].

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ingest::{EventStream, StreamEvent};
use crate::config::StreamConfig;
use crate::error::{Error, Result};
use crate::types::Candidate;

const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionMessage {
    pub method: String,
}

impl SubscriptionMessage {
    pub fn subscribe_new_tokens() -> Self {
        Self {
            method: "subscribeNewToken".to_string(),
        }
    }
}

/// `create` message from PumpPortal
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTokenEvent {
    pub signature: String,
    pub mint: String,
    pub trader_public_key: String,
    pub tx_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
}

impl TryFrom<NewTokenEvent> for Candidate {
    type Error = Error;

    fn try_from(event: NewTokenEvent) -> Result<Self> {
        let mint = Pubkey::from_str(&event.mint)
            .map_err(|e| Error::Stream(format!("Bad mint {}: {}", event.mint, e)))?;
        let creator = Pubkey::from_str(&event.trader_public_key).map_err(|e| {
            Error::Stream(format!("Bad creator {}: {}", event.trader_public_key, e))
        })?;
        Ok(Candidate {
            mint,
            creator,
            signature: event.signature,
            first_seen_at: Utc::now(),
            name: event.name.filter(|s| !s.is_empty()),
            symbol: event.symbol.filter(|s| !s.is_empty()),
            uri: event.uri.filter(|s| !s.is_empty()),
        })
    }
}

/// Map one text frame to a stream event; `None` for frames we ignore
pub fn parse_message(text: &str) -> Option<StreamEvent> {
    let event = match serde_json::from_str::<NewTokenEvent>(text) {
        Ok(event) => event,
        Err(_) => {
            debug!("Ignoring message: {}", &text[..text.len().min(100)]);
            return None;
        }
    };
    if event.tx_type != "create" {
        return None;
    }
    match Candidate::try_from(event) {
        Ok(candidate) => Some(StreamEvent::Candidate(candidate)),
        Err(e) => Some(StreamEvent::Error(e.to_string())),
    }
}

pub struct PumpPortalClient {
    config: StreamConfig,
}

impl PumpPortalClient {
    pub fn new(config: StreamConfig) -> Self {
        Self { config }
    }

    /// Spawn the connection loop; it reconnects until `shutdown` fires or
    /// `max_reconnect_attempts` consecutive failures have happened
    pub fn start(self, shutdown: CancellationToken) -> PumpPortalStream {
        info!("Starting PumpPortal WebSocket client: {}", self.config.ws_url);
        let (event_tx, rx) = mpsc::channel(EVENT_BUFFER);
        let config = self.config;

        let task = tokio::spawn(async move {
            let mut failures = 0u32;
            loop {
                let result = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    result = Self::connect_and_stream(&config, &event_tx) => result,
                };

                match result {
                    Ok(()) => failures = 0,
                    Err(e) => {
                        error!("PumpPortal WebSocket error: {}", e);
                        failures += 1;
                        if config.max_reconnect_attempts > 0
                            && failures >= config.max_reconnect_attempts
                        {
                            error!("Max reconnect attempts ({}) reached", config.max_reconnect_attempts);
                            let _ = event_tx
                                .send(StreamEvent::Error("Max reconnect attempts reached".to_string()))
                                .await;
                            break;
                        }
                    }
                }

                if event_tx.send(StreamEvent::Disconnected).await.is_err() {
                    break;
                }

                let delay = Duration::from_millis(config.reconnect_delay_ms);
                warn!("Reconnecting in {:?}...", delay);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sleep(delay) => {}
                }
            }
            info!("PumpPortal client stopped");
        });

        PumpPortalStream { rx, task }
    }

    async fn connect_and_stream(
        config: &StreamConfig,
        event_tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<()> {
        let url = url::Url::parse(&config.ws_url)
            .map_err(|e| Error::Config(format!("Invalid WebSocket URL: {}", e)))?;

        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| Error::Stream(format!("WebSocket connect failed: {}", e)))?;

        event_tx
            .send(StreamEvent::Connected)
            .await
            .map_err(|e| Error::Internal(format!("Failed to send event: {}", e)))?;

        let (mut write, mut read) = ws_stream.split();

        let json = serde_json::to_string(&SubscriptionMessage::subscribe_new_tokens())?;
        write
            .send(Message::Text(json))
            .await
            .map_err(|e| Error::Stream(format!("Failed to subscribe: {}", e)))?;
        info!("Subscribed to new token events");

        let mut ping_timer = tokio::time::interval(Duration::from_secs(config.ping_interval_secs.max(1)));

        loop {
            tokio::select! {
                _ = ping_timer.tick() => {
                    if let Err(e) = write.send(Message::Ping(vec![])).await {
                        return Err(Error::Stream(format!("Ping failed: {}", e)));
                    }
                    debug!("Sent ping");
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(event) = parse_message(&text) {
                                event_tx
                                    .send(event)
                                    .await
                                    .map_err(|e| Error::Internal(e.to_string()))?;
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("WebSocket closed by server");
                            return Ok(());
                        }
                        Some(Err(e)) => return Err(Error::Stream(e.to_string())),
                        None => return Err(Error::StreamDisconnected),
                        _ => {}
                    }
                }
            }
        }
    }
}

/// Receiving half of a running [`PumpPortalClient`]
pub struct PumpPortalStream {
    rx: mpsc::Receiver<StreamEvent>,
    task: JoinHandle<()>,
}

#[async_trait]
impl EventStream for PumpPortalStream {
    async fn next_event(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }
}

impl Drop for PumpPortalStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}
