//! Configuration loading, validation and hot reload
//!
//! The file is read once at startup. Sections marked *hot* (`trading`,
//! `submission`, `filters`, `exits`, `budget`) are re-read by
//! [`ConfigHandle::reload_if_changed`] and published as a fresh immutable
//! snapshot; everything else (endpoints, wallets, sinks) needs a restart.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tokio::sync::watch;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub submission: SubmissionConfig,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub exits: ExitConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    /// Used when the primary fails its health probe
    #[serde(default)]
    pub backup_endpoint: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            backup_endpoint: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_jito_url")]
    pub block_engine_url: String,
    #[serde(default = "default_relay_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            block_engine_url: default_jito_url(),
            timeout_ms: default_relay_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_pumpportal_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// 0 = reconnect forever
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ws_url: default_pumpportal_ws_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            ping_interval_secs: default_ping_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub drop_policy: DropPolicy,
    /// How many recently seen mints are remembered for dedupe
    #[serde(default = "default_dedupe_window")]
    pub dedupe_window: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            drop_policy: DropPolicy::default(),
            dedupe_window: default_dedupe_window(),
        }
    }
}

/// What the candidate queue does when it is full
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Refuse the incoming candidate
    #[default]
    Newest,
    /// Evict the head of the queue to admit the incoming candidate
    Oldest,
}

/// Entry sizing and wallet selection (hot)
#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    #[serde(default = "default_buy_amount_sol")]
    pub buy_amount_sol: f64,
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
    /// Rotate entries across every loaded wallet
    #[serde(default)]
    pub multi_wallet: bool,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            buy_amount_sol: default_buy_amount_sol(),
            slippage_bps: default_slippage_bps(),
            multi_wallet: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    #[default]
    Exponential,
}

/// Submission policy (hot)
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionConfig {
    /// Base relay tip; scaled by curve progress for entries. 0 disables the relay
    #[serde(default = "default_base_tip")]
    pub base_tip_lamports: u64,
    #[serde(default = "default_max_tip")]
    pub max_tip_lamports: u64,
    /// Permit the direct RPC path when the relay refuses a bundle
    #[serde(default = "default_true")]
    pub allow_direct_fallback: bool,
    #[serde(default = "default_priority_fee")]
    pub priority_fee_micro_lamports: u64,
    #[serde(default = "default_compute_unit_limit")]
    pub compute_unit_limit: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff: BackoffKind,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,
    #[serde(default = "default_confirm_poll_ms")]
    pub confirm_poll_ms: u64,
    #[serde(default = "default_health_probe_timeout_ms")]
    pub health_probe_timeout_ms: u64,
    /// How long a timed-out signature keeps being polled before giving up
    #[serde(default = "default_reconcile_timeout_ms")]
    pub reconcile_timeout_ms: u64,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            base_tip_lamports: default_base_tip(),
            max_tip_lamports: default_max_tip(),
            allow_direct_fallback: true,
            priority_fee_micro_lamports: default_priority_fee(),
            compute_unit_limit: default_compute_unit_limit(),
            max_attempts: default_max_attempts(),
            backoff: BackoffKind::default(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            confirm_timeout_ms: default_confirm_timeout_ms(),
            confirm_poll_ms: default_confirm_poll_ms(),
            health_probe_timeout_ms: default_health_probe_timeout_ms(),
            reconcile_timeout_ms: default_reconcile_timeout_ms(),
        }
    }
}

/// Filter stages in the order they may be configured
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Blacklist,
    Reputation,
    ChainState,
    Flow,
    Holders,
    Sentiment,
}

impl StageKind {
    pub fn default_order() -> Vec<StageKind> {
        vec![
            StageKind::Blacklist,
            StageKind::Reputation,
            StageKind::ChainState,
            StageKind::Flow,
            StageKind::Holders,
            StageKind::Sentiment,
        ]
    }
}

/// Filter thresholds (hot)
#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "StageKind::default_order")]
    pub stages: Vec<StageKind>,
    /// Upper bound for any single stage
    #[serde(default = "default_stage_timeout_ms")]
    pub stage_timeout_ms: u64,
    #[serde(default)]
    pub creator_blacklist: Vec<String>,
    #[serde(default = "default_max_rug_risk")]
    pub max_rug_risk: f64,
    #[serde(default = "default_progress_min")]
    pub progress_min: f64,
    #[serde(default = "default_progress_max")]
    pub progress_max: f64,
    #[serde(default = "default_min_activity_density")]
    pub min_activity_density: u32,
    #[serde(default = "default_density_window_secs")]
    pub density_window_secs: u64,
    /// Run the chain-state stage even when the reputation API answered
    #[serde(default)]
    pub chain_state_always: bool,
    #[serde(default)]
    pub flow: FlowFilterConfig,
    #[serde(default = "default_max_concentration")]
    pub max_holder_concentration_pct: f64,
    #[serde(default = "default_holder_sample")]
    pub holder_sample: usize,
    #[serde(default = "default_min_sentiment")]
    pub min_sentiment_score: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            stages: StageKind::default_order(),
            stage_timeout_ms: default_stage_timeout_ms(),
            creator_blacklist: Vec::new(),
            max_rug_risk: default_max_rug_risk(),
            progress_min: default_progress_min(),
            progress_max: default_progress_max(),
            min_activity_density: default_min_activity_density(),
            density_window_secs: default_density_window_secs(),
            chain_state_always: false,
            flow: FlowFilterConfig::default(),
            max_holder_concentration_pct: default_max_concentration(),
            holder_sample: default_holder_sample(),
            min_sentiment_score: default_min_sentiment(),
        }
    }
}

impl FilterConfig {
    pub fn progress_in_window(&self, progress: f64) -> bool {
        self.progress_min <= progress && progress <= self.progress_max
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlowFilterConfig {
    /// Without credentials or data, reject instead of skipping
    #[serde(default = "default_true")]
    pub mandatory: bool,
    #[serde(default = "default_flow_min_buyers")]
    pub min_unique_buyers: u32,
    #[serde(default = "default_flow_min_volume")]
    pub min_buy_volume_usd: f64,
    #[serde(default = "default_flow_max_seller_ratio")]
    pub max_seller_ratio: f64,
}

impl Default for FlowFilterConfig {
    fn default() -> Self {
        Self {
            mandatory: true,
            min_unique_buyers: default_flow_min_buyers(),
            min_buy_volume_usd: default_flow_min_volume(),
            max_seller_ratio: default_flow_max_seller_ratio(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct LadderStep {
    /// Profit percent at which this step fires
    pub profit_pct: f64,
    /// Fraction (0, 1] of the remaining tokens to sell
    pub sell_fraction: f64,
}

/// Exit rules (hot)
#[derive(Debug, Clone, Deserialize)]
pub struct ExitConfig {
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    #[serde(default = "default_trailing_stop_pct")]
    pub trailing_stop_pct: f64,
    /// Profit percent that must be exceeded before the trailing stop arms
    #[serde(default = "default_trailing_arm_pct")]
    pub trailing_arm_pct: f64,
    #[serde(default = "default_ladder")]
    pub ladder: Vec<LadderStep>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    #[serde(default = "default_max_exit_attempts")]
    pub max_exit_attempts: u32,
    #[serde(default = "default_exit_retry_backoff_ms")]
    pub exit_retry_backoff_ms: u64,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            take_profit_pct: default_take_profit_pct(),
            stop_loss_pct: default_stop_loss_pct(),
            trailing_stop_pct: default_trailing_stop_pct(),
            trailing_arm_pct: default_trailing_arm_pct(),
            ladder: default_ladder(),
            poll_interval_ms: default_poll_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            max_exit_attempts: default_max_exit_attempts(),
            exit_retry_backoff_ms: default_exit_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BudgetConfig {
    /// Fraction of initial capital that may be spent on fees and tips
    #[serde(default = "default_fee_limit_fraction")]
    pub fee_limit_fraction: f64,
    /// Overrides the wallet balance read at startup
    #[serde(default)]
    pub initial_capital_sol: Option<f64>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            fee_limit_fraction: default_fee_limit_fraction(),
            initial_capital_sol: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    #[serde(default = "default_keypair_path")]
    pub keypair_path: String,
    /// Additional trading wallets used when `trading.multi_wallet` is on
    #[serde(default)]
    pub extra_keypair_paths: Vec<String>,
    /// Destination of profit skims; skimming is off when unset
    #[serde(default)]
    pub profit_wallet: Option<String>,
    #[serde(default = "default_skim_threshold")]
    pub skim_threshold_sol: f64,
    #[serde(default = "default_skim_amount")]
    pub skim_amount_sol: f64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            keypair_path: default_keypair_path(),
            extra_keypair_paths: Vec::new(),
            profit_wallet: None,
            skim_threshold_sol: default_skim_threshold(),
            skim_amount_sol: default_skim_amount(),
        }
    }
}

/// External analytics services
#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_reputation_base")]
    pub reputation_api_base: String,
    #[serde(default = "default_reputation_timeout_ms")]
    pub reputation_timeout_ms: u64,
    #[serde(default)]
    pub bitquery_api_key: String,
    #[serde(default = "default_bitquery_url")]
    pub bitquery_url: String,
    #[serde(default = "default_bitquery_timeout_ms")]
    pub bitquery_timeout_ms: u64,
    #[serde(default)]
    pub sentiment_endpoint: Option<String>,
    #[serde(default = "default_sentiment_timeout_ms")]
    pub sentiment_timeout_ms: u64,
    #[serde(default = "default_metadata_base")]
    pub metadata_api_base: String,
    #[serde(default = "default_metadata_timeout_ms")]
    pub metadata_timeout_ms: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            reputation_api_base: default_reputation_base(),
            reputation_timeout_ms: default_reputation_timeout_ms(),
            bitquery_api_key: String::new(),
            bitquery_url: default_bitquery_url(),
            bitquery_timeout_ms: default_bitquery_timeout_ms(),
            sentiment_endpoint: None,
            sentiment_timeout_ms: default_sentiment_timeout_ms(),
            metadata_api_base: default_metadata_base(),
            metadata_timeout_ms: default_metadata_timeout_ms(),
        }
    }
}

impl ServicesConfig {
    pub fn has_bitquery_key(&self) -> bool {
        !self.bitquery_api_key.is_empty() && self.bitquery_api_key != "YOUR_BITQUERY_KEY"
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotificationConfig {
    #[serde(default)]
    pub telegram_bot_token: String,
    #[serde(default)]
    pub telegram_chat_id: String,
}

impl NotificationConfig {
    pub fn telegram_enabled(&self) -> bool {
        !self.telegram_bot_token.is_empty() && !self.telegram_chat_id.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_trade_log_path")]
    pub trade_log_path: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            trade_log_path: default_trade_log_path(),
        }
    }
}

// Default value functions
fn default_rpc_endpoint() -> String {
    std::env::var("RPC_ENDPOINT").unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".into())
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_jito_url() -> String {
    std::env::var("JITO_BLOCK_ENGINE_URL")
        .unwrap_or_else(|_| "https://mainnet.block-engine.jito.wtf".into())
}

fn default_relay_timeout_ms() -> u64 {
    5000
}

fn default_pumpportal_ws_url() -> String {
    "wss://pumpportal.fun/api/data".into()
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_ping_interval_secs() -> u64 {
    30
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_dedupe_window() -> usize {
    5000
}

fn default_buy_amount_sol() -> f64 {
    0.1
}

fn default_slippage_bps() -> u32 {
    1500
}

fn default_base_tip() -> u64 {
    50_000
}

fn default_max_tip() -> u64 {
    1_000_000
}

fn default_priority_fee() -> u64 {
    100_000
}

fn default_compute_unit_limit() -> u32 {
    200_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_max_ms() -> u64 {
    10_000
}

fn default_confirm_timeout_ms() -> u64 {
    60_000
}

fn default_confirm_poll_ms() -> u64 {
    2000
}

fn default_health_probe_timeout_ms() -> u64 {
    800
}

fn default_reconcile_timeout_ms() -> u64 {
    120_000
}

fn default_stage_timeout_ms() -> u64 {
    12_000
}

fn default_max_rug_risk() -> f64 {
    65.0
}

fn default_progress_min() -> f64 {
    10.0
}

fn default_progress_max() -> f64 {
    60.0
}

fn default_min_activity_density() -> u32 {
    2
}

fn default_density_window_secs() -> u64 {
    60
}

fn default_flow_min_buyers() -> u32 {
    8
}

fn default_flow_min_volume() -> f64 {
    1500.0
}

fn default_flow_max_seller_ratio() -> f64 {
    1.5
}

fn default_max_concentration() -> f64 {
    25.0
}

fn default_holder_sample() -> usize {
    10
}

fn default_min_sentiment() -> f64 {
    40.0
}

fn default_take_profit_pct() -> f64 {
    50.0
}

fn default_stop_loss_pct() -> f64 {
    20.0
}

fn default_trailing_stop_pct() -> f64 {
    5.0
}

fn default_trailing_arm_pct() -> f64 {
    10.0
}

fn default_ladder() -> Vec<LadderStep> {
    vec![LadderStep {
        profit_pct: 25.0,
        sell_fraction: 0.5,
    }]
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_error_backoff_ms() -> u64 {
    10_000
}

fn default_max_exit_attempts() -> u32 {
    3
}

fn default_exit_retry_backoff_ms() -> u64 {
    2000
}

fn default_fee_limit_fraction() -> f64 {
    0.02
}

fn default_keypair_path() -> String {
    std::env::var("KEYPAIR_PATH").unwrap_or_else(|_| "credentials/hot-trading/keypair.json".into())
}

fn default_skim_threshold() -> f64 {
    0.1
}

fn default_skim_amount() -> f64 {
    0.05
}

fn default_reputation_base() -> String {
    "http://localhost:8000".into()
}

fn default_reputation_timeout_ms() -> u64 {
    1500
}

fn default_bitquery_url() -> String {
    "https://streaming.bitquery.io/graphql".into()
}

fn default_bitquery_timeout_ms() -> u64 {
    10_000
}

fn default_sentiment_timeout_ms() -> u64 {
    2000
}

fn default_metadata_base() -> String {
    "https://frontend-api.pump.fun".into()
}

fn default_metadata_timeout_ms() -> u64 {
    5000
}

fn default_trade_log_path() -> String {
    "data/trades.jsonl".into()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SNIPER_)
            .add_source(
                config::Environment::with_prefix("SNIPER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.trading.buy_amount_sol <= 0.0 {
            anyhow::bail!("buy_amount_sol must be positive");
        }

        if self.trading.slippage_bps > 10000 {
            anyhow::bail!("slippage_bps cannot exceed 10000 (100%)");
        }

        if self.submission.max_attempts == 0 {
            anyhow::bail!("submission.max_attempts must be at least 1");
        }

        if self.submission.max_tip_lamports < self.submission.base_tip_lamports {
            anyhow::bail!("max_tip_lamports must be >= base_tip_lamports");
        }

        let fraction = self.budget.fee_limit_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            anyhow::bail!("fee_limit_fraction must be in (0, 1], got {}", fraction);
        }

        let filters = &self.filters;
        if filters.progress_min > filters.progress_max {
            anyhow::bail!(
                "progress window is inverted: {} > {}",
                filters.progress_min,
                filters.progress_max
            );
        }

        let mut seen = HashSet::new();
        for stage in &filters.stages {
            if !seen.insert(*stage) {
                anyhow::bail!("filter stage {:?} listed twice", stage);
            }
        }

        if self.exits.take_profit_pct <= 0.0 {
            anyhow::bail!("take_profit_pct must be positive");
        }
        if self.exits.stop_loss_pct <= 0.0 || self.exits.stop_loss_pct >= 100.0 {
            anyhow::bail!("stop_loss_pct must be between 0 and 100");
        }
        if self.exits.max_exit_attempts == 0 {
            anyhow::bail!("exits.max_exit_attempts must be at least 1");
        }

        let mut previous = f64::NEG_INFINITY;
        for step in &self.exits.ladder {
            if step.profit_pct <= previous {
                anyhow::bail!("ladder thresholds must be strictly ascending");
            }
            if !(step.sell_fraction > 0.0 && step.sell_fraction <= 1.0) {
                anyhow::bail!("ladder sell_fraction must be in (0, 1]");
            }
            previous = step.profit_pct;
        }

        if self.ingest.queue_capacity == 0 {
            anyhow::bail!("ingest.queue_capacity must be positive");
        }

        if let Some(vault) = &self.wallet.profit_wallet {
            if vault.len() < 32 || vault.len() > 44 {
                anyhow::bail!("Invalid profit_wallet address: {}", vault);
            }
        }

        Ok(())
    }

    /// Take the hot-reloadable sections from `fresh`, keep everything else
    pub fn merge_hot(&self, fresh: &Config) -> Config {
        let mut next = self.clone();
        next.trading = fresh.trading.clone();
        next.submission = fresh.submission.clone();
        next.filters = fresh.filters.clone();
        next.exits = fresh.exits.clone();
        next.budget = fresh.budget.clone();
        next
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  RPC:
    endpoint: {}
    backup: {}
    timeout: {}ms
  Relay:
    enabled: {}
    block_engine: {}
  Stream:
    ws_url: {}
  Trading:
    buy_amount: {} SOL
    slippage: {}bps
    multi_wallet: {}
  Submission:
    base_tip: {} lamports (max {})
    direct_fallback: {}
    max_attempts: {}
  Filters:
    stages: {:?}
    blacklisted_creators: {}
    progress_window: {}%..{}%
    bitquery_key: {}
  Exits:
    take_profit: {}%
    stop_loss: {}%
    trailing: {}% (arms above {}%)
    ladder_steps: {}
  Budget:
    fee_limit: {}% of capital
  Notifications:
    telegram: {}
"#,
            mask_url(&self.rpc.endpoint),
            self.rpc
                .backup_endpoint
                .as_deref()
                .map(mask_url)
                .unwrap_or_else(|| "(not set)".into()),
            self.rpc.timeout_ms,
            self.relay.enabled,
            mask_url(&self.relay.block_engine_url),
            self.stream.ws_url,
            self.trading.buy_amount_sol,
            self.trading.slippage_bps,
            self.trading.multi_wallet,
            self.submission.base_tip_lamports,
            self.submission.max_tip_lamports,
            self.submission.allow_direct_fallback,
            self.submission.max_attempts,
            self.filters.stages,
            self.filters.creator_blacklist.len(),
            self.filters.progress_min,
            self.filters.progress_max,
            if self.services.has_bitquery_key() {
                "***"
            } else {
                "(not set)"
            },
            self.exits.take_profit_pct,
            self.exits.stop_loss_pct,
            self.exits.trailing_stop_pct,
            self.exits.trailing_arm_pct,
            self.exits.ladder.len(),
            self.budget.fee_limit_fraction * 100.0,
            if self.notifications.telegram_enabled() {
                "***"
            } else {
                "(not set)"
            },
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            relay: RelayConfig::default(),
            stream: StreamConfig::default(),
            ingest: IngestConfig::default(),
            trading: TradingConfig::default(),
            submission: SubmissionConfig::default(),
            filters: FilterConfig::default(),
            exits: ExitConfig::default(),
            budget: BudgetConfig::default(),
            wallet: WalletConfig::default(),
            services: ServicesConfig::default(),
            notifications: NotificationConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

/// Publishes immutable configuration snapshots
///
/// Readers take an `Arc<Config>` and keep it for the unit of work in hand
/// (one candidate, one poll tick); a reload never mutates a snapshot that is
/// already in use.
pub struct ConfigHandle {
    path: Option<PathBuf>,
    tx: watch::Sender<Arc<Config>>,
    last_modified: Mutex<Option<SystemTime>>,
}

impl ConfigHandle {
    pub fn new(config: Config, path: Option<PathBuf>) -> Self {
        let last_modified = path.as_deref().and_then(modified_at);
        let (tx, _rx) = watch::channel(Arc::new(config));
        Self {
            path,
            tx,
            last_modified: Mutex::new(last_modified),
        }
    }

    /// Handle without a backing file (tests, one-shot commands)
    pub fn fixed(config: Config) -> Self {
        Self::new(config, None)
    }

    pub fn snapshot(&self) -> Arc<Config> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Config>> {
        self.tx.subscribe()
    }

    /// Swap in a new snapshot
    pub fn publish(&self, config: Config) {
        self.tx.send_replace(Arc::new(config));
    }

    /// Re-read the file if it changed since the last look
    ///
    /// Returns `true` when a new snapshot was published. A file that fails to
    /// parse or validate leaves the current snapshot in place.
    pub fn reload_if_changed(&self) -> bool {
        let Some(path) = self.path.as_deref() else {
            return false;
        };

        let current = modified_at(path);
        {
            let mut last = self
                .last_modified
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if current.is_none() || *last == current {
                return false;
            }
            *last = current;
        }

        match Config::load(path) {
            Ok(fresh) => {
                let next = self.snapshot().merge_hot(&fresh);
                self.publish(next);
                info!("Configuration reloaded from {}", path.display());
                true
            }
            Err(e) => {
                warn!("Ignoring configuration change in {}: {:#}", path.display(), e);
                false
            }
        }
    }
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
