//! CLI command implementations

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::config::{Config, ConfigHandle};
use crate::filter::{
    BitqueryClient, BlacklistStage, ChainStateStage, FilterChain, FlowMetricsSource, FlowStage,
    HoldersStage, HttpReputationApi, HttpSentimentService, MetadataSource, PumpFunMetadata,
    ReputationStage, SentimentService, SentimentStage,
};
use crate::governor::{BudgetGovernor, ExecutionGovernor, PositionRegistry};
use crate::position::ExitServices;
use crate::pump::{MarketData, RpcMarketData};
use crate::sinks::{AlertDispatcher, JsonlJournal, LogNotifier, NotificationSink, TelegramNotifier};
use crate::stream::{CandidateIngest, CandidateQueue, PumpPortalClient};
use crate::trading::{
    BundleRelay, ChainRpc, FailoverRpc, JitoRelay, PumpTradeBuilder, SolanaRpc,
    TransactionSubmitter,
};
use crate::types::{lamports_to_sol, sol_to_lamports};
use crate::wallet::{check_keypair_permissions, ProfitSkimmer, WalletPool};

const ALERT_QUEUE: usize = 256;

fn rpc_clients(config: &Config) -> (Arc<dyn ChainRpc>, Option<Arc<dyn ChainRpc>>) {
    let timeout = Duration::from_millis(config.rpc.timeout_ms);
    let primary: Arc<dyn ChainRpc> = Arc::new(SolanaRpc::new(config.rpc.endpoint.clone(), timeout));
    let backup = config
        .rpc
        .backup_endpoint
        .as_ref()
        .filter(|url| !url.is_empty())
        .map(|url| Arc::new(SolanaRpc::new(url.clone(), timeout)) as Arc<dyn ChainRpc>);
    (primary, backup)
}

/// Every stage, each wired to its collaborator
fn filter_chain(config: &Config, market: Arc<dyn MarketData>) -> Result<FilterChain> {
    let services = &config.services;

    let reputation = HttpReputationApi::new(
        &services.reputation_api_base,
        Duration::from_millis(services.reputation_timeout_ms),
    )?;

    let flow: Option<Arc<dyn FlowMetricsSource>> = if services.has_bitquery_key() {
        Some(Arc::new(BitqueryClient::new(
            &services.bitquery_url,
            &services.bitquery_api_key,
            Duration::from_millis(services.bitquery_timeout_ms),
        )?))
    } else {
        let fallback = if config.filters.flow.mandatory {
            "reject"
        } else {
            "skip"
        };
        warn!("No Bitquery API key, flow stage will {}", fallback);
        None
    };

    let metadata: Arc<dyn MetadataSource> = Arc::new(PumpFunMetadata::new(
        &services.metadata_api_base,
        Duration::from_millis(services.metadata_timeout_ms),
    )?);
    let endpoint = services.sentiment_endpoint.as_deref();
    let sentiment: Option<Arc<dyn SentimentService>> = match endpoint {
        Some(endpoint) if !endpoint.is_empty() => Some(Arc::new(HttpSentimentService::new(
            endpoint,
            Duration::from_millis(services.sentiment_timeout_ms),
        )?)),
        _ => None,
    };

    Ok(FilterChain::new()
        .with_stage(Arc::new(BlacklistStage))
        .with_stage(Arc::new(ReputationStage::new(Arc::new(reputation))))
        .with_stage(Arc::new(ChainStateStage::new(market.clone())))
        .with_stage(Arc::new(FlowStage::new(flow)))
        .with_stage(Arc::new(HoldersStage::new(market)))
        .with_stage(Arc::new(SentimentStage::new(Some(metadata), sentiment))))
}

fn notifier(config: &Config) -> Result<Arc<dyn NotificationSink>> {
    if config.notifications.telegram_enabled() {
        info!("Telegram alerts enabled");
        Ok(Arc::new(TelegramNotifier::new(
            &config.notifications.telegram_bot_token,
            &config.notifications.telegram_chat_id,
        )?))
    } else {
        Ok(Arc::new(LogNotifier))
    }
}

/// Start the sniper bot
pub async fn start(config: Config, config_path: &Path, dry_run: bool) -> Result<()> {
    if dry_run {
        warn!("Running in DRY-RUN mode - no real trades will be executed");
    }
    info!("Starting gated sniper...");
    info!(
        "Buy amount: {} SOL, Slippage: {}bps",
        config.trading.buy_amount_sol, config.trading.slippage_bps
    );

    let wallets = Arc::new(
        WalletPool::load(&config.wallet.keypair_path, &config.wallet.extra_keypair_paths)
            .context("Failed to load wallets")?,
    );
    if config.trading.multi_wallet && wallets.len() == 1 {
        warn!("multi_wallet is on but only the primary wallet is loaded");
    }

    let (primary, backup) = rpc_clients(&config);
    let relay: Option<Arc<dyn BundleRelay>> = if config.relay.enabled {
        Some(Arc::new(JitoRelay::new(&config.relay)?))
    } else {
        warn!("Bundle relay disabled, every plan goes through direct RPC");
        None
    };
    let submitter = Arc::new(TransactionSubmitter::new(
        FailoverRpc::new(primary.clone(), backup),
        relay,
    ));

    let initial_capital = match config.budget.initial_capital_sol {
        Some(sol) => sol_to_lamports(sol),
        None => primary
            .sol_balance(&wallets.primary().pubkey())
            .await
            .context("Failed to read wallet balance for the fee budget")?,
    };
    if initial_capital == 0 {
        warn!("Initial capital is zero, the fee budget refuses every entry");
    }
    let budget = Arc::new(BudgetGovernor::new(initial_capital, config.budget.fee_limit_fraction));

    let market: Arc<dyn MarketData> = Arc::new(RpcMarketData::new(primary.clone()));
    let chain = Arc::new(filter_chain(&config, market.clone())?);
    info!(
        "Filter chain: {} stages installed, order {:?}",
        chain.installed(),
        config.filters.stages
    );

    let (alerts, alert_worker) = AlertDispatcher::spawn(notifier(&config)?, ALERT_QUEUE);
    let journal = Arc::new(JsonlJournal::new(&config.persistence.trade_log_path));
    info!("Trade journal: {}", journal.path().display());
    let skimmer = ProfitSkimmer::from_config(&config.wallet, submitter.clone())?.map(Arc::new);

    let services = Arc::new(ExitServices {
        market: market.clone(),
        builder: Arc::new(PumpTradeBuilder::new(market)),
        submitter,
        budget,
        registry: Arc::new(PositionRegistry::new()),
        notifier: Arc::new(alerts),
        journal,
        skimmer,
    });

    let shutdown = CancellationToken::new();
    let tracker = TaskTracker::new();
    let queue = Arc::new(CandidateQueue::new(
        config.ingest.queue_capacity,
        config.ingest.drop_policy,
    ));

    let stream = PumpPortalClient::new(config.stream.clone()).start(shutdown.clone());
    CandidateIngest::new(
        Box::new(stream),
        queue.clone(),
        config.ingest.dedupe_window,
        shutdown.clone(),
    )
    .spawn(&tracker);

    let handle = Arc::new(ConfigHandle::new(config, Some(PathBuf::from(config_path))));
    let governor = ExecutionGovernor::new(
        queue,
        chain,
        wallets,
        services.clone(),
        handle,
        tracker.clone(),
        shutdown.clone(),
    )
    .dry_run(dry_run);

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
                shutdown.cancel();
            }
        });
    }

    let result = governor.run().await;
    shutdown.cancel();

    info!("Waiting for open tasks to finish...");
    tracker.close();
    tracker.wait().await;

    // Dropping the last dispatcher handle lets the alert worker drain
    drop(services);
    if tokio::time::timeout(Duration::from_secs(5), alert_worker).await.is_err() {
        warn!("Alert queue did not drain before exit");
    }

    if result.is_ok() {
        info!("Shutdown complete");
    }
    result.context("Execution governor stopped")
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

async fn probe_rpc(rpc: &dyn ChainRpc, timeout: Duration) -> Result<u128> {
    let start = Instant::now();
    tokio::time::timeout(timeout, rpc.health())
        .await
        .map_err(|_| anyhow::anyhow!("timed out after {}ms", timeout.as_millis()))??;
    Ok(start.elapsed().as_millis())
}

/// Check system health
pub async fn health(config: &Config) -> Result<()> {
    println!("\n=== SYSTEM HEALTH CHECK ===\n");

    let mut all_healthy = true;
    let timeout = Duration::from_millis(config.rpc.timeout_ms);
    let (primary, backup) = rpc_clients(config);

    print!("Primary RPC ({})... ", primary.endpoint());
    match probe_rpc(primary.as_ref(), timeout).await {
        Ok(latency) => println!("OK ({}ms)", latency),
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    match &backup {
        Some(backup) => {
            print!("Backup RPC ({})... ", backup.endpoint());
            match probe_rpc(backup.as_ref(), timeout).await {
                Ok(latency) => println!("OK ({}ms)", latency),
                Err(e) => {
                    println!("FAILED: {}", e);
                    all_healthy = false;
                }
            }
        }
        None => println!("Backup RPC... NOT CONFIGURED"),
    }

    if config.relay.enabled {
        print!("Jito Block Engine... ");
        let result = match JitoRelay::new(&config.relay) {
            Ok(relay) => relay.ping().await,
            Err(e) => Err(e),
        };
        match result {
            Ok(latency) => println!("OK ({}ms)", latency.as_millis()),
            Err(e) => {
                println!("FAILED: {}", e);
                all_healthy = false;
            }
        }
    } else {
        println!("Jito Block Engine... DISABLED");
    }

    print!("Keypair... ");
    match WalletPool::load(&config.wallet.keypair_path, &config.wallet.extra_keypair_paths) {
        Ok(wallets) => match primary.sol_balance(&wallets.primary().pubkey()).await {
            Ok(lamports) => println!(
                "OK ({} wallet(s), primary balance: {:.4} SOL)",
                wallets.len(),
                lamports_to_sol(lamports)
            ),
            Err(e) => {
                println!("LOADED, balance unavailable: {}", e);
                all_healthy = false;
            }
        },
        Err(e) => {
            println!("FAILED: {}", e);
            all_healthy = false;
        }
    }

    println!();
    if all_healthy {
        println!("All systems healthy!");
    } else {
        println!("Some systems are unhealthy. Check the errors above.");
    }

    Ok(())
}

/// Refuse to trade with a keypair others can read
pub fn startup_checks(config: &Config) -> Result<()> {
    info!("Performing startup checks...");
    let path = Path::new(&config.wallet.keypair_path);
    if !path.exists() {
        anyhow::bail!(crate::Error::FatalStartup(format!(
            "Keypair file not found: {}",
            path.display()
        )));
    }
    check_keypair_permissions(path).map_err(|e| {
        error!("{}", e);
        crate::Error::FatalStartup(e.to_string())
    })?;
    for extra in &config.wallet.extra_keypair_paths {
        check_keypair_permissions(Path::new(extra))
            .map_err(|e| crate::Error::FatalStartup(e.to_string()))?;
    }
    info!("Keypair permissions OK");
    Ok(())
}
