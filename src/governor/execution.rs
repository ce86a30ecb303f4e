//! Serial entry pipeline
//!
//! The governor is the only consumer of the candidate queue and handles one
//! candidate at a time, so the budget check and the per-mint reservation can
//! never race. For each candidate:
//!
//! 1. budget check (exhausted: drop without filtering)
//! 2. reserve the mint in the registry (already pending or live: drop)
//! 3. pick up a reloaded configuration snapshot
//! 4. run the filter chain
//! 5. size the relay tip from curve progress
//! 6. re-check the budget, build and submit the buy
//! 7. confirmed: journal, alert and hand the position to its own manager;
//!    timed out: reconcile in the background
//!
//! Per-candidate failures release the reservation and the loop moves on.
//! Only errors classified fatal stop it.

use solana_sdk::signature::Signature;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::{Config, ConfigHandle};
use crate::error::{Error, Result};
use crate::filter::FilterChain;
use crate::position::{ExitServices, Position, PositionManager};
use crate::pump::program::TOKEN_DECIMALS;
use crate::sinks::{Alert, TradeRecord};
use crate::stream::SharedCandidateQueue;
use crate::trading::tips::entry_tip;
use crate::trading::ConfirmationStatus;
use crate::types::{lamports_to_sol, sol_to_lamports, Candidate};
use crate::wallet::{TradingWallet, WalletPool};

/// What happened to one candidate
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    /// Fee budget exhausted
    BudgetExhausted,
    /// A position for the mint is already pending or live
    AlreadyHeld,
    Rejected { stage: &'static str, reason: String },
    /// Approved, nothing submitted
    DryRun,
    Opened { signature: String },
    /// Buy sent but unconfirmed; reconciliation continues in the background
    Reconciling { signature: String },
    Failed(String),
}

/// A buy that landed, as far as the position needs to know
struct Fill {
    signature: Signature,
    sol_amount: f64,
    fee_lamports: u64,
    expected_tokens: u64,
}

/// Opens positions and spawns their managers; shared with reconcile tasks
#[derive(Clone)]
struct PositionLauncher {
    services: Arc<ExitServices>,
    config: watch::Receiver<Arc<Config>>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl PositionLauncher {
    async fn open(
        &self,
        candidate: &Candidate,
        wallet: Arc<TradingWallet>,
        fill: Fill,
    ) -> Position {
        let services = &self.services;
        services.registry.mark_live(&candidate.mint);

        // Prefer the balance actually received over the slippage-adjusted quote
        let received = services
            .market
            .token_balance(&wallet.pubkey(), &candidate.mint)
            .await;
        let token_amount = match received {
            Ok(balance) if balance > 0 => balance,
            Ok(_) => fill.expected_tokens,
            Err(e) => {
                debug!("Balance read after buy failed ({}), using quote", e);
                fill.expected_tokens
            }
        };
        let whole_tokens = token_amount as f64 / 10f64.powi(TOKEN_DECIMALS as i32);
        let entry_price = if whole_tokens > 0.0 {
            fill.sol_amount / whole_tokens
        } else {
            0.0
        };
        let cost_basis_sol = fill.sol_amount + lamports_to_sol(fill.fee_lamports);

        let record = TradeRecord::buy(
            candidate.mint.to_string(),
            wallet.pubkey().to_string(),
            fill.signature.to_string(),
            fill.sol_amount,
            token_amount,
            entry_price,
            fill.fee_lamports,
        );
        if let Err(e) = services.journal.record(&record).await {
            warn!("Failed to journal buy of {}: {}", candidate.short_mint(), e);
        }
        if let Err(e) = services
            .notifier
            .notify(&Alert::Bought {
                mint: candidate.mint.to_string(),
                sol: fill.sol_amount,
                signature: fill.signature.to_string(),
            })
            .await
        {
            debug!("Alert not delivered: {}", e);
        }

        let position = Position::open(
            candidate.mint,
            candidate.creator,
            wallet.pubkey(),
            entry_price,
            token_amount,
            cost_basis_sol,
            fill.signature.to_string(),
        );
        info!(
            "Opened {}: {} tokens for {:.4} SOL (sig: {})",
            candidate.short_mint(),
            token_amount,
            fill.sol_amount,
            fill.signature
        );

        PositionManager::new(
            position.clone(),
            wallet,
            self.services.clone(),
            self.config.clone(),
            self.shutdown.clone(),
        )
        .spawn(&self.tracker);
        position
    }
}

pub struct ExecutionGovernor {
    queue: SharedCandidateQueue,
    chain: Arc<FilterChain>,
    wallets: Arc<WalletPool>,
    config: Arc<ConfigHandle>,
    launcher: PositionLauncher,
    dry_run: bool,
}

impl ExecutionGovernor {
    pub fn new(
        queue: SharedCandidateQueue,
        chain: Arc<FilterChain>,
        wallets: Arc<WalletPool>,
        services: Arc<ExitServices>,
        config: Arc<ConfigHandle>,
        tracker: TaskTracker,
        shutdown: CancellationToken,
    ) -> Self {
        let launcher = PositionLauncher {
            services,
            config: config.subscribe(),
            tracker,
            shutdown,
        };
        Self {
            queue,
            chain,
            wallets,
            config,
            launcher,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Consume candidates until shutdown; `Err` only for fatal errors
    pub async fn run(self) -> Result<()> {
        info!(
            "Execution governor started{}",
            if self.dry_run { " (dry run)" } else { "" }
        );
        let shutdown = self.launcher.shutdown.clone();

        while let Some(candidate) = self.queue.pop(&shutdown).await {
            let span = info_span!("candidate", mint = %candidate.mint);
            match self.process(&candidate).instrument(span).await {
                Ok(outcome) => debug!("{} -> {:?}", candidate.short_mint(), outcome),
                Err(e) => {
                    error!("Fatal error handling {}: {}", candidate.mint, e);
                    return Err(e);
                }
            }
        }

        info!(
            "Execution governor stopped ({} candidates dropped by the queue)",
            self.queue.dropped()
        );
        Ok(())
    }

    /// Take one candidate through the pipeline
    pub async fn process(&self, candidate: &Candidate) -> Result<EntryOutcome> {
        let services = &self.launcher.services;

        if !services.budget.check_budget() {
            debug!("Budget exhausted, dropping {}", candidate.short_mint());
            return Ok(EntryOutcome::BudgetExhausted);
        }
        if !services.registry.reserve(&candidate.mint) {
            debug!("{} already held, dropping", candidate.short_mint());
            return Ok(EntryOutcome::AlreadyHeld);
        }

        match self.enter(candidate).await {
            Ok(outcome) => {
                if !matches!(
                    outcome,
                    EntryOutcome::Opened { .. } | EntryOutcome::Reconciling { .. }
                ) {
                    services.registry.release(&candidate.mint);
                }
                Ok(outcome)
            }
            Err(e) => {
                services.registry.release(&candidate.mint);
                if e.is_fatal() {
                    return Err(e);
                }
                warn!("Entry for {} failed: {}", candidate.short_mint(), e);
                Ok(EntryOutcome::Failed(e.to_string()))
            }
        }
    }

    /// Everything after the reservation; the caller releases on anything
    /// but an opened or reconciling entry
    async fn enter(&self, candidate: &Candidate) -> Result<EntryOutcome> {
        let services = &self.launcher.services;

        self.config.reload_if_changed();
        let config = self.config.snapshot();
        services.budget.set_limit_fraction(config.budget.fee_limit_fraction);

        let verdict = self.chain.evaluate(candidate, &config.filters).await;
        if !verdict.approved {
            return Ok(EntryOutcome::Rejected {
                stage: verdict.rejecting_stage.unwrap_or("unknown"),
                reason: verdict.reason,
            });
        }
        info!(
            "Approved {} after {:?}",
            candidate.short_mint(),
            verdict.metrics.stages_run()
        );

        let tip = entry_tip(&config.submission, verdict.metrics.progress_pct);

        // Anything settled since the first check may have used up the budget
        if let Err(e) = services.budget.ensure_budget() {
            info!("Skipping approved {}: {}", candidate.short_mint(), e);
            return Ok(EntryOutcome::BudgetExhausted);
        }

        let wallet = self.wallets.next_wallet(config.trading.multi_wallet);
        let lamports = sol_to_lamports(config.trading.buy_amount_sol);
        let quoted = services
            .builder
            .buy(&candidate.mint, &wallet.pubkey(), lamports, config.trading.slippage_bps)
            .await?;
        let mut plan = quoted
            .plan
            .with_fees_from(&config.submission)
            .with_tip(tip);
        plan.label = format!("buy {}", candidate.short_mint());

        if self.dry_run {
            info!(
                "[DRY RUN] Would buy {} for {} SOL from {} (tip {} lamports, ~{} tokens)",
                candidate.mint, config.trading.buy_amount_sol, wallet.name, tip, quoted.expected_out
            );
            return Ok(EntryOutcome::DryRun);
        }

        let outcome = services
            .submitter
            .submit(&plan, &wallet.keypair, &config.submission)
            .await?;
        services.budget.record_fee(outcome.fee_lamports);

        let fill = Fill {
            signature: outcome.signature,
            sol_amount: config.trading.buy_amount_sol,
            fee_lamports: outcome.fee_lamports,
            expected_tokens: quoted.expected_out,
        };

        match outcome.status {
            ConfirmationStatus::Confirmed => {
                let signature = outcome.signature.to_string();
                self.launcher.open(candidate, wallet, fill).await;
                Ok(EntryOutcome::Opened { signature })
            }
            ConfirmationStatus::ConfirmedWithError(reason) => Err(Error::TransactionFailed {
                signature: outcome.signature.to_string(),
                reason,
            }),
            ConfirmationStatus::TimedOut => {
                warn!(
                    "Buy {} for {} unconfirmed, reconciling in the background",
                    outcome.signature,
                    candidate.short_mint()
                );
                let estimated_fee = plan.estimated_network_fee();
                self.spawn_reconcile(candidate.clone(), wallet, fill, estimated_fee, config);
                Ok(EntryOutcome::Reconciling {
                    signature: outcome.signature.to_string(),
                })
            }
        }
    }

    fn spawn_reconcile(
        &self,
        candidate: Candidate,
        wallet: Arc<TradingWallet>,
        mut fill: Fill,
        estimated_fee: u64,
        config: Arc<Config>,
    ) {
        let launcher = self.launcher.clone();
        let span = info_span!("reconcile", mint = %candidate.mint);
        self.launcher.tracker.spawn(
            async move {
                let services = launcher.services.clone();
                let (status, fee) = services
                    .submitter
                    .reconcile(&fill.signature, &config.submission, estimated_fee)
                    .await;
                services.budget.record_fee(fee);

                match status {
                    ConfirmationStatus::Confirmed => {
                        info!("Late confirmation for {}", fill.signature);
                        fill.fee_lamports = fee;
                        launcher.open(&candidate, wallet, fill).await;
                    }
                    ConfirmationStatus::ConfirmedWithError(reason) => {
                        warn!("Buy {} landed with error: {}", fill.signature, reason);
                        services.registry.release(&candidate.mint);
                    }
                    ConfirmationStatus::TimedOut => {
                        // Signature status can lag the chain; the wallet is the final word
                        let held = services
                            .market
                            .token_balance(&wallet.pubkey(), &candidate.mint)
                            .await;
                        match held {
                            Ok(balance) if balance > 0 => {
                                warn!(
                                    "Buy {} unconfirmed but wallet holds {} tokens of {}, opening",
                                    fill.signature,
                                    balance,
                                    candidate.short_mint()
                                );
                                fill.fee_lamports = fee;
                                fill.expected_tokens = balance;
                                launcher.open(&candidate, wallet, fill).await;
                            }
                            Ok(_) => {
                                error!(
                                    "Buy {} still unconfirmed after reconciliation, releasing {}",
                                    fill.signature,
                                    candidate.short_mint()
                                );
                                services.registry.release(&candidate.mint);
                            }
                            Err(e) => {
                                error!(
                                    "Buy {} unconfirmed, balance unreadable ({}), keeping {}",
                                    fill.signature,
                                    e,
                                    candidate.short_mint()
                                );
                            }
                        }
                    }
                }
            }
            .instrument(span),
        );
    }
}
