//! Per-position supervision task
//!
//! Each confirmed entry gets its own [`PositionManager`]. In `Monitoring` it
//! polls the curve, folds every read into the position and applies the exit
//! rules. A full exit moves it to `Exiting`, where it sells the remaining
//! tokens with bounded attempts; the task ends `Closed` and frees the mint.
//!
//! Shutdown stops a monitoring task at the next poll; a task already exiting
//! finishes its sell.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::governor::{BudgetGovernor, PositionRegistry};
use crate::position::exit::{evaluate, observe, partial_amount, ExitDecision, ExitReason, Tick};
use crate::position::state::{CloseReason, Position, PositionState};
use crate::pump::MarketData;
use crate::sinks::{Alert, NotificationSink, PersistenceSink, TradeRecord};
use crate::trading::tips::exit_tip;
use crate::trading::{ConfirmationStatus, TradeBuilder, TransactionSubmitter, TxOutcome};
use crate::types::lamports_to_sol;
use crate::wallet::{ProfitSkimmer, TradingWallet};

/// Collaborators shared by every position task
pub struct ExitServices {
    pub market: Arc<dyn MarketData>,
    pub builder: Arc<dyn TradeBuilder>,
    pub submitter: Arc<TransactionSubmitter>,
    pub budget: Arc<BudgetGovernor>,
    pub registry: Arc<PositionRegistry>,
    pub notifier: Arc<dyn NotificationSink>,
    pub journal: Arc<dyn PersistenceSink>,
    pub skimmer: Option<Arc<ProfitSkimmer>>,
}

pub struct PositionManager {
    position: Position,
    wallet: Arc<TradingWallet>,
    services: Arc<ExitServices>,
    config: watch::Receiver<Arc<Config>>,
    cancel: CancellationToken,
}

impl PositionManager {
    pub fn new(
        position: Position,
        wallet: Arc<TradingWallet>,
        services: Arc<ExitServices>,
        config: watch::Receiver<Arc<Config>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            position,
            wallet,
            services,
            config,
            cancel,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn spawn(self, tracker: &TaskTracker) {
        let span = info_span!("position", mint = %self.position.mint);
        tracker.spawn(self.run().instrument(span));
    }

    /// Drive the position until it closes or shutdown stops monitoring
    pub async fn run(mut self) -> Position {
        info!(
            "Monitoring {} ({} tokens at {:.10} SOL)",
            self.position.short_mint(),
            self.position.token_amount,
            self.position.entry_price
        );

        while self.position.state == PositionState::Monitoring {
            let config = self.config.borrow().clone();
            let poll = Duration::from_millis(config.exits.poll_interval_ms);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("Stopped monitoring {} on shutdown", self.position.short_mint());
                    return self.position;
                }
                _ = tokio::time::sleep(poll) => {}
            }

            let tick = match self.read_tick().await {
                Ok(tick) => tick,
                Err(e) => {
                    warn!("Price read for {} failed: {}", self.position.short_mint(), e);
                    let backoff = Duration::from_millis(config.exits.error_backoff_ms);
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return self.position,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    continue;
                }
            };

            observe(&mut self.position, &tick, &config.exits);
            match evaluate(&self.position, &tick, &config.exits) {
                ExitDecision::Hold => debug!(
                    "{} price {:.10} profit {:+.2}%",
                    self.position.short_mint(),
                    tick.price,
                    self.position.profit_pct(tick.price)
                ),
                ExitDecision::Partial { step, fraction } => {
                    self.sell_ladder_step(step, fraction, tick.price, &config).await;
                }
                ExitDecision::Full(reason) => {
                    self.exit(reason, tick.price, &config).await;
                }
            }
        }

        self.position
    }

    async fn read_tick(&self) -> Result<Tick> {
        let curve = self
            .services
            .market
            .bonding_curve(&self.position.mint)
            .await?
            .ok_or_else(|| Error::PriceUnavailable(format!("no curve for {}", self.position.mint)))?;
        let snapshot = curve.snapshot()?;

        let creator_balance = match self
            .services
            .market
            .token_balance(&self.position.creator, &self.position.mint)
            .await
        {
            Ok(balance) => Some(balance),
            Err(e) => {
                debug!("Creator balance read failed: {}", e);
                None
            }
        };

        Ok(Tick {
            price: snapshot.price_sol,
            complete: snapshot.complete,
            creator_balance,
        })
    }

    /// One sell attempt; `Ok` only when the sell confirmed
    async fn sell_once(&self, amount: u64, label: &str, config: &Config) -> Result<(TxOutcome, u64)> {
        let quoted = self
            .services
            .builder
            .sell(
                &self.position.mint,
                &self.wallet.pubkey(),
                amount,
                config.trading.slippage_bps,
            )
            .await?;
        let mut plan = quoted
            .plan
            .with_fees_from(&config.submission)
            .with_tip(exit_tip(&config.submission));
        plan.label = format!("{} {}", label, self.position.short_mint());

        let mut outcome = self
            .services
            .submitter
            .submit(&plan, &self.wallet.keypair, &config.submission)
            .await?;

        if outcome.is_timed_out() {
            let (status, fee) = self
                .services
                .submitter
                .reconcile(&outcome.signature, &config.submission, plan.estimated_network_fee())
                .await;
            outcome.status = status;
            outcome.fee_lamports = fee;
        }
        self.services.budget.record_fee(outcome.fee_lamports);

        match &outcome.status {
            ConfirmationStatus::Confirmed => Ok((outcome, quoted.expected_out)),
            ConfirmationStatus::ConfirmedWithError(reason) => Err(Error::TransactionFailed {
                signature: outcome.signature.to_string(),
                reason: reason.clone(),
            }),
            ConfirmationStatus::TimedOut => Err(Error::ConfirmationTimeout {
                signature: outcome.signature.to_string(),
                waited_ms: config.submission.reconcile_timeout_ms,
            }),
        }
    }

    async fn sell_ladder_step(&mut self, step: usize, fraction: f64, price: f64, config: &Config) {
        // Attempted steps are never retried
        self.position.ladder_index = step + 1;

        let amount = partial_amount(self.position.token_amount, fraction);
        if amount == 0 {
            return;
        }
        info!(
            "Ladder step {} for {}: selling {:.0}% ({} tokens) at {:+.2}%",
            step + 1,
            self.position.short_mint(),
            fraction * 100.0,
            amount,
            self.position.profit_pct(price)
        );

        match self.sell_once(amount, "ladder", config).await {
            Ok((outcome, proceeds_lamports)) => {
                self.position.token_amount -= amount;
                self.position.proceeds_sol +=
                    lamports_to_sol(proceeds_lamports) - lamports_to_sol(outcome.fee_lamports);
                self.journal_sell(&outcome, amount, price, proceeds_lamports, "ladder")
                    .await;
            }
            Err(e) => {
                warn!("Ladder sell for {} failed: {}", self.position.short_mint(), e);
                self.alert(Alert::ExitAttemptFailed {
                    mint: self.position.mint.to_string(),
                    attempt: 1,
                    max_attempts: 1,
                    error: e.to_string(),
                })
                .await;
            }
        }
    }

    async fn exit(&mut self, reason: ExitReason, price: f64, config: &Config) {
        if let Err(e) = self.position.transition(PositionState::Exiting) {
            error!("{}", e);
            return;
        }
        info!(
            "Exiting {} on {} at {:+.2}%",
            self.position.short_mint(),
            reason,
            self.position.profit_pct(price)
        );

        let max_attempts = config.exits.max_exit_attempts.max(1);
        let backoff = Duration::from_millis(config.exits.exit_retry_backoff_ms);
        let amount = self.position.token_amount;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.sell_once(amount, "exit", config).await {
                Ok((outcome, proceeds_lamports)) => {
                    self.position.token_amount = 0;
                    self.position.proceeds_sol +=
                        lamports_to_sol(proceeds_lamports) - lamports_to_sol(outcome.fee_lamports);
                    self.close(CloseReason::Sold);

                    let pnl = self.position.realized_pnl_sol();
                    info!(
                        "Sold {} ({}), realized PnL {:+.4} SOL",
                        self.position.short_mint(),
                        reason,
                        pnl
                    );
                    self.journal_sell(&outcome, amount, price, proceeds_lamports, &reason.to_string())
                        .await;
                    self.alert(Alert::Sold {
                        mint: self.position.mint.to_string(),
                        reason: reason.to_string(),
                        pnl_sol: pnl,
                        signature: outcome.signature.to_string(),
                    })
                    .await;
                    self.skim(pnl, config).await;
                    return;
                }
                Err(e) => {
                    warn!(
                        "Sell attempt {}/{} for {} failed: {}",
                        attempt,
                        max_attempts,
                        self.position.short_mint(),
                        e
                    );
                    last_error = e.to_string();
                    self.alert(Alert::ExitAttemptFailed {
                        mint: self.position.mint.to_string(),
                        attempt,
                        max_attempts,
                        error: last_error.clone(),
                    })
                    .await;
                    if attempt < max_attempts {
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        error!(
            "Giving up on {} after {} sell attempts",
            self.position.short_mint(),
            max_attempts
        );
        self.close(CloseReason::ExitFailed);
        self.alert(Alert::ExitAbandoned {
            mint: self.position.mint.to_string(),
            error: last_error,
        })
        .await;
    }

    fn close(&mut self, reason: CloseReason) {
        if let Err(e) = self.position.transition(PositionState::Closed(reason)) {
            error!("{}", e);
        }
        self.services.registry.release(&self.position.mint);
    }

    async fn journal_sell(
        &self,
        outcome: &TxOutcome,
        amount: u64,
        price: f64,
        proceeds_lamports: u64,
        reason: &str,
    ) {
        let record = TradeRecord::sell(
            self.position.mint.to_string(),
            self.wallet.pubkey().to_string(),
            outcome.signature.to_string(),
            lamports_to_sol(proceeds_lamports),
            amount,
            price,
            outcome.fee_lamports,
        )
        .with_pnl(self.position.realized_pnl_sol(), reason);
        if let Err(e) = self.services.journal.record(&record).await {
            warn!("Failed to journal sell of {}: {}", self.position.short_mint(), e);
        }
    }

    async fn alert(&self, alert: Alert) {
        if let Err(e) = self.services.notifier.notify(&alert).await {
            debug!("Alert not delivered: {}", e);
        }
    }

    async fn skim(&self, pnl: f64, config: &Config) {
        let Some(skimmer) = &self.services.skimmer else {
            return;
        };
        match skimmer
            .maybe_skim(pnl, &self.wallet.keypair, &config.wallet, &config.submission)
            .await
        {
            Ok(Some(outcome)) => self.services.budget.record_fee(outcome.fee_lamports),
            Ok(None) => {}
            Err(e) => warn!("Profit skim failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pump::BondingCurve;
    use crate::sinks::RecordKind;
    use crate::testing::{FakeJournal, FakeMarket, FakeNotifier, FakeRpc};
    use crate::trading::{FailoverRpc, PumpTradeBuilder};
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::Keypair;

    const TOKEN_RESERVES: u64 = 1_000_000_000_000_000;
    /// 3M whole tokens, about 0.09 SOL at the 30 SOL curve
    const HELD: u64 = 3_000_000_000_000;

    /// Price scales linearly with `sol_reserves`
    fn curve(sol_reserves: u64) -> BondingCurve {
        BondingCurve::new(TOKEN_RESERVES, sol_reserves, 800_000_000_000_000, 10_000_000_000, TOKEN_RESERVES, false)
    }

    struct Harness {
        rpc: Arc<FakeRpc>,
        market: Arc<FakeMarket>,
        notifier: Arc<FakeNotifier>,
        journal: Arc<FakeJournal>,
        services: Arc<ExitServices>,
        config: watch::Sender<Arc<Config>>,
    }

    fn harness(config: Config) -> Harness {
        let rpc = Arc::new(FakeRpc::new("primary"));
        rpc.set_fee(Some(5_000));
        let market = Arc::new(FakeMarket::default());
        let notifier = Arc::new(FakeNotifier::default());
        let journal = Arc::new(FakeJournal::default());
        let services = Arc::new(ExitServices {
            market: market.clone(),
            builder: Arc::new(PumpTradeBuilder::new(market.clone())),
            submitter: Arc::new(TransactionSubmitter::new(FailoverRpc::new(rpc.clone(), None), None)),
            budget: Arc::new(BudgetGovernor::new(10_000_000_000, 0.02)),
            registry: Arc::new(PositionRegistry::new()),
            notifier: notifier.clone(),
            journal: journal.clone(),
            skimmer: None,
        });
        let (config, _) = watch::channel(Arc::new(config));
        Harness { rpc, market, notifier, journal, services, config }
    }

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.exits.poll_interval_ms = 100;
        config.exits.error_backoff_ms = 200;
        config.exits.exit_retry_backoff_ms = 50;
        config.exits.ladder = vec![];
        config.submission.confirm_timeout_ms = 1_000;
        config.submission.confirm_poll_ms = 100;
        config.submission.reconcile_timeout_ms = 1_000;
        config.submission.backoff_base_ms = 10;
        config.submission.backoff_max_ms = 20;
        config
    }

    fn manager(h: &Harness, mint: Pubkey, entry_price: f64) -> PositionManager {
        let wallet = Arc::new(TradingWallet::new(Keypair::new(), "primary"));
        h.services.registry.reserve(&mint);
        h.services.registry.mark_live(&mint);
        let position = Position::open(
            mint,
            Pubkey::new_unique(),
            wallet.pubkey(),
            entry_price,
            HELD,
            0.09,
            "entry".into(),
        );
        PositionManager::new(position, wallet, h.services.clone(), h.config.subscribe(), CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_profit_sells_and_closes() {
        let h = harness(fast_config());
        let mint = Pubkey::new_unique();
        let entry = curve(30_000_000_000).price_sol().unwrap();
        h.market.push_curves(mint, vec![curve(33_000_000_000), curve(45_000_000_000)]);

        let position = manager(&h, mint, entry).run().await;

        assert_eq!(position.state, PositionState::Closed(CloseReason::Sold));
        assert_eq!(position.token_amount, 0);
        assert!(position.realized_pnl_sol() > 0.0);
        assert!(!h.services.registry.contains(&mint));
        assert_eq!(h.rpc.send_count(), 1);
        assert_eq!(h.services.budget.snapshot().cumulative_fee_lamports, 5_000);

        let records = h.journal.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, RecordKind::Sell);
        assert_eq!(records[0].reason.as_deref(), Some("take profit"));
        assert!(matches!(h.notifier.alerts()[0], Alert::Sold { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_failure_closes_after_all_attempts() {
        let h = harness(fast_config());
        h.rpc.fail_simulation("custom program error: 0x1772");
        let mint = Pubkey::new_unique();
        let entry = curve(30_000_000_000).price_sol().unwrap();
        h.market.push_curves(mint, vec![curve(20_000_000_000)]);

        let position = manager(&h, mint, entry).run().await;

        assert_eq!(position.state, PositionState::Closed(CloseReason::ExitFailed));
        assert_eq!(position.token_amount, HELD);
        assert!(!h.services.registry.contains(&mint));

        let alerts = h.notifier.alerts();
        let failures = alerts
            .iter()
            .filter(|a| matches!(a, Alert::ExitAttemptFailed { .. }))
            .count();
        assert_eq!(failures, 3);
        assert!(matches!(alerts.last(), Some(Alert::ExitAbandoned { .. })));
        assert!(h.journal.records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ladder_partial_keeps_monitoring() {
        let mut config = fast_config();
        config.exits.ladder = vec![crate::config::LadderStep { profit_pct: 20.0, sell_fraction: 0.5 }];
        config.exits.trailing_stop_pct = 0.0;
        let h = harness(config);
        let mint = Pubkey::new_unique();
        let entry = curve(30_000_000_000).price_sol().unwrap();
        // +25% (ladder, read again by the sell quote), +26% (already stepped), -30% (stop loss)
        h.market.push_curves(
            mint,
            vec![
                curve(37_500_000_000),
                curve(37_500_000_000),
                curve(37_800_000_000),
                curve(21_000_000_000),
            ],
        );

        let position = manager(&h, mint, entry).run().await;

        assert_eq!(position.state, PositionState::Closed(CloseReason::Sold));
        assert_eq!(position.ladder_index, 1);
        assert_eq!(h.rpc.send_count(), 2);
        let reasons: Vec<_> = h.journal.records().iter().map(|r| r.reason.clone()).collect();
        assert_eq!(reasons, vec![Some("ladder".into()), Some("stop loss".into())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_errors_back_off_and_shutdown_stops_monitoring() {
        let h = harness(fast_config());
        h.market.fail_reads(true);
        let mint = Pubkey::new_unique();
        let manager = manager(&h, mint, 1.0e-6);
        let cancel = manager.cancel.clone();

        let task = tokio::spawn(manager.run());
        tokio::time::sleep(Duration::from_secs(2)).await;
        cancel.cancel();
        let position = task.await.unwrap();

        assert_eq!(position.state, PositionState::Monitoring);
        assert_eq!(h.rpc.send_count(), 0);
        // Still registered: the tokens are still held
        assert!(h.services.registry.contains(&mint));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exits_ignore_exhausted_budget() {
        let h = harness(fast_config());
        h.services.budget.record_fee(u64::MAX);
        assert!(!h.services.budget.check_budget());
        let mint = Pubkey::new_unique();
        let entry = curve(30_000_000_000).price_sol().unwrap();
        h.market.push_curves(mint, vec![curve(15_000_000_000)]);

        let position = manager(&h, mint, entry).run().await;
        assert_eq!(position.state, PositionState::Closed(CloseReason::Sold));
    }
}
