//! Transaction submission strategy
//!
//! One entry point, [`TransactionSubmitter::submit`]:
//!
//! 1. pick an RPC endpoint (primary, or backup when the primary fails a
//!    short health probe)
//! 2. build and sign with a fresh blockhash, simulate; transient read
//!    errors are retried, a failed simulation aborts before anything is sent
//! 3. tipped plans go to the bundle relay first; an accepted bundle is only
//!    ever polled, never re-sent through the direct path
//! 4. the direct path sends with bounded retries, re-signing every attempt,
//!    then polls for confirmation
//!
//! An accepted send that is not confirmed in time resolves to
//! [`ConfirmationStatus::TimedOut`]: the transaction may still land, so it is
//! handed back for reconciliation instead of being retried.

use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::system_instruction;
use solana_sdk::transaction::Transaction;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::plan::{ConfirmationStatus, SubmitRoute, TxOutcome, TxPlan};
use super::relay::BundleRelay;
use super::retry::{retry_with_policy, Attempt, RetryPolicy};
use super::rpc::{ChainRpc, FailoverRpc, LandedStatus};
use crate::config::SubmissionConfig;
use crate::error::{Error, Result};

pub struct TransactionSubmitter {
    rpc: FailoverRpc,
    relay: Option<Arc<dyn BundleRelay>>,
}

impl TransactionSubmitter {
    pub fn new(rpc: FailoverRpc, relay: Option<Arc<dyn BundleRelay>>) -> Self {
        Self { rpc, relay }
    }

    pub async fn submit(
        &self,
        plan: &TxPlan,
        signer: &Keypair,
        policy: &SubmissionConfig,
    ) -> Result<TxOutcome> {
        let rpc = self
            .rpc
            .select(Duration::from_millis(policy.health_probe_timeout_ms))
            .await;

        let retry = RetryPolicy::from_config(policy);
        let (blockhash, simulated, simulation) =
            retry_with_policy(&retry, &format!("{} preflight", plan.label), |_| {
                let rpc = rpc.clone();
                async move {
                    let blockhash = match rpc.latest_blockhash().await {
                        Ok(blockhash) => blockhash,
                        Err(e) => return Attempt::from_result(Err(e)),
                    };
                    let tx = build_transaction(plan, signer, blockhash, None);
                    match rpc.simulate(&tx).await {
                        Ok(simulation) => Attempt::Done((blockhash, tx, simulation)),
                        Err(e) => Attempt::from_result(Err(e)),
                    }
                }
            })
            .await?;

        if !simulation.success {
            return Err(Error::SimulationFailure(format!(
                "{}: {}",
                plan.label,
                simulation.error.unwrap_or_else(|| "unknown error".into())
            )));
        }

        if plan.tip_lamports > 0 {
            if let Some(relay) = &self.relay {
                let bundle = self
                    .submit_bundle(rpc.as_ref(), relay.as_ref(), plan, signer, blockhash, policy)
                    .await;
                match bundle {
                    Ok(outcome) => return Ok(outcome),
                    Err(Error::RelayRejection(reason)) if policy.allow_direct_fallback => {
                        warn!(
                            "{}: relay rejected ({}), falling back to direct send",
                            plan.label, reason
                        );
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        self.submit_direct(rpc, plan, signer, policy, simulated).await
    }

    async fn submit_bundle(
        &self,
        rpc: &dyn ChainRpc,
        relay: &dyn BundleRelay,
        plan: &TxPlan,
        signer: &Keypair,
        blockhash: Hash,
        policy: &SubmissionConfig,
    ) -> Result<TxOutcome> {
        let tipped = build_transaction(
            plan,
            signer,
            blockhash,
            Some((relay.tip_account(), plan.tip_lamports)),
        );
        let signature = first_signature(&tipped);

        let bundle_id = relay.send_bundle(std::slice::from_ref(&tipped)).await?;
        info!(
            "{}: bundle {} accepted (tip {} lamports), signature {}",
            plan.label, bundle_id, plan.tip_lamports, signature
        );

        let status = wait_for_confirmation(rpc, &signature, policy).await;
        // The tip is only paid when the bundle lands
        let fee_lamports = match settled_fee(rpc, &signature, &status, plan).await {
            Some(fee) => fee + plan.tip_lamports,
            None => 0,
        };

        Ok(TxOutcome {
            signature,
            route: SubmitRoute::Relay { bundle_id },
            status,
            attempts: 1,
            fee_lamports,
        })
    }

    async fn submit_direct(
        &self,
        rpc: Arc<dyn ChainRpc>,
        plan: &TxPlan,
        signer: &Keypair,
        policy: &SubmissionConfig,
        first: Transaction,
    ) -> Result<TxOutcome> {
        let retry = RetryPolicy::from_config(policy);
        let mut first = Some(first);

        let (signature, attempts) = retry_with_policy(&retry, &plan.label, |attempt| {
            // The simulated transaction is only good for the first attempt
            let prebuilt = first.take();
            let rpc = rpc.clone();
            async move {
                let tx = match prebuilt {
                    Some(tx) => tx,
                    None => match rpc.latest_blockhash().await {
                        Ok(blockhash) => build_transaction(plan, signer, blockhash, None),
                        Err(e) => return Attempt::from_result(Err(e)),
                    },
                };
                match rpc.send(&tx).await {
                    Ok(signature) => Attempt::Done((signature, attempt)),
                    Err(e) => Attempt::from_result(Err(e)),
                }
            }
        })
        .await?;

        debug!("{}: sent {} on attempt {}", plan.label, signature, attempts);
        let status = wait_for_confirmation(rpc.as_ref(), &signature, policy).await;
        let fee_lamports = settled_fee(rpc.as_ref(), &signature, &status, plan)
            .await
            .unwrap_or(0);

        Ok(TxOutcome {
            signature,
            route: SubmitRoute::Direct,
            status,
            attempts,
            fee_lamports,
        })
    }

    /// Keep polling a signature whose first confirmation window expired
    ///
    /// Returns the final status and, when the transaction landed, its
    /// network fee.
    pub async fn reconcile(
        &self,
        signature: &Signature,
        policy: &SubmissionConfig,
        estimated_fee: u64,
    ) -> (ConfirmationStatus, u64) {
        let rpc = self
            .rpc
            .select(Duration::from_millis(policy.health_probe_timeout_ms))
            .await;
        let window = SubmissionConfig {
            confirm_timeout_ms: policy.reconcile_timeout_ms,
            ..policy.clone()
        };
        let status = wait_for_confirmation(rpc.as_ref(), signature, &window).await;
        let fee = match status {
            ConfirmationStatus::TimedOut => 0,
            _ => match rpc.transaction_fee(signature).await {
                Ok(Some(fee)) => fee,
                _ => estimated_fee,
            },
        };
        (status, fee)
    }
}

/// Compute-budget instructions, the plan, then the optional tip transfer
pub fn build_transaction(
    plan: &TxPlan,
    signer: &Keypair,
    blockhash: Hash,
    tip: Option<(Pubkey, u64)>,
) -> Transaction {
    let payer = signer.pubkey();
    let mut instructions = Vec::with_capacity(plan.instructions.len() + 3);
    if plan.compute_unit_limit > 0 {
        instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(
            plan.compute_unit_limit,
        ));
    }
    if plan.priority_fee_micro_lamports > 0 {
        instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
            plan.priority_fee_micro_lamports,
        ));
    }
    instructions.extend(plan.instructions.iter().cloned());
    if let Some((tip_account, lamports)) = tip {
        instructions.push(system_instruction::transfer(&payer, &tip_account, lamports));
    }

    Transaction::new_signed_with_payer(&instructions, Some(&payer), &[signer], blockhash)
}

fn first_signature(tx: &Transaction) -> Signature {
    tx.signatures.first().copied().unwrap_or_default()
}

/// Poll until the signature is confirmed, fails on chain, or time runs out
pub async fn wait_for_confirmation(
    rpc: &dyn ChainRpc,
    signature: &Signature,
    policy: &SubmissionConfig,
) -> ConfirmationStatus {
    let timeout = Duration::from_millis(policy.confirm_timeout_ms);
    let poll = Duration::from_millis(policy.confirm_poll_ms.max(1));
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        match rpc.signature_status(signature).await {
            Ok(Some(LandedStatus::Confirmed)) => return ConfirmationStatus::Confirmed,
            Ok(Some(LandedStatus::Failed(reason))) => {
                warn!("{} landed with error: {}", signature, reason);
                return ConfirmationStatus::ConfirmedWithError(reason);
            }
            Ok(None) => {}
            Err(e) => debug!("Status poll for {} failed: {}", signature, e),
        }

        let now = tokio::time::Instant::now();
        if now >= deadline {
            warn!("{} not confirmed after {:?}", signature, timeout);
            return ConfirmationStatus::TimedOut;
        }
        tokio::time::sleep(poll.min(deadline - now)).await;
    }
}

/// Network fee for a landed transaction; `None` while the outcome is unknown
async fn settled_fee(
    rpc: &dyn ChainRpc,
    signature: &Signature,
    status: &ConfirmationStatus,
    plan: &TxPlan,
) -> Option<u64> {
    if *status == ConfirmationStatus::TimedOut {
        return None;
    }
    match rpc.transaction_fee(signature).await {
        Ok(Some(fee)) => Some(fee),
        Ok(None) => Some(plan.estimated_network_fee()),
        Err(e) => {
            debug!("Fee lookup for {} failed ({}), using estimate", signature, e);
            Some(plan.estimated_network_fee())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeRelay, FakeRpc};
    use crate::trading::plan::TradeSide;

    fn policy() -> SubmissionConfig {
        SubmissionConfig {
            max_attempts: 3,
            backoff_base_ms: 10,
            backoff_max_ms: 40,
            confirm_timeout_ms: 1_000,
            confirm_poll_ms: 100,
            health_probe_timeout_ms: 50,
            ..Default::default()
        }
    }

    fn transfer_plan(signer: &Keypair, tip: u64) -> TxPlan {
        TxPlan::new(
            "test",
            TradeSide::Transfer,
            vec![system_instruction::transfer(
                &signer.pubkey(),
                &Pubkey::new_unique(),
                1,
            )],
        )
        .with_tip(tip)
    }

    fn submitter(rpc: Arc<FakeRpc>, relay: Option<Arc<FakeRelay>>) -> TransactionSubmitter {
        TransactionSubmitter::new(
            FailoverRpc::new(rpc, None),
            relay.map(|r| r as Arc<dyn BundleRelay>),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_acceptance_never_touches_direct_path() {
        let rpc = Arc::new(FakeRpc::new("primary"));
        rpc.set_fee(Some(5_000));
        let relay = Arc::new(FakeRelay::accepting("bundle-1"));
        let signer = Keypair::new();

        let outcome = submitter(rpc.clone(), Some(relay.clone()))
            .submit(&transfer_plan(&signer, 10_000), &signer, &policy())
            .await
            .unwrap();

        assert_eq!(relay.calls(), 1);
        assert_eq!(rpc.send_count(), 0);
        assert_eq!(
            outcome.route,
            SubmitRoute::Relay {
                bundle_id: "bundle-1".into()
            }
        );
        assert!(outcome.is_confirmed());
        assert_eq!(outcome.fee_lamports, 15_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_timeout_is_not_resent_directly() {
        let signer = Keypair::new();
        let rpc = Arc::new(FakeRpc::new("primary"));
        rpc.set_default_status(None);
        let relay = Arc::new(FakeRelay::accepting("bundle-2"));

        let outcome = submitter(rpc.clone(), Some(relay))
            .submit(&transfer_plan(&signer, 10_000), &signer, &policy())
            .await
            .unwrap();

        assert!(outcome.is_timed_out());
        assert_eq!(outcome.fee_lamports, 0);
        assert_eq!(rpc.send_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_rejection_falls_back_when_allowed() {
        let signer = Keypair::new();
        let rpc = Arc::new(FakeRpc::new("primary"));
        let relay = Arc::new(FakeRelay::rejecting("bundle dropped"));

        let outcome = submitter(rpc.clone(), Some(relay.clone()))
            .submit(&transfer_plan(&signer, 10_000), &signer, &policy())
            .await
            .unwrap();

        assert_eq!(relay.calls(), 1);
        assert_eq!(rpc.send_count(), 1);
        assert_eq!(outcome.route, SubmitRoute::Direct);
        // The direct variant carries no tip transfer
        let sent = rpc.sent();
        assert_eq!(sent[0].message.instructions.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_rejection_is_fatal_without_fallback() {
        let signer = Keypair::new();
        let rpc = Arc::new(FakeRpc::new("primary"));
        let relay = Arc::new(FakeRelay::rejecting("bundle dropped"));
        let mut policy = policy();
        policy.allow_direct_fallback = false;

        let err = submitter(rpc.clone(), Some(relay))
            .submit(&transfer_plan(&signer, 10_000), &signer, &policy)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RelayRejection(_)));
        assert_eq!(rpc.send_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_failure_sends_nothing() {
        let signer = Keypair::new();
        let rpc = Arc::new(FakeRpc::new("primary"));
        rpc.fail_simulation("custom program error: 0x1771");
        let relay = Arc::new(FakeRelay::accepting("bundle-3"));

        let err = submitter(rpc.clone(), Some(relay.clone()))
            .submit(&transfer_plan(&signer, 10_000), &signer, &policy())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SimulationFailure(_)));
        assert_eq!(rpc.send_count(), 0);
        assert_eq!(relay.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failing_sends_exhaust_with_last_error() {
        let signer = Keypair::new();
        let rpc = Arc::new(FakeRpc::new("primary"));
        rpc.script_sends(vec![
            Some("blockhash not found".into()),
            Some("node is behind".into()),
            Some("connection reset".into()),
        ]);

        let err = submitter(rpc.clone(), None)
            .submit(&transfer_plan(&signer, 0), &signer, &policy())
            .await
            .unwrap_err();

        assert_eq!(rpc.send_count(), 3);
        match err {
            Error::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(last.to_string().contains("connection reset"));
            }
            other => panic!("unexpected error: {}", other),
        }

        // Every attempt was signed against its own blockhash
        let sent = rpc.sent();
        assert_ne!(sent[0].signatures[0], sent[1].signatures[0]);
        assert_ne!(sent[1].message.recent_blockhash, sent[2].message.recent_blockhash);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_confirm() {
        let signer = Keypair::new();
        let rpc = Arc::new(FakeRpc::new("primary"));
        rpc.script_sends(vec![Some("node is behind".into()), None]);
        rpc.set_fee(Some(7_000));

        let outcome = submitter(rpc.clone(), None)
            .submit(&transfer_plan(&signer, 0), &signer, &policy())
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 2);
        assert!(outcome.is_confirmed());
        assert_eq!(outcome.fee_lamports, 7_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_landed_with_error_is_not_retried() {
        let signer = Keypair::new();
        let rpc = Arc::new(FakeRpc::new("primary"));
        rpc.set_default_status(Some(LandedStatus::Failed("slippage exceeded".into())));

        let outcome = submitter(rpc.clone(), None)
            .submit(&transfer_plan(&signer, 0), &signer, &policy())
            .await
            .unwrap();

        assert_eq!(rpc.send_count(), 1);
        assert_eq!(
            outcome.status,
            ConfirmationStatus::ConfirmedWithError("slippage exceeded".into())
        );
        // Failed transactions still pay the network fee
        assert!(outcome.fee_lamports > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_primary_routes_to_backup() {
        let signer = Keypair::new();
        let primary = Arc::new(FakeRpc::new("primary"));
        primary.set_healthy(false);
        let backup = Arc::new(FakeRpc::new("backup"));
        let submitter = TransactionSubmitter::new(
            FailoverRpc::new(primary.clone(), Some(backup.clone())),
            None,
        );

        submitter
            .submit(&transfer_plan(&signer, 0), &signer, &policy())
            .await
            .unwrap();

        assert_eq!(primary.send_count(), 0);
        assert_eq!(backup.send_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_reports_late_landing() {
        let rpc = Arc::new(FakeRpc::new("primary"));
        rpc.script_statuses(vec![None, None, Some(LandedStatus::Confirmed)]);
        rpc.set_fee(None);

        let (status, fee) = submitter(rpc, None)
            .reconcile(&Signature::default(), &policy(), 25_000)
            .await;
        assert_eq!(status, ConfirmationStatus::Confirmed);
        assert_eq!(fee, 25_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_blockhash_error_is_retried_before_relay() {
        let signer = Keypair::new();
        let rpc = Arc::new(FakeRpc::new("primary"));
        rpc.script_blockhashes(vec![Some("connection reset".into())]);
        let relay = Arc::new(FakeRelay::accepting("bundle-4"));

        let outcome = submitter(rpc.clone(), Some(relay.clone()))
            .submit(&transfer_plan(&signer, 10_000), &signer, &policy())
            .await
            .unwrap();

        assert_eq!(relay.calls(), 1);
        assert_eq!(rpc.send_count(), 0);
        // One failed read, one good read shared by simulation and bundle
        assert_eq!(rpc.blockhash_calls(), 2);
        assert!(outcome.is_confirmed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blockhash_outage_exhausts_without_sending() {
        let signer = Keypair::new();
        let rpc = Arc::new(FakeRpc::new("primary"));
        rpc.script_blockhashes(vec![
            Some("connection reset".into()),
            Some("connection reset".into()),
            Some("connection reset".into()),
        ]);
        let relay = Arc::new(FakeRelay::accepting("bundle-5"));

        let err = submitter(rpc.clone(), Some(relay.clone()))
            .submit(&transfer_plan(&signer, 10_000), &signer, &policy())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(relay.calls(), 0);
        assert_eq!(rpc.send_count(), 0);
    }
}
