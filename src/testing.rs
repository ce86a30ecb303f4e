//! In-memory collaborators for unit tests

use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::filter::{FlowMetrics, FlowMetricsSource, MetadataSource, ReputationApi, SentimentService, TokenMetadata, TokenReport};
use crate::pump::{BondingCurve, MarketData};
use crate::sinks::{Alert, NotificationSink, PersistenceSink, TradeRecord};
use crate::stream::{EventStream, StreamEvent};
use crate::trading::relay::BundleRelay;
use crate::trading::rpc::{ChainRpc, LandedStatus, RecentSignature, SimulationResult};

// ---------------------------------------------------------------------------
// Chain RPC
// ---------------------------------------------------------------------------

pub struct FakeRpc {
    name: String,
    healthy: AtomicBool,
    health_delay: Mutex<Option<Duration>>,
    fee: Mutex<Option<u64>>,
    default_status: Mutex<Option<LandedStatus>>,
    statuses: Mutex<VecDeque<Option<LandedStatus>>>,
    sends: Mutex<VecDeque<Option<String>>>,
    blockhashes: Mutex<VecDeque<Option<String>>>,
    blockhash_calls: AtomicUsize,
    sent: Mutex<Vec<Transaction>>,
    send_count: AtomicUsize,
    simulation_error: Mutex<Option<String>>,
    accounts: Mutex<HashMap<Pubkey, Vec<u8>>>,
    signatures: Mutex<HashMap<Pubkey, Vec<RecentSignature>>>,
    holders: Mutex<HashMap<Pubkey, (u64, Vec<u64>)>>,
    balances: Mutex<HashMap<Pubkey, u64>>,
}

impl FakeRpc {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            healthy: AtomicBool::new(true),
            health_delay: Mutex::new(None),
            fee: Mutex::new(None),
            default_status: Mutex::new(Some(LandedStatus::Confirmed)),
            statuses: Mutex::new(VecDeque::new()),
            sends: Mutex::new(VecDeque::new()),
            blockhashes: Mutex::new(VecDeque::new()),
            blockhash_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            send_count: AtomicUsize::new(0),
            simulation_error: Mutex::new(None),
            accounts: Mutex::new(HashMap::new()),
            signatures: Mutex::new(HashMap::new()),
            holders: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_health_delay(&self, delay: Duration) {
        *self.health_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_fee(&self, fee: Option<u64>) {
        *self.fee.lock().unwrap() = fee;
    }

    /// Status reported once the scripted statuses run out
    pub fn set_default_status(&self, status: Option<LandedStatus>) {
        *self.default_status.lock().unwrap() = status;
    }

    pub fn script_statuses(&self, statuses: Vec<Option<LandedStatus>>) {
        *self.statuses.lock().unwrap() = statuses.into();
    }

    /// `Some(msg)` makes that send fail with `msg`; unscripted sends succeed
    pub fn script_sends(&self, sends: Vec<Option<String>>) {
        *self.sends.lock().unwrap() = sends.into();
    }

    /// `Some(msg)` makes that blockhash read fail as a transient network error
    pub fn script_blockhashes(&self, reads: Vec<Option<String>>) {
        *self.blockhashes.lock().unwrap() = reads.into();
    }

    pub fn blockhash_calls(&self) -> usize {
        self.blockhash_calls.load(Ordering::SeqCst)
    }

    pub fn fail_simulation(&self, error: &str) {
        *self.simulation_error.lock().unwrap() = Some(error.to_string());
    }

    pub fn send_count(&self) -> usize {
        self.send_count.load(Ordering::SeqCst)
    }

    /// Every transaction handed to `send`, including failed sends
    pub fn sent(&self) -> Vec<Transaction> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_account(&self, address: Pubkey, data: Vec<u8>) {
        self.accounts.lock().unwrap().insert(address, data);
    }

    pub fn set_signatures(&self, address: Pubkey, signatures: Vec<RecentSignature>) {
        self.signatures.lock().unwrap().insert(address, signatures);
    }

    pub fn set_holders(&self, mint: Pubkey, supply: u64, amounts: Vec<u64>) {
        self.holders.lock().unwrap().insert(mint, (supply, amounts));
    }

    pub fn set_balance(&self, address: Pubkey, lamports: u64) {
        self.balances.lock().unwrap().insert(address, lamports);
    }
}

#[async_trait]
impl ChainRpc for FakeRpc {
    fn endpoint(&self) -> &str {
        &self.name
    }

    async fn health(&self) -> Result<()> {
        let delay = *self.health_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Rpc(format!("{} unhealthy", self.name)))
        }
    }

    async fn latest_blockhash(&self) -> Result<Hash> {
        self.blockhash_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(Some(error)) = self.blockhashes.lock().unwrap().pop_front() {
            return Err(Error::TransientNetwork(error));
        }
        Ok(Hash::new_unique())
    }

    async fn simulate(&self, _tx: &Transaction) -> Result<SimulationResult> {
        let error = self.simulation_error.lock().unwrap().clone();
        Ok(SimulationResult {
            success: error.is_none(),
            error,
            compute_units: Some(50_000),
            logs: Vec::new(),
        })
    }

    async fn send(&self, tx: &Transaction) -> Result<Signature> {
        self.send_count.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(tx.clone());
        if let Some(Some(error)) = self.sends.lock().unwrap().pop_front() {
            return Err(Error::Rpc(error));
        }
        Ok(tx.signatures.first().copied().unwrap_or_default())
    }

    async fn signature_status(&self, _signature: &Signature) -> Result<Option<LandedStatus>> {
        if let Some(status) = self.statuses.lock().unwrap().pop_front() {
            return Ok(status);
        }
        Ok(self.default_status.lock().unwrap().clone())
    }

    async fn transaction_fee(&self, _signature: &Signature) -> Result<Option<u64>> {
        Ok(*self.fee.lock().unwrap())
    }

    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }

    async fn sol_balance(&self, address: &Pubkey) -> Result<u64> {
        Ok(self.balances.lock().unwrap().get(address).copied().unwrap_or(0))
    }

    async fn recent_signatures(&self, address: &Pubkey, limit: usize) -> Result<Vec<RecentSignature>> {
        let mut signatures = self
            .signatures
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_default();
        signatures.truncate(limit);
        Ok(signatures)
    }

    async fn largest_token_accounts(&self, mint: &Pubkey) -> Result<Vec<u64>> {
        Ok(self
            .holders
            .lock()
            .unwrap()
            .get(mint)
            .map(|(_, amounts)| amounts.clone())
            .unwrap_or_default())
    }

    async fn token_supply(&self, mint: &Pubkey) -> Result<u64> {
        Ok(self
            .holders
            .lock()
            .unwrap()
            .get(mint)
            .map(|(supply, _)| *supply)
            .unwrap_or(0))
    }
}

// ---------------------------------------------------------------------------
// Bundle relay
// ---------------------------------------------------------------------------

pub struct FakeRelay {
    answer: std::result::Result<String, String>,
    tip_account: Pubkey,
    calls: AtomicUsize,
}

impl FakeRelay {
    pub fn accepting(bundle_id: &str) -> Self {
        Self {
            answer: Ok(bundle_id.to_string()),
            tip_account: Pubkey::new_unique(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn rejecting(reason: &str) -> Self {
        Self {
            answer: Err(reason.to_string()),
            tip_account: Pubkey::new_unique(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BundleRelay for FakeRelay {
    async fn send_bundle(&self, _transactions: &[Transaction]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone().map_err(Error::RelayRejection)
    }

    fn tip_account(&self) -> Pubkey {
        self.tip_account
    }
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeMarket {
    curves: Mutex<HashMap<Pubkey, VecDeque<BondingCurve>>>,
    activity: Mutex<HashMap<Pubkey, u32>>,
    balances: Mutex<HashMap<(Pubkey, Pubkey), u64>>,
    holder_shares: Mutex<HashMap<Pubkey, Vec<f64>>>,
    failing: AtomicBool,
}

impl FakeMarket {
    pub fn set_curve(&self, mint: Pubkey, curve: BondingCurve) {
        self.push_curves(mint, vec![curve]);
    }

    /// Each read takes the next curve; the last one repeats
    pub fn push_curves(&self, mint: Pubkey, curves: Vec<BondingCurve>) {
        self.curves.lock().unwrap().insert(mint, curves.into());
    }

    pub fn set_activity(&self, mint: Pubkey, count: u32) {
        self.activity.lock().unwrap().insert(mint, count);
    }

    pub fn set_balance(&self, owner: Pubkey, mint: Pubkey, amount: u64) {
        self.balances.lock().unwrap().insert((owner, mint), amount);
    }

    pub fn set_holder_shares(&self, mint: Pubkey, shares: Vec<f64>) {
        self.holder_shares.lock().unwrap().insert(mint, shares);
    }

    pub fn fail_reads(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(Error::Rpc("market read failed".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MarketData for FakeMarket {
    async fn bonding_curve(&self, mint: &Pubkey) -> Result<Option<BondingCurve>> {
        self.check()?;
        let mut curves = self.curves.lock().unwrap();
        let Some(queue) = curves.get_mut(mint) else {
            return Ok(None);
        };
        if queue.len() > 1 {
            Ok(queue.pop_front())
        } else {
            Ok(queue.front().cloned())
        }
    }

    async fn recent_activity(&self, mint: &Pubkey, _window: Duration) -> Result<u32> {
        self.check()?;
        Ok(self.activity.lock().unwrap().get(mint).copied().unwrap_or(0))
    }

    async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<u64> {
        self.check()?;
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&(*owner, *mint))
            .copied()
            .unwrap_or(0))
    }

    async fn holder_shares(&self, mint: &Pubkey, sample: usize) -> Result<Vec<f64>> {
        self.check()?;
        let mut shares = self
            .holder_shares
            .lock()
            .unwrap()
            .get(mint)
            .cloned()
            .unwrap_or_default();
        shares.truncate(sample);
        Ok(shares)
    }
}

// ---------------------------------------------------------------------------
// Filter services
// ---------------------------------------------------------------------------

pub struct FakeReputation {
    report: Option<TokenReport>,
}

impl FakeReputation {
    pub fn answering(report: TokenReport) -> Self {
        Self { report: Some(report) }
    }

    pub fn failing() -> Self {
        Self { report: None }
    }
}

#[async_trait]
impl ReputationApi for FakeReputation {
    async fn token_report(&self, _mint: &Pubkey) -> Result<TokenReport> {
        self.report
            .clone()
            .ok_or_else(|| Error::Http("reputation service unavailable".into()))
    }
}

pub struct FakeFlow {
    metrics: FlowMetrics,
}

impl FakeFlow {
    pub fn answering(metrics: FlowMetrics) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl FlowMetricsSource for FakeFlow {
    async fn flow_metrics(&self, _mint: &Pubkey) -> Result<Option<FlowMetrics>> {
        Ok(Some(self.metrics.clone()))
    }
}

pub struct FakeMetadata {
    metadata: Option<TokenMetadata>,
}

impl FakeMetadata {
    pub fn answering(metadata: TokenMetadata) -> Self {
        Self {
            metadata: Some(metadata),
        }
    }

    pub fn failing() -> Self {
        Self { metadata: None }
    }
}

#[async_trait]
impl MetadataSource for FakeMetadata {
    async fn metadata(&self, _mint: &Pubkey) -> Result<Option<TokenMetadata>> {
        self.metadata
            .clone()
            .map(Some)
            .ok_or_else(|| Error::Http("metadata service unavailable".into()))
    }
}

pub struct FakeSentiment {
    score: Option<f64>,
}

impl FakeSentiment {
    pub fn scoring(score: f64) -> Self {
        Self { score: Some(score) }
    }

    pub fn failing() -> Self {
        Self { score: None }
    }
}

#[async_trait]
impl SentimentService for FakeSentiment {
    async fn score(&self, _mint: &Pubkey, _metadata: &TokenMetadata) -> Result<f64> {
        self.score
            .ok_or_else(|| Error::Http("sentiment service unavailable".into()))
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeNotifier {
    alerts: Mutex<Vec<Alert>>,
    attempts: AtomicUsize,
    failing: bool,
}

impl FakeNotifier {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    /// Alerts delivered successfully
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationSink for FakeNotifier {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(Error::Http("notifier down".into()));
        }
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeJournal {
    records: Mutex<Vec<TradeRecord>>,
}

impl FakeJournal {
    pub fn records(&self) -> Vec<TradeRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl PersistenceSink for FakeJournal {
    async fn record(&self, record: &TradeRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Event stream
// ---------------------------------------------------------------------------

pub struct FakeEventStream {
    events: VecDeque<StreamEvent>,
    /// Never yield and never end
    idle: bool,
}

impl FakeEventStream {
    /// Yields `events` then ends
    pub fn new(events: Vec<StreamEvent>) -> Self {
        Self {
            events: events.into(),
            idle: false,
        }
    }

    pub fn pending() -> Self {
        Self {
            events: VecDeque::new(),
            idle: true,
        }
    }
}

#[async_trait]
impl EventStream for FakeEventStream {
    async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.idle {
            std::future::pending::<()>().await;
        }
        self.events.pop_front()
    }
}
