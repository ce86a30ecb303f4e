//! Candidate ingest
//!
//! Reads the event stream, drops mints it has already seen, and pushes the
//! rest onto the bounded queue. No filtering happens here.

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashSet, VecDeque};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::backpressure::{PushOutcome, SharedCandidateQueue};
use crate::types::Candidate;

/// Event from the upstream subscription
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Candidate(Candidate),
    Connected,
    Disconnected,
    Error(String),
}

/// At-least-once source of stream events
#[async_trait]
pub trait EventStream: Send {
    /// `None` once the stream has ended for good
    async fn next_event(&mut self) -> Option<StreamEvent>;
}

/// Mints seen recently, oldest evicted first
#[derive(Debug)]
pub struct RecentSet {
    capacity: usize,
    order: VecDeque<Pubkey>,
    members: HashSet<Pubkey>,
}

impl RecentSet {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
        }
    }

    /// True when `mint` was not already present
    pub fn insert(&mut self, mint: Pubkey) -> bool {
        if self.members.contains(&mint) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
        self.order.push_back(mint);
        self.members.insert(mint);
        true
    }

    pub fn contains(&self, mint: &Pubkey) -> bool {
        self.members.contains(mint)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub received: u64,
    pub duplicates: u64,
    pub queued: u64,
    pub dropped: u64,
}

pub struct CandidateIngest {
    stream: Box<dyn EventStream>,
    queue: SharedCandidateQueue,
    seen: RecentSet,
    shutdown: CancellationToken,
    stats: IngestStats,
}

impl CandidateIngest {
    pub fn new(
        stream: Box<dyn EventStream>,
        queue: SharedCandidateQueue,
        dedupe_window: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            stream,
            queue,
            seen: RecentSet::new(dedupe_window),
            shutdown,
            stats: IngestStats::default(),
        }
    }

    pub fn spawn(self, tracker: &TaskTracker) -> JoinHandle<IngestStats> {
        tracker.spawn(self.run())
    }

    /// Runs until shutdown or until the stream ends
    pub async fn run(mut self) -> IngestStats {
        info!("Candidate ingest started");
        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Candidate ingest stopping on shutdown");
                    break;
                }
                event = self.stream.next_event() => event,
            };

            match event {
                Some(StreamEvent::Candidate(candidate)) => self.accept(candidate),
                Some(StreamEvent::Connected) => info!("Event stream connected"),
                Some(StreamEvent::Disconnected) => warn!("Event stream disconnected"),
                Some(StreamEvent::Error(e)) => error!("Event stream error: {}", e),
                None => {
                    warn!("Event stream ended");
                    break;
                }
            }
        }

        info!(
            "Candidate ingest finished: {} received, {} duplicate, {} queued, {} dropped",
            self.stats.received, self.stats.duplicates, self.stats.queued, self.stats.dropped
        );
        self.stats
    }

    fn accept(&mut self, candidate: Candidate) {
        self.stats.received += 1;
        if !self.seen.insert(candidate.mint) {
            self.stats.duplicates += 1;
            debug!("Duplicate candidate {}", candidate.short_mint());
            return;
        }

        let mint = candidate.short_mint();
        match self.queue.push(candidate) {
            PushOutcome::Queued => {
                self.stats.queued += 1;
                debug!("Queued candidate {} (depth {})", mint, self.queue.len());
            }
            PushOutcome::DroppedNewest => {
                self.stats.dropped += 1;
                warn!(
                    "Candidate queue full, dropped {} ({} dropped total)",
                    mint,
                    self.queue.dropped()
                );
            }
            PushOutcome::DroppedOldest => {
                self.stats.queued += 1;
                self.stats.dropped += 1;
                warn!(
                    "Candidate queue full, evicted oldest for {} ({} dropped total)",
                    mint,
                    self.queue.dropped()
                );
            }
        }
    }
}
