//! Candidate ingestion
//!
//! - `pumpportal`: WebSocket subscription producing candidates
//! - `ingest`: dedupe and hand-off to the queue
//! - `backpressure`: the bounded queue the governor consumes

pub mod backpressure;
pub mod ingest;
pub mod pumpportal;

pub use backpressure::{BoundedQueue, CandidateQueue, PushOutcome, SharedCandidateQueue};
pub use ingest::{CandidateIngest, EventStream, IngestStats, RecentSet, StreamEvent};
pub use pumpportal::{PumpPortalClient, PumpPortalStream};
