//! Trading module - plan building and submission
//!
//! Entries and exits share one submission path:
//! - Jito bundle relay (tipped plans)
//! - Direct RPC with bounded retries (fallback, untipped plans)

pub mod builder;
pub mod plan;
pub mod relay;
pub mod retry;
pub mod rpc;
pub mod submitter;
pub mod tips;

pub use builder::{PumpTradeBuilder, QuotedPlan, TradeBuilder};
pub use plan::{ConfirmationStatus, SubmitRoute, TradeSide, TxOutcome, TxPlan};
pub use relay::{BundleRelay, JitoRelay};
pub use rpc::{ChainRpc, FailoverRpc, SolanaRpc};
pub use submitter::TransactionSubmitter;
