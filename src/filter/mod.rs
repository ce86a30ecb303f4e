//! Token filtering
//!
//! A single [`FilterChain`] runs pluggable stages in configured order:
//! blacklist, reputation, chain state, order flow, holder concentration
//! and sentiment.

pub mod chain;
pub mod flow;
pub mod reputation;
pub mod sentiment;
pub mod stages;

pub use chain::{FilterChain, FilterMetrics, FilterStage, FilterVerdict, StageContext, StageDecision};
pub use flow::{BitqueryClient, FlowMetrics, FlowMetricsSource};
pub use reputation::{HttpReputationApi, ReputationApi, TokenReport};
pub use sentiment::{HttpSentimentService, MetadataSource, PumpFunMetadata, SentimentService, TokenMetadata};
pub use stages::{BlacklistStage, ChainStateStage, FlowStage, HoldersStage, ReputationStage, SentimentStage};
