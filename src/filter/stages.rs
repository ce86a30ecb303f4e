//! The six stock filter stages

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{FilterConfig, StageKind};
use crate::error::Result;
use crate::filter::chain::{FilterStage, StageContext, StageDecision};
use crate::filter::flow::FlowMetricsSource;
use crate::filter::reputation::ReputationApi;
use crate::filter::sentiment::{heuristic_score, MetadataSource, SentimentService, TokenMetadata};
use crate::pump::MarketData;

/// Creator address on the configured blacklist
pub struct BlacklistStage;

#[async_trait]
impl FilterStage for BlacklistStage {
    fn kind(&self) -> StageKind {
        StageKind::Blacklist
    }

    fn name(&self) -> &'static str {
        "blacklist"
    }

    async fn evaluate(&self, ctx: &mut StageContext<'_>) -> Result<StageDecision> {
        let creator = ctx.candidate.creator.to_string();
        if ctx.filters.creator_blacklist.iter().any(|c| c == &creator) {
            return Ok(StageDecision::Reject(format!("creator {} is blacklisted", creator)));
        }
        Ok(StageDecision::Pass)
    }
}

/// Rug risk and curve progress from the analytics API
pub struct ReputationStage {
    api: Arc<dyn ReputationApi>,
}

impl ReputationStage {
    pub fn new(api: Arc<dyn ReputationApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl FilterStage for ReputationStage {
    fn kind(&self) -> StageKind {
        StageKind::Reputation
    }

    fn name(&self) -> &'static str {
        "reputation"
    }

    fn on_failure(&self, _filters: &FilterConfig, error: &str) -> StageDecision {
        // Unvetted; the chain-state stage takes over
        StageDecision::Skip(format!("reputation unavailable: {}", error))
    }

    async fn evaluate(&self, ctx: &mut StageContext<'_>) -> Result<StageDecision> {
        let report = self.api.token_report(&ctx.candidate.mint).await?;
        ctx.metrics.rug_risk = Some(report.rug_risk);
        ctx.metrics.progress_pct = Some(report.bonding_curve_progress);
        ctx.vetted = true;

        if report.rug_risk > ctx.filters.max_rug_risk {
            return Ok(StageDecision::Reject(format!(
                "rug risk {:.1} above {:.1}",
                report.rug_risk, ctx.filters.max_rug_risk
            )));
        }
        if !ctx.filters.progress_in_window(report.bonding_curve_progress) {
            return Ok(StageDecision::Reject(format!(
                "curve progress {:.1}% outside [{:.1}, {:.1}]",
                report.bonding_curve_progress, ctx.filters.progress_min, ctx.filters.progress_max
            )));
        }
        Ok(StageDecision::Pass)
    }
}

/// Curve progress and buyer density read straight from the chain
pub struct ChainStateStage {
    market: Arc<dyn MarketData>,
}

impl ChainStateStage {
    pub fn new(market: Arc<dyn MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl FilterStage for ChainStateStage {
    fn kind(&self) -> StageKind {
        StageKind::ChainState
    }

    fn name(&self) -> &'static str {
        "chain_state"
    }

    fn on_failure(&self, _filters: &FilterConfig, error: &str) -> StageDecision {
        StageDecision::Reject(format!("curve unreadable: {}", error))
    }

    async fn evaluate(&self, ctx: &mut StageContext<'_>) -> Result<StageDecision> {
        if ctx.vetted && !ctx.filters.chain_state_always {
            return Ok(StageDecision::Skip("vetted by reputation".into()));
        }

        let mint = ctx.candidate.mint;
        let Some(curve) = self.market.bonding_curve(&mint).await? else {
            return Ok(StageDecision::Reject("bonding curve not found".into()));
        };

        let progress = curve.progress_pct();
        ctx.metrics.progress_pct = Some(progress);
        if !ctx.filters.progress_in_window(progress) {
            return Ok(StageDecision::Reject(format!(
                "curve progress {:.1}% outside [{:.1}, {:.1}]",
                progress, ctx.filters.progress_min, ctx.filters.progress_max
            )));
        }

        let window = Duration::from_secs(ctx.filters.density_window_secs);
        let density = self.market.recent_activity(&mint, window).await?;
        ctx.metrics.activity_density = Some(density);
        if density < ctx.filters.min_activity_density {
            return Ok(StageDecision::Reject(format!(
                "{} buyers in {}s, need {}",
                density, ctx.filters.density_window_secs, ctx.filters.min_activity_density
            )));
        }
        Ok(StageDecision::Pass)
    }
}

/// Order flow from Bitquery
pub struct FlowStage {
    source: Option<Arc<dyn FlowMetricsSource>>,
}

impl FlowStage {
    /// `None` when no API key is configured
    pub fn new(source: Option<Arc<dyn FlowMetricsSource>>) -> Self {
        Self { source }
    }

    fn unavailable(filters: &FilterConfig, why: &str) -> StageDecision {
        if filters.flow.mandatory {
            StageDecision::Reject(format!("flow data required: {}", why))
        } else {
            StageDecision::Skip(format!("flow data unavailable: {}", why))
        }
    }
}

#[async_trait]
impl FilterStage for FlowStage {
    fn kind(&self) -> StageKind {
        StageKind::Flow
    }

    fn name(&self) -> &'static str {
        "flow"
    }

    fn on_failure(&self, filters: &FilterConfig, error: &str) -> StageDecision {
        Self::unavailable(filters, error)
    }

    async fn evaluate(&self, ctx: &mut StageContext<'_>) -> Result<StageDecision> {
        let Some(source) = &self.source else {
            return Ok(Self::unavailable(ctx.filters, "no API key"));
        };
        let Some(flow) = source.flow_metrics(&ctx.candidate.mint).await? else {
            return Ok(Self::unavailable(ctx.filters, "token unknown to flow source"));
        };
        ctx.metrics.flow = Some(flow.clone());

        let rules = &ctx.filters.flow;
        let decision = if flow.graduated {
            StageDecision::Reject("token already graduated".into())
        } else if !ctx.filters.progress_in_window(flow.progress_pct) {
            StageDecision::Reject(format!("flow progress {:.1}% outside window", flow.progress_pct))
        } else if flow.unique_buyers < rules.min_unique_buyers {
            StageDecision::Reject(format!(
                "{} unique buyers, need {}",
                flow.unique_buyers, rules.min_unique_buyers
            ))
        } else if flow.buy_volume_usd < rules.min_buy_volume_usd {
            StageDecision::Reject(format!(
                "buy volume ${:.0}, need ${:.0}",
                flow.buy_volume_usd, rules.min_buy_volume_usd
            ))
        } else if flow.unique_sellers as f64 > flow.unique_buyers as f64 * rules.max_seller_ratio {
            StageDecision::Reject(format!(
                "{} sellers against {} buyers",
                flow.unique_sellers, flow.unique_buyers
            ))
        } else {
            StageDecision::Pass
        };
        Ok(decision)
    }
}

/// Share of supply held by the top wallets, curve vault excluded
pub struct HoldersStage {
    market: Arc<dyn MarketData>,
}

impl HoldersStage {
    pub fn new(market: Arc<dyn MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl FilterStage for HoldersStage {
    fn kind(&self) -> StageKind {
        StageKind::Holders
    }

    fn name(&self) -> &'static str {
        "holders"
    }

    fn on_failure(&self, _filters: &FilterConfig, error: &str) -> StageDecision {
        debug!("Holder check failed open: {}", error);
        StageDecision::Pass
    }

    async fn evaluate(&self, ctx: &mut StageContext<'_>) -> Result<StageDecision> {
        // One extra account so the primary holder can be dropped
        let mut shares = self
            .market
            .holder_shares(&ctx.candidate.mint, ctx.filters.holder_sample + 1)
            .await?;
        if shares.is_empty() {
            return Ok(StageDecision::Skip("no holders yet".into()));
        }
        shares.sort_by(|a, b| b.total_cmp(a));

        let concentration: f64 = shares.iter().skip(1).sum();
        ctx.metrics.holder_concentration_pct = Some(concentration);
        if concentration > ctx.filters.max_holder_concentration_pct {
            return Ok(StageDecision::Reject(format!(
                "top holders own {:.1}%, limit {:.1}%",
                concentration, ctx.filters.max_holder_concentration_pct
            )));
        }
        Ok(StageDecision::Pass)
    }
}

/// Metadata sentiment, external service first, local heuristic otherwise
pub struct SentimentStage {
    metadata: Option<Arc<dyn MetadataSource>>,
    service: Option<Arc<dyn SentimentService>>,
}

impl SentimentStage {
    pub fn new(
        metadata: Option<Arc<dyn MetadataSource>>,
        service: Option<Arc<dyn SentimentService>>,
    ) -> Self {
        Self { metadata, service }
    }

    async fn resolve_metadata(&self, ctx: &StageContext<'_>) -> Option<TokenMetadata> {
        if let Some(source) = &self.metadata {
            match source.metadata(&ctx.candidate.mint).await {
                Ok(Some(metadata)) => return Some(metadata),
                Ok(None) => debug!("No metadata published for {}", ctx.candidate.mint),
                Err(e) => warn!("Metadata fetch failed for {}: {}", ctx.candidate.mint, e),
            }
        }
        TokenMetadata::from_candidate(ctx.candidate)
    }
}

#[async_trait]
impl FilterStage for SentimentStage {
    fn kind(&self) -> StageKind {
        StageKind::Sentiment
    }

    fn name(&self) -> &'static str {
        "sentiment"
    }

    async fn evaluate(&self, ctx: &mut StageContext<'_>) -> Result<StageDecision> {
        let Some(metadata) = self.resolve_metadata(ctx).await else {
            return Ok(StageDecision::Skip("no metadata".into()));
        };

        let score = match &self.service {
            Some(service) => match service.score(&ctx.candidate.mint, &metadata).await {
                Ok(score) => score,
                Err(e) => {
                    warn!("Sentiment service failed, using heuristic: {}", e);
                    heuristic_score(&metadata)
                }
            },
            None => heuristic_score(&metadata),
        };

        ctx.metrics.sentiment_score = Some(score);
        if score < ctx.filters.min_sentiment_score {
            return Ok(StageDecision::Reject(format!(
                "sentiment {:.1} below {:.1}",
                score, ctx.filters.min_sentiment_score
            )));
        }
        Ok(StageDecision::Pass)
    }
}
