//! Ordered, short-circuiting filter chain
//!
//! Stages are independent and pluggable. The chain runs the ones named in
//! `filters.stages`, in that order, each under `filters.stage_timeout_ms`.
//! A stage error or timeout goes through the stage's own fallback policy and
//! never aborts the chain. The first rejection ends the evaluation.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{FilterConfig, StageKind};
use crate::error::Result;
use crate::filter::flow::FlowMetrics;
use crate::types::Candidate;

/// Outcome of one stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StageDecision {
    Pass,
    Reject(String),
    /// Stage had nothing to judge; the chain continues
    Skip(String),
}

impl StageDecision {
    pub fn is_reject(&self) -> bool {
        matches!(self, StageDecision::Reject(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StageTrace {
    pub stage: &'static str,
    pub decision: StageDecision,
    /// Decision came from the stage's failure policy
    pub fallback: bool,
    pub elapsed_ms: u64,
}

/// Whatever the stages measured along the way
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterMetrics {
    pub rug_risk: Option<f64>,
    pub progress_pct: Option<f64>,
    pub activity_density: Option<u32>,
    #[serde(skip)]
    pub flow: Option<FlowMetrics>,
    pub holder_concentration_pct: Option<f64>,
    pub sentiment_score: Option<f64>,
    pub trace: Vec<StageTrace>,
}

impl FilterMetrics {
    /// Names of the stages that actually ran
    pub fn stages_run(&self) -> Vec<&'static str> {
        self.trace.iter().map(|t| t.stage).collect()
    }
}

#[derive(Debug, Clone)]
pub struct FilterVerdict {
    pub approved: bool,
    pub rejecting_stage: Option<&'static str>,
    pub reason: String,
    pub metrics: FilterMetrics,
}

/// Mutable state threaded through the stages of one evaluation
pub struct StageContext<'a> {
    pub candidate: &'a Candidate,
    pub filters: &'a FilterConfig,
    pub metrics: FilterMetrics,
    /// An external reputation service already answered for this token
    pub vetted: bool,
}

impl<'a> StageContext<'a> {
    pub fn new(candidate: &'a Candidate, filters: &'a FilterConfig) -> Self {
        Self {
            candidate,
            filters,
            metrics: FilterMetrics::default(),
            vetted: false,
        }
    }
}

#[async_trait]
pub trait FilterStage: Send + Sync {
    fn kind(&self) -> StageKind;

    fn name(&self) -> &'static str;

    /// Decision to use when `evaluate` errors or times out
    fn on_failure(&self, _filters: &FilterConfig, error: &str) -> StageDecision {
        StageDecision::Skip(format!("{} unavailable: {}", self.name(), error))
    }

    async fn evaluate(&self, ctx: &mut StageContext<'_>) -> Result<StageDecision>;
}

#[derive(Default)]
pub struct FilterChain {
    stages: HashMap<StageKind, Arc<dyn FilterStage>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a stage; a later stage of the same kind replaces the earlier one
    pub fn with_stage(mut self, stage: Arc<dyn FilterStage>) -> Self {
        self.stages.insert(stage.kind(), stage);
        self
    }

    pub fn installed(&self) -> usize {
        self.stages.len()
    }

    pub async fn evaluate(&self, candidate: &Candidate, filters: &FilterConfig) -> FilterVerdict {
        let mut ctx = StageContext::new(candidate, filters);
        let stage_timeout = Duration::from_millis(filters.stage_timeout_ms);

        for kind in &filters.stages {
            let Some(stage) = self.stages.get(kind) else {
                debug!("Stage {:?} not installed, skipping", kind);
                continue;
            };

            let started = Instant::now();
            let (decision, fallback) =
                match tokio::time::timeout(stage_timeout, stage.evaluate(&mut ctx)).await {
                    Ok(Ok(decision)) => (decision, false),
                    Ok(Err(e)) => {
                        warn!("{} stage failed for {}: {}", stage.name(), candidate.mint, e);
                        (stage.on_failure(filters, &e.to_string()), true)
                    }
                    Err(_) => {
                        warn!(
                            "{} stage timed out after {}ms for {}",
                            stage.name(),
                            stage_timeout.as_millis(),
                            candidate.mint
                        );
                        (stage.on_failure(filters, "timed out"), true)
                    }
                };

            debug!(
                stage = stage.name(),
                fallback,
                "Stage decision for {}: {:?}",
                candidate.short_mint(),
                decision
            );
            ctx.metrics.trace.push(StageTrace {
                stage: stage.name(),
                decision: decision.clone(),
                fallback,
                elapsed_ms: started.elapsed().as_millis() as u64,
            });

            if let StageDecision::Reject(reason) = decision {
                info!(
                    "Rejected {} at {}: {}",
                    candidate.short_mint(),
                    stage.name(),
                    reason
                );
                return FilterVerdict {
                    approved: false,
                    rejecting_stage: Some(stage.name()),
                    reason,
                    metrics: ctx.metrics,
                };
            }
        }

        FilterVerdict {
            approved: true,
            rejecting_stage: None,
            reason: "all stages passed".to_string(),
            metrics: ctx.metrics,
        }
    }
}
