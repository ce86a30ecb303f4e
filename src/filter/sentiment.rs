//! Token metadata and sentiment scoring
//!
//! The score comes from an external sentiment service when one is
//! configured and answers; otherwise [`heuristic_score`] rates the metadata
//! locally (name/symbol quality, socials, live stream).

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::Candidate;

/// Public metadata of a pump.fun coin
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub twitter: Option<String>,
    #[serde(default)]
    pub telegram: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub is_live: bool,
    #[serde(default)]
    pub video_url: Option<String>,
}

impl TokenMetadata {
    /// Whatever the creation event carried
    pub fn from_candidate(candidate: &Candidate) -> Option<Self> {
        if candidate.name.is_none() && candidate.symbol.is_none() {
            return None;
        }
        Some(Self {
            name: candidate.name.clone().unwrap_or_default(),
            symbol: candidate.symbol.clone().unwrap_or_default(),
            ..Default::default()
        })
    }

    pub fn has_live_stream(&self) -> bool {
        self.is_live || self.video_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// `None` when the token is unknown to the source
    async fn metadata(&self, mint: &Pubkey) -> Result<Option<TokenMetadata>>;
}

#[async_trait]
pub trait SentimentService: Send + Sync {
    /// Score in 0..=100
    async fn score(&self, mint: &Pubkey, metadata: &TokenMetadata) -> Result<f64>;
}

/// `GET {base}/coins/{mint}` on the pump.fun frontend API
pub struct PumpFunMetadata {
    client: Client,
    base_url: String,
}

impl PumpFunMetadata {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MetadataSource for PumpFunMetadata {
    async fn metadata(&self, mint: &Pubkey) -> Result<Option<TokenMetadata>> {
        let url = format!("{}/coins/{}", self.base_url, mint);
        let response = self.client.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::Http(format!(
                "metadata API returned {} for {}",
                response.status(),
                mint
            )));
        }
        Ok(Some(response.json().await?))
    }
}

#[derive(Debug, Deserialize)]
struct ScoreReply {
    score: f64,
}

/// `POST {endpoint}` with `{mint, metadata}`, expecting `{"score": f64}`
pub struct HttpSentimentService {
    client: Client,
    endpoint: String,
}

impl HttpSentimentService {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl SentimentService for HttpSentimentService {
    async fn score(&self, mint: &Pubkey, metadata: &TokenMetadata) -> Result<f64> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "mint": mint.to_string(), "metadata": metadata }))
            .send()
            .await?
            .error_for_status()?;
        let reply: ScoreReply = response.json().await?;
        debug!("Sentiment service scored {} at {:.1}", mint, reply.score);
        Ok(reply.score.clamp(0.0, 100.0))
    }
}

static SCAM_KEYWORDS: OnceLock<Regex> = OnceLock::new();
static SPAM_PATTERNS: OnceLock<Regex> = OnceLock::new();
static INVISIBLE_CHARS: OnceLock<Regex> = OnceLock::new();

fn scam_keywords() -> &'static Regex {
    SCAM_KEYWORDS.get_or_init(|| {
        Regex::new(r"(?i)(scam|rug|honeypot|free\s*money|100+x|1000+x|guaranteed|send.*sol|airdrop.*claim)")
            .expect("Invalid scam keywords regex")
    })
}

fn spam_patterns() -> &'static Regex {
    SPAM_PATTERNS.get_or_init(|| {
        Regex::new(r"(?i)(test|asdf|qwerty|aaaa|1234|abcd)").expect("Invalid spam patterns regex")
    })
}

fn invisible_chars() -> &'static Regex {
    INVISIBLE_CHARS.get_or_init(|| {
        Regex::new(r"[\x{200B}-\x{200D}\x{FEFF}\x{00A0}]").expect("Invalid invisible chars regex")
    })
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Local 0-100 rating of token metadata
pub fn heuristic_score(metadata: &TokenMetadata) -> f64 {
    let mut score: f64 = 50.0;
    let name = metadata.name.trim();
    let symbol = metadata.symbol.trim();
    let description = metadata.description.as_deref().unwrap_or("");

    if name.is_empty() {
        score -= 20.0;
    } else if (2..=32).contains(&name.chars().count()) {
        score += 5.0;
    }
    if (2..=10).contains(&symbol.chars().count()) {
        score += 5.0;
    }

    let text = format!("{} {} {}", name, symbol, description);
    if scam_keywords().is_match(&text) {
        score -= 40.0;
    }
    if spam_patterns().is_match(name) || spam_patterns().is_match(symbol) {
        score -= 15.0;
    }
    if invisible_chars().is_match(&metadata.name) || invisible_chars().is_match(&metadata.symbol) {
        score -= 20.0;
    }

    if !description.trim().is_empty() {
        score += 5.0;
    }
    for social in [&metadata.twitter, &metadata.telegram, &metadata.website] {
        if present(social) {
            score += 10.0;
        }
    }
    if metadata.has_live_stream() {
        score += 10.0;
    }

    score.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, symbol: &str) -> TokenMetadata {
        TokenMetadata {
            name: name.into(),
            symbol: symbol.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_plain_token_scores_neutral() {
        assert_eq!(heuristic_score(&meta("Sunny Otter", "OTTER")), 60.0);
    }

    #[test]
    fn test_scam_words_sink_the_score() {
        let score = heuristic_score(&meta("Guaranteed 100x", "FREE"));
        assert!(score < 40.0);
    }

    #[test]
    fn test_socials_and_stream_raise_the_score() {
        let mut m = meta("Sunny Otter", "OTTER");
        m.description = Some("otters on a beach".into());
        m.twitter = Some("https://x.com/otter".into());
        m.telegram = Some("https://t.me/otter".into());
        m.website = Some("https://otter.fun".into());
        m.video_url = Some("https://stream".into());
        assert_eq!(heuristic_score(&m), 100.0);
    }

    #[test]
    fn test_invisible_characters_are_penalized() {
        let clean = heuristic_score(&meta("Otter", "OTR"));
        let sneaky = heuristic_score(&meta("Ot\u{200B}ter", "OTR"));
        assert!(sneaky < clean);
    }

    #[test]
    fn test_metadata_from_candidate() {
        let mut candidate = Candidate::new(Pubkey::new_unique(), Pubkey::new_unique(), "sig");
        assert!(TokenMetadata::from_candidate(&candidate).is_none());

        candidate.symbol = Some("OTR".into());
        let m = TokenMetadata::from_candidate(&candidate).unwrap();
        assert_eq!(m.symbol, "OTR");
        assert!(m.name.is_empty());
    }

    #[test]
    fn test_metadata_parses_frontend_shape() {
        let m: TokenMetadata = serde_json::from_str(
            r#"{"mint":"x","name":"Otter","symbol":"OTR","twitter":null,"is_live":true,"usd_market_cap":5000.1}"#,
        )
        .unwrap();
        assert!(m.has_live_stream());
        assert!(m.twitter.is_none());
    }
}
