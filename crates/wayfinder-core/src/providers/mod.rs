//! Capability providers consumed by the core.
//!
//! Each external model or service is reached only through one of these narrow
//! traits. Concrete adapters live in the submodules; tests plug in fakes.

mod embedding;
mod openrouter;
mod speech;
mod summarizer;
mod wikipedia;

pub use embedding::{BlockingEmbedder, HashingEmbedder, HttpEmbedder, SyncEmbedder};
pub use openrouter::{OpenRouterGenerator, JSON_ONLY_SYSTEM_PROMPT};
pub use speech::{OpenAiSpeech, SilentSpeech};
pub use summarizer::LlmSummarizer;
pub use wikipedia::WikipediaClient;

use crate::error::{GuideError, GuideResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Text → vector. Deterministic per input text.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> GuideResult<Vec<f32>>;

    fn name(&self) -> &str;
}

/// Single-turn completion. Callers always ask for JSON-only output and must
/// tolerate anything else coming back.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, max_tokens: u32, temperature: f32) -> GuideResult<String>;
}

/// Stands in when no generative provider is configured. Every call fails, so
/// planning and answering take their deterministic fallbacks.
#[derive(Debug, Default)]
pub struct NoGenerator;

#[async_trait]
impl Generator for NoGenerator {
    async fn generate(&self, _prompt: &str, _max_tokens: u32, _temperature: f32) -> GuideResult<String> {
        Err(GuideError::provider("generator", "no generative provider configured"))
    }
}

/// Abstractive summarization bounded by a (min, max) length pair.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str, bounds: LengthBounds) -> GuideResult<String>;
}

/// Text-to-speech. Returns audio bytes encoded as `format` (empty = nothing
/// to play). Backends map `voice` onto one of their own and may refuse a
/// format they cannot encode.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str, format: &str) -> GuideResult<Vec<u8>>;
}

/// Encyclopedia-style lookup. `fetch_page` signals ambiguous titles with
/// [`GuideError::Disambiguation`] and missing ones with [`GuideError::PageNotFound`].
#[async_trait]
pub trait Encyclopedia: Send + Sync {
    async fn search(&self, query: &str) -> GuideResult<Vec<String>>;

    async fn fetch_page(&self, title: &str) -> GuideResult<EncyclopediaPage>;
}

/// A fetched encyclopedia page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncyclopediaPage {
    pub title: String,
    pub summary: String,
    pub body: String,
    pub images: Vec<String>,
}

/// Inclusive (min, max) summary length in tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthBounds {
    pub min: u32,
    pub max: u32,
}

/// Summary length presets keyed by style name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStyle {
    /// Map pin caption.
    MapPin,
    #[default]
    Summary,
    Deep,
}

impl SummaryStyle {
    /// Unknown keys fall back to the medium `summary` style.
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().as_str() {
            "map_pin" => SummaryStyle::MapPin,
            "deep" => SummaryStyle::Deep,
            _ => SummaryStyle::Summary,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStyle::MapPin => "map_pin",
            SummaryStyle::Summary => "summary",
            SummaryStyle::Deep => "deep",
        }
    }

    pub fn bounds(&self) -> LengthBounds {
        let (min, max) = match self {
            SummaryStyle::MapPin => (15, 30),
            SummaryStyle::Summary => (40, 80),
            SummaryStyle::Deep => (80, 200),
        };
        LengthBounds { min, max }
    }
}

/// Runs a provider future under a hard deadline. A timeout is reported as
/// [`GuideError::Timeout`] so callers degrade exactly as for any other failure.
pub async fn bounded<T, F>(provider: &'static str, limit: Duration, fut: F) -> GuideResult<T>
where
    F: Future<Output = GuideResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(provider, secs = limit.as_secs(), "provider call timed out");
            Err(GuideError::Timeout {
                provider,
                secs: limit.as_secs(),
            })
        }
    }
}
