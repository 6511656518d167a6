//! Step execution: one plan step in, one typed result out. Nothing escapes
//! as an error; failures become [`StepOutput::Error`].

use super::plan::{Step, Tool};
use crate::cache::{EmbeddingCache, SpeechRecord};
use crate::error::GuideResult;
use crate::providers::{bounded, Summarizer, SummaryStyle};
use crate::retrieval::{HybridRetriever, RetrievalResult, DEFAULT_TOP_K};
use crate::speech::{SpeechService, DEFAULT_FORMAT, DEFAULT_STYLE, DEFAULT_VOICE};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const NOT_IMPLEMENTED: &str = "tool not implemented";
const KEY_FACT_TERMS: [&str; 3] = ["year", "built", "founded"];
const KEY_FACT_WARNING: &str = "Key facts may be missing (e.g., year/date).";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRecord {
    pub summary: String,
    pub style: SummaryStyle,
    pub lang: String,
    pub length_label: String,
    pub confidence: f32,
    pub warnings: Vec<String>,
}

/// A step's normalized result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StepOutput {
    Retrieved(Vec<RetrievalResult>),
    Summary(SummaryRecord),
    Speech(SpeechRecord),
    Embedding { embedding: Vec<f32> },
    Error { error: String },
}

impl StepOutput {
    pub fn error(message: impl Into<String>) -> Self {
        StepOutput::Error { error: message.into() }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StepOutput::Error { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRecord {
    pub step: Step,
    pub result: StepOutput,
}

pub struct StepExecutor {
    retriever: Arc<HybridRetriever>,
    summarizer: Arc<dyn Summarizer>,
    speech: Arc<SpeechService>,
    embeddings: Arc<EmbeddingCache>,
    timeout: Duration,
}

impl StepExecutor {
    pub fn new(
        retriever: Arc<HybridRetriever>,
        summarizer: Arc<dyn Summarizer>,
        speech: Arc<SpeechService>,
        embeddings: Arc<EmbeddingCache>,
        timeout: Duration,
    ) -> Self {
        Self {
            retriever,
            summarizer,
            speech,
            embeddings,
            timeout,
        }
    }

    pub async fn execute_step(&self, step: &Step) -> StepOutput {
        debug!(tool = %step.tool, "executing step");
        let outcome = match step.tool {
            Tool::Retrieve => self.retrieve(step).await,
            Tool::Summarize => self.summarize(step).await,
            Tool::Tts => self.speak(step).await,
            Tool::Embed => self.embed(step).await,
            Tool::Translate | Tool::Recommend | Tool::Caption => {
                return StepOutput::error(NOT_IMPLEMENTED);
            }
        };
        outcome.unwrap_or_else(|e| {
            warn!(tool = %step.tool, error = %e, "step failed");
            StepOutput::error(e.to_string())
        })
    }

    async fn retrieve(&self, step: &Step) -> GuideResult<StepOutput> {
        let k = step.param_usize("k").unwrap_or(DEFAULT_TOP_K);
        let results = self.retriever.retrieve(&step.input, k, true).await?;
        Ok(StepOutput::Retrieved(results))
    }

    async fn summarize(&self, step: &Step) -> GuideResult<StepOutput> {
        let style = step.param_str("style").map(SummaryStyle::from_key).unwrap_or_default();
        let lang = step.param_str("lang").unwrap_or("en").to_string();
        let bounds = style.bounds();
        let summary = bounded(
            "summarizer",
            self.timeout,
            self.summarizer.summarize(&step.input, bounds),
        )
        .await?;

        let (confidence, warnings) = if mentions_key_facts(&step.input) && !mentions_key_facts(&summary) {
            (0.7, vec![KEY_FACT_WARNING.to_string()])
        } else {
            (0.95, Vec::new())
        };
        Ok(StepOutput::Summary(SummaryRecord {
            summary,
            style,
            lang,
            length_label: format!("{}-{} tokens", bounds.min, bounds.max),
            confidence,
            warnings,
        }))
    }

    async fn speak(&self, step: &Step) -> GuideResult<StepOutput> {
        let voice = step.param_str("voice").unwrap_or(DEFAULT_VOICE);
        let style = step.param_str("style").unwrap_or(DEFAULT_STYLE);
        let format = step.param_str("format").unwrap_or(DEFAULT_FORMAT);
        let record = self.speech.speak(&step.input, voice, style, format).await?;
        Ok(StepOutput::Speech(record))
    }

    async fn embed(&self, step: &Step) -> GuideResult<StepOutput> {
        let embedding = self.embeddings.embed(&step.input).await?;
        Ok(StepOutput::Embedding { embedding })
    }
}

fn mentions_key_facts(text: &str) -> bool {
    let lower = text.to_lowercase();
    KEY_FACT_TERMS.iter().any(|t| lower.contains(t))
}
