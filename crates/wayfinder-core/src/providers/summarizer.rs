//! Summarization through the generative provider.

use super::{Generator, LengthBounds, Summarizer};
use crate::error::{GuideError, GuideResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Upper bound on the text handed to the model (≈512 encoder tokens).
const MAX_INPUT_CHARS: usize = 4000;

#[derive(Deserialize)]
struct SummaryJson {
    summary: String,
}

/// Asks the generator for a summary between `min` and `max` tokens. The
/// generator is JSON-only, so the summary comes back as `{"summary": "..."}`;
/// bare text is accepted as-is.
pub struct LlmSummarizer {
    generator: Arc<dyn Generator>,
}

impl LlmSummarizer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, text: &str, bounds: LengthBounds) -> GuideResult<String> {
        let input: String = text.chars().take(MAX_INPUT_CHARS).collect();
        let prompt = format!(
            "Summarize the following text in between {} and {} tokens. \
             Keep names, dates and places.\n\nTEXT:\n{}\n\nYour JSON response: {{\"summary\": \"...\"}}",
            bounds.min, bounds.max, input
        );
        let raw = self.generator.generate(&prompt, bounds.max * 2, 0.0).await?;
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(GuideError::provider("summarizer", "empty summary"));
        }
        match crate::orchestrator::extract_first_json_object(raw)
            .and_then(|j| serde_json::from_str::<SummaryJson>(j).ok())
        {
            Some(parsed) => Ok(parsed.summary),
            None => Ok(raw.to_string()),
        }
    }
}
