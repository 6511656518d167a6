//! Answer composition over the evidence gathered by retrieve steps.

use super::executor::{ExecutionRecord, StepOutput};
use super::json::extract_first_json_object;
use crate::providers::{bounded, Generator};
use crate::retrieval::RetrievalResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const MAX_EVIDENCE: usize = 5;
pub const NO_SOURCES: &str = "No sources.";
pub const GREETING_ANSWER: &str = "Hello! How can I help you today?";
pub const UNSYNTHESIZED_ANSWER: &str = "Sorry, I could not synthesize a response from what I found.";
const FALLBACK_CONFIDENCE: f32 = 0.1;
const ANSWER_MAX_TOKENS: u32 = 512;
const ANSWER_TEMPERATURE: f32 = 0.2;

/// A source backing an answer: a retained evidence item, or a citation the
/// model gave that matches none of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Source {
    Evidence(RetrievalResult),
    Cited(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposedAnswer {
    pub answer: String,
    pub sources: Vec<Source>,
    pub confidence: f32,
}

#[derive(Deserialize)]
struct ModelAnswer {
    answer: String,
    #[serde(default)]
    sources: Option<Vec<Value>>,
    #[serde(default)]
    confidence: Option<Value>,
}

pub struct AnswerComposer {
    generator: Arc<dyn Generator>,
    timeout: Duration,
}

impl AnswerComposer {
    pub fn new(generator: Arc<dyn Generator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    pub async fn compose(&self, records: &[ExecutionRecord], query: &str) -> ComposedAnswer {
        let evidence = collect_evidence(records);
        let avg = average_score(&evidence);
        let grounding = grounding_block(&evidence);
        let prompt = build_prompt(&grounding, query);

        let raw = match bounded(
            "composer",
            self.timeout,
            self.generator.generate(&prompt, ANSWER_MAX_TOKENS, ANSWER_TEMPERATURE),
        )
        .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "answer generation failed");
                return fallback_answer(evidence);
            }
        };
        debug!(raw = %raw, "composer output");

        let parsed = extract_first_json_object(&raw).and_then(|j| serde_json::from_str::<ModelAnswer>(j).ok());
        let Some(parsed) = parsed else {
            warn!("answer output was not a usable JSON object");
            return fallback_answer(evidence);
        };

        let confidence = parsed
            .confidence
            .as_ref()
            .and_then(Value::as_f64)
            .map(|c| (c as f32).clamp(0.0, 1.0))
            .unwrap_or(avg);
        let sources = match parsed.sources {
            Some(cited) => cited.iter().map(|c| resolve_source(c, &evidence)).collect(),
            None => evidence.into_iter().map(Source::Evidence).collect(),
        };
        ComposedAnswer {
            answer: parsed.answer,
            sources,
            confidence,
        }
    }
}

/// Every retrieve result in the trace, best first, capped at [`MAX_EVIDENCE`].
/// Equal scores keep trace order.
pub fn collect_evidence(records: &[ExecutionRecord]) -> Vec<RetrievalResult> {
    let mut evidence: Vec<RetrievalResult> = records
        .iter()
        .filter_map(|r| match &r.result {
            StepOutput::Retrieved(items) => Some(items.iter().cloned()),
            _ => None,
        })
        .flatten()
        .collect();
    evidence.sort_by(|a, b| b.score.total_cmp(&a.score));
    evidence.truncate(MAX_EVIDENCE);
    evidence
}

/// Mean evidence score, clamped into [0, 1]. Cosine scores can be negative.
pub fn average_score(evidence: &[RetrievalResult]) -> f32 {
    if evidence.is_empty() {
        return 0.0;
    }
    let mean = evidence.iter().map(|e| e.score).sum::<f32>() / evidence.len() as f32;
    mean.clamp(0.0, 1.0)
}

pub fn grounding_block(evidence: &[RetrievalResult]) -> String {
    if evidence.is_empty() {
        return NO_SOURCES.to_string();
    }
    evidence
        .iter()
        .enumerate()
        .map(|(i, e)| format!("PLACE {}: {} ({:.3}) – {}", i + 1, e.name, e.score, e.excerpt))
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_prompt(grounding: &str, query: &str) -> String {
    let instruction = if grounding == NO_SOURCES {
        "There are no sources for this message. Reply conversationally and briefly."
    } else {
        "Answer strictly from the sources below. Do not invent facts that are not in them."
    };
    format!(
        "You are a friendly local guide.\n{instruction}\n\n\
         SOURCES:\n{grounding}\n\n\
         QUESTION: {query}\n\n\
         Respond with a JSON object: {{\"answer\": \"...\", \"sources\": [\"<place id or name>\"], \"confidence\": 0.0}}"
    )
}

fn fallback_answer(evidence: Vec<RetrievalResult>) -> ComposedAnswer {
    let answer = if evidence.is_empty() {
        GREETING_ANSWER
    } else {
        UNSYNTHESIZED_ANSWER
    };
    ComposedAnswer {
        answer: answer.to_string(),
        sources: evidence.into_iter().map(Source::Evidence).collect(),
        confidence: FALLBACK_CONFIDENCE,
    }
}

/// Maps a model citation onto retained evidence by id or name.
fn resolve_source(cited: &Value, evidence: &[RetrievalResult]) -> Source {
    let label = match cited {
        Value::String(s) => s.trim().to_string(),
        Value::Object(map) => map
            .get("id")
            .or_else(|| map.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| cited.to_string()),
        other => other.to_string(),
    };
    evidence
        .iter()
        .find(|e| e.id == label || e.name.eq_ignore_ascii_case(&label))
        .cloned()
        .map(Source::Evidence)
        .unwrap_or(Source::Cited(label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GuideError, GuideResult};
    use crate::orchestrator::plan::{Step, Tool};
    use crate::retrieval::Provenance;
    use async_trait::async_trait;

    struct Canned(Option<&'static str>);

    #[async_trait]
    impl Generator for Canned {
        async fn generate(&self, _p: &str, _m: u32, _t: f32) -> GuideResult<String> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| GuideError::provider("composer", "down"))
        }
    }

    fn result(id: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            id: id.to_string(),
            name: id.to_uppercase(),
            excerpt: format!("about {}", id),
            category: "place".to_string(),
            location: None,
            image_url: None,
            score,
            provenance: Provenance::Local,
            images: vec![],
        }
    }

    fn retrieved(items: Vec<RetrievalResult>) -> ExecutionRecord {
        ExecutionRecord {
            step: Step::new(Tool::Retrieve, "q"),
            result: StepOutput::Retrieved(items),
        }
    }

    fn composer(out: Option<&'static str>) -> AnswerComposer {
        AnswerComposer::new(Arc::new(Canned(out)), Duration::from_secs(5))
    }

    #[test]
    fn evidence_is_sorted_and_capped() {
        let records = vec![
            retrieved(vec![result("a", 0.2), result("b", 0.9), result("c", 0.5)]),
            ExecutionRecord {
                step: Step::new(Tool::Summarize, "x"),
                result: StepOutput::error("nope"),
            },
            retrieved(vec![result("d", 0.7), result("e", 0.1), result("f", 0.6)]),
        ];
        let ev = collect_evidence(&records);
        let ids: Vec<_> = ev.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "f", "c", "a"]);
    }

    #[test]
    fn grounding_block_format() {
        assert_eq!(grounding_block(&[]), NO_SOURCES);
        assert_eq!(
            grounding_block(&[result("marina", 0.91234)]),
            "PLACE 1: MARINA (0.912) – about marina"
        );
    }

    #[tokio::test]
    async fn backfills_sources_and_confidence() {
        let c = composer(Some(r#"{"answer": "Marina is a beach."}"#));
        let out = c.compose(&[retrieved(vec![result("m", 0.8), result("n", 0.4)])], "q").await;
        assert_eq!(out.answer, "Marina is a beach.");
        assert_eq!(out.sources.len(), 2);
        assert!((out.confidence - 0.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn negative_scores_backfill_zero_confidence() {
        let c = composer(Some(r#"{"answer": "x"}"#));
        let out = c.compose(&[retrieved(vec![result("far", -0.4)])], "q").await;
        assert_eq!(out.answer, "x");
        assert_eq!(out.sources.len(), 1);
        assert_eq!(out.confidence, 0.0);
    }

    #[tokio::test]
    async fn model_confidence_is_clamped() {
        let c = composer(Some(r#"{"answer": "x", "confidence": 1.7}"#));
        let out = c.compose(&[retrieved(vec![result("m", 0.8)])], "q").await;
        assert_eq!(out.confidence, 1.0);
    }

    #[tokio::test]
    async fn citations_resolve_to_evidence() {
        let c = composer(Some(r#"{"answer": "ok", "sources": ["m", "Somewhere else"], "confidence": 0.9}"#));
        let out = c.compose(&[retrieved(vec![result("m", 0.8)])], "q").await;
        assert!(matches!(&out.sources[0], Source::Evidence(e) if e.id == "m"));
        assert_eq!(out.sources[1], Source::Cited("Somewhere else".into()));
        assert!((out.confidence - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn unparsable_output_falls_back() {
        let with_sources = composer(Some("I cannot do JSON today"))
            .compose(&[retrieved(vec![result("m", 0.8)])], "q")
            .await;
        assert_eq!(with_sources.answer, UNSYNTHESIZED_ANSWER);
        assert_eq!(with_sources.sources.len(), 1);
        assert_eq!(with_sources.confidence, FALLBACK_CONFIDENCE);

        let greeting = composer(None).compose(&[], "hi").await;
        assert_eq!(greeting.answer, GREETING_ANSWER);
        assert!(greeting.sources.is_empty());
        assert_eq!(greeting.confidence, FALLBACK_CONFIDENCE);
    }

    #[tokio::test]
    async fn chit_chat_without_confidence_scores_zero() {
        let out = composer(Some(r#"{"answer": "Hi there!"}"#)).compose(&[], "hi").await;
        assert_eq!(out.answer, "Hi there!");
        assert!(out.sources.is_empty());
        assert_eq!(out.confidence, 0.0);
    }
}
