//! Request orchestration: plan, execute, compose.
//!
//! `handle` runs one request end to end under the conversation's session
//! lock: user turn, plan, steps in order, composed answer, assistant turn.
//! Speech for the answer is produced after the lock is released.

mod composer;
mod executor;
mod json;
mod plan;
mod planner;

pub use composer::{
    average_score, collect_evidence, grounding_block, AnswerComposer, ComposedAnswer, Source,
    GREETING_ANSWER, MAX_EVIDENCE, NO_SOURCES, UNSYNTHESIZED_ANSWER,
};
pub use executor::{ExecutionRecord, StepExecutor, StepOutput, SummaryRecord, NOT_IMPLEMENTED};
pub use json::extract_first_json_object;
pub use plan::{is_destructive, validate_plan, Plan, PlanRejection, Step, Tool, RETRIEVED_CONTEXT};
pub use planner::PlanGenerator;

use crate::error::GuideResult;
use crate::retrieval::RetrievalResult;
use crate::session::{Role, SessionStore};
use crate::speech::{SpeechService, DEFAULT_FORMAT, DEFAULT_STYLE, DEFAULT_VOICE};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const APOLOGY: &str = "Sorry, an error occurred on my end.";

/// What a request returns to the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalResponse {
    pub answer: String,
    pub sources: Vec<Source>,
    pub confidence: f32,
    pub audio_url: Option<String>,
    pub plan: Option<Plan>,
    pub execution: Vec<ExecutionRecord>,
}

impl FinalResponse {
    /// Fixed response for failures nothing else caught.
    pub fn apology() -> Self {
        Self {
            answer: APOLOGY.to_string(),
            sources: Vec::new(),
            confidence: 0.0,
            audio_url: None,
            plan: None,
            execution: Vec::new(),
        }
    }
}

/// Explicit id, else `user:<user id>`, else `user:anon`.
pub fn resolve_conversation_id(user_id: Option<&str>, conversation_id: Option<&str>) -> String {
    let non_blank = |s: Option<&str>| s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
    non_blank(conversation_id)
        .unwrap_or_else(|| format!("user:{}", non_blank(user_id).unwrap_or_else(|| "anon".to_string())))
}

pub struct Orchestrator {
    sessions: Arc<SessionStore>,
    planner: PlanGenerator,
    executor: StepExecutor,
    composer: AnswerComposer,
    speech: Arc<SpeechService>,
}

impl Orchestrator {
    pub fn new(
        sessions: Arc<SessionStore>,
        planner: PlanGenerator,
        executor: StepExecutor,
        composer: AnswerComposer,
        speech: Arc<SpeechService>,
    ) -> Self {
        Self {
            sessions,
            planner,
            executor,
            composer,
            speech,
        }
    }

    /// Runs one request; any error becomes [`FinalResponse::apology`].
    pub async fn handle(&self, query: &str, user_id: Option<&str>, conversation_id: Option<&str>) -> FinalResponse {
        let conversation = resolve_conversation_id(user_id, conversation_id);
        match self.run(query, &conversation).await {
            Ok(response) => response,
            Err(e) => {
                error!(conversation = %conversation, error = %e, "request failed");
                FinalResponse::apology()
            }
        }
    }

    /// Like [`handle`](Self::handle) but on its own task, so a panic anywhere
    /// in the pipeline also ends in the apology.
    pub async fn handle_guarded(
        self: Arc<Self>,
        query: String,
        user_id: Option<String>,
        conversation_id: Option<String>,
    ) -> FinalResponse {
        let task = tokio::spawn(async move {
            self.handle(&query, user_id.as_deref(), conversation_id.as_deref()).await
        });
        match task.await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "request task aborted");
                FinalResponse::apology()
            }
        }
    }

    async fn run(&self, query: &str, conversation: &str) -> GuideResult<FinalResponse> {
        let mut session = self.sessions.acquire(conversation).await;
        session.push(Role::User, query);
        let history = session.history();

        let plan = self.planner.generate_plan(query, &history).await;
        let mut execution: Vec<ExecutionRecord> = Vec::with_capacity(plan.len());
        if plan.is_empty() {
            info!(conversation, "chit-chat; skipping execution");
        } else {
            let mut retrieved: Vec<RetrievalResult> = Vec::new();
            let mut failed = 0usize;
            for planned in &plan.steps {
                let mut step = planned.clone();
                if step.wants_retrieved_context() {
                    step.input = serde_json::to_string(&retrieved)?;
                }
                let result = self.executor.execute_step(&step).await;
                if result.is_error() {
                    failed += 1;
                }
                match &result {
                    StepOutput::Retrieved(items) => retrieved.extend(items.iter().cloned()),
                    StepOutput::Embedding { embedding } => session.set_embedding(embedding.clone()),
                    _ => {}
                }
                execution.push(ExecutionRecord { step, result });
            }
            info!(conversation, steps = execution.len(), failed, "plan executed");
        }

        let composed = self.composer.compose(&execution, query).await;
        session.push(Role::Assistant, &composed.answer);
        drop(session);

        let audio_url = match speech_from_trace(&execution) {
            Some(url) => Some(url),
            None if !composed.answer.trim().is_empty() => self.speak_answer(&composed.answer).await,
            None => None,
        };

        Ok(FinalResponse {
            answer: composed.answer,
            sources: composed.sources,
            confidence: composed.confidence,
            audio_url,
            plan: Some(plan),
            execution,
        })
    }

    async fn speak_answer(&self, answer: &str) -> Option<String> {
        match self.speech.speak(answer, DEFAULT_VOICE, DEFAULT_STYLE, DEFAULT_FORMAT).await {
            Ok(record) => Some(record.audio_url),
            Err(e) => {
                warn!(error = %e, "answer speech failed; continuing without audio");
                None
            }
        }
    }
}

/// Audio URL from the last successful tts step, if any.
fn speech_from_trace(execution: &[ExecutionRecord]) -> Option<String> {
    execution.iter().rev().find_map(|r| match &r.result {
        StepOutput::Speech(record) => Some(record.audio_url.clone()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_id_resolution() {
        assert_eq!(resolve_conversation_id(Some("u1"), Some("c1")), "c1");
        assert_eq!(resolve_conversation_id(Some("u1"), None), "user:u1");
        assert_eq!(resolve_conversation_id(Some("u1"), Some("  ")), "user:u1");
        assert_eq!(resolve_conversation_id(None, None), "user:anon");
    }

    #[test]
    fn apology_is_empty_and_zero() {
        let r = FinalResponse::apology();
        assert_eq!(r.answer, APOLOGY);
        assert!(r.sources.is_empty());
        assert_eq!(r.confidence, 0.0);
        assert!(r.audio_url.is_none() && r.plan.is_none() && r.execution.is_empty());
    }
}
