//! Plan generation: ask the model for a tool plan, validate it, and fall
//! back to retrieve-then-summarize on any failure.

use super::json::extract_first_json_object;
use super::plan::{validate_plan, Plan, PlanRejection, Tool};
use crate::providers::{bounded, Generator};
use crate::session::Turn;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const PLAN_MAX_TOKENS: u32 = 400;
const PLAN_TEMPERATURE: f32 = 0.0;

pub struct PlanGenerator {
    generator: Arc<dyn Generator>,
    timeout: Duration,
}

impl PlanGenerator {
    pub fn new(generator: Arc<dyn Generator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// Never fails: any provider, parse or validation problem yields
    /// [`Plan::fallback`]. An empty `steps` array comes back as-is.
    pub async fn generate_plan(&self, query: &str, history: &[Turn]) -> Plan {
        match self.try_generate(query, history).await {
            Ok(plan) => {
                info!(steps = plan.len(), "plan accepted");
                plan
            }
            Err(reason) => {
                warn!(%reason, "plan rejected; using fallback plan");
                Plan::fallback(query)
            }
        }
    }

    async fn try_generate(&self, query: &str, history: &[Turn]) -> Result<Plan, PlanRejection> {
        let prompt = build_prompt(query, history);
        let raw = bounded(
            "planner",
            self.timeout,
            self.generator.generate(&prompt, PLAN_MAX_TOKENS, PLAN_TEMPERATURE),
        )
        .await?;
        debug!(raw = %raw, "planner output");
        let json = extract_first_json_object(&raw).ok_or(PlanRejection::NoJson)?;
        validate_plan(json)
    }
}

fn render_history(history: &[Turn]) -> String {
    if history.is_empty() {
        return "(none)".to_string();
    }
    history
        .iter()
        .map(|t| format!("{}: {}", t.role.as_str(), t.text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn build_prompt(query: &str, history: &[Turn]) -> String {
    let tools = Tool::ALL.iter().map(Tool::as_str).collect::<Vec<_>>().join(", ");
    format!(
        "You are a planner for a travel and place-information assistant.\n\
         Respond ONLY with a JSON object of the form {{\"steps\": [{{\"tool\": \"...\", \"input\": \"...\", \"params\": {{}}}}]}}.\n\
         Allowed tools: {tools}.\n\
         - For greetings or small talk (e.g. \"hi\", \"thanks\"), return {{\"steps\": []}}.\n\
         - For questions about places, return {{\"steps\": [{{\"tool\": \"retrieve\", \"input\": \"<the question>\", \"params\": {{\"k\": 3}}}}, \
         {{\"tool\": \"summarize\", \"input\": \"retrieved context\", \"params\": {{\"style\": \"summary\"}}}}]}}.\n\
         - Never include destructive operations.\n\n\
         Conversation so far:\n{history}\n\n\
         User: {query}\n\
         Your JSON response:",
        tools = tools,
        history = render_history(history),
        query = query,
    )
}
