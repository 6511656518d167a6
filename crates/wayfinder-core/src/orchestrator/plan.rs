//! Plans: the closed tool vocabulary, steps, and the validation gate every
//! generated plan passes before it may run.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Summarize input that stands for "everything retrieved so far".
pub const RETRIEVED_CONTEXT: &str = "retrieved context";

static DESTRUCTIVE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)\b(delete|drop|shutdown|rm -rf)\b").ok());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Retrieve,
    Summarize,
    Translate,
    Tts,
    Recommend,
    Caption,
    Embed,
}

impl Tool {
    pub const ALL: [Tool; 7] = [
        Tool::Retrieve,
        Tool::Summarize,
        Tool::Translate,
        Tool::Tts,
        Tool::Recommend,
        Tool::Caption,
        Tool::Embed,
    ];

    /// Case-insensitive; `None` for names outside the vocabulary.
    pub fn parse(name: &str) -> Option<Tool> {
        let name = name.trim();
        Tool::ALL.into_iter().find(|t| t.as_str().eq_ignore_ascii_case(name))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Retrieve => "retrieve",
            Tool::Summarize => "summarize",
            Tool::Translate => "translate",
            Tool::Tts => "tts",
            Tool::Recommend => "recommend",
            Tool::Caption => "caption",
            Tool::Embed => "embed",
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub tool: Tool,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Step {
    pub fn new(tool: Tool, input: &str) -> Self {
        Self {
            tool,
            input: input.to_string(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
    }

    /// Positive integer parameter; numeric strings are accepted.
    pub fn param_usize(&self, key: &str) -> Option<usize> {
        let value = match self.params.get(key)? {
            Value::Number(n) => n.as_u64().map(|v| v as usize),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        value.filter(|v| *v > 0)
    }

    pub fn wants_retrieved_context(&self) -> bool {
        self.tool == Tool::Summarize && self.input.trim().eq_ignore_ascii_case(RETRIEVED_CONTEXT)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Step>,
}

impl Plan {
    /// The chit-chat plan.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Retrieve the top 3 for the raw query, then summarize what came back.
    pub fn fallback(query: &str) -> Self {
        Self {
            steps: vec![
                Step::new(Tool::Retrieve, query).with_param("k", 3),
                Step::new(Tool::Summarize, RETRIEVED_CONTEXT),
            ],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

/// Why a generated plan was refused.
#[derive(Debug, Error)]
pub enum PlanRejection {
    #[error("no JSON object in model output")]
    NoJson,

    #[error("plan is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("plan has no steps array")]
    MissingSteps,

    #[error("step {0} is not an object with a tool name")]
    MalformedStep(usize),

    #[error("tool not allowed: {0}")]
    ToolNotAllowed(String),

    #[error("step {0} parameters match a destructive pattern")]
    UnsafeParams(usize),

    #[error("planner unavailable: {0}")]
    Provider(#[from] crate::error::GuideError),
}

/// True if the serialized parameters mention a destructive operation.
/// Fails closed if the pattern is unavailable.
pub fn is_destructive(params: &Map<String, Value>) -> bool {
    let serialized = Value::Object(params.clone()).to_string();
    DESTRUCTIVE.as_ref().map_or(true, |re| re.is_match(&serialized))
}

/// Parses and validates a plan object: a `steps` array whose tools are all
/// allow-listed and whose parameters are all safe. An empty array is valid.
pub fn validate_plan(raw: &str) -> Result<Plan, PlanRejection> {
    let value: Value = serde_json::from_str(raw)?;
    let steps = value
        .get("steps")
        .and_then(Value::as_array)
        .ok_or(PlanRejection::MissingSteps)?;

    let mut plan = Plan::default();
    for (idx, raw_step) in steps.iter().enumerate() {
        let obj = raw_step.as_object().ok_or(PlanRejection::MalformedStep(idx))?;
        let name = obj
            .get("tool")
            .and_then(Value::as_str)
            .ok_or(PlanRejection::MalformedStep(idx))?;
        let tool = Tool::parse(name).ok_or_else(|| PlanRejection::ToolNotAllowed(name.to_string()))?;

        let params = match obj.get("params") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => return Err(PlanRejection::MalformedStep(idx)),
        };
        if is_destructive(&params) {
            return Err(PlanRejection::UnsafeParams(idx));
        }

        let input = match obj.get("input") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };
        plan.steps.push(Step { tool, input, params });
    }
    Ok(plan)
}
