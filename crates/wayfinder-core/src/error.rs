//! Error types for the Wayfinder core.

use thiserror::Error;

/// Result type alias for core operations.
pub type GuideResult<T> = Result<T, GuideError>;

/// Errors raised inside the core. Degradation boundaries (planner, executor,
/// retriever fallback, composer, orchestrator) turn these into fallbacks.
#[derive(Error, Debug)]
pub enum GuideError {
    #[error("Provider error ({provider}): {message}")]
    Provider { provider: &'static str, message: String },

    #[error("Provider timed out ({provider}) after {secs}s")]
    Timeout { provider: &'static str, secs: u64 },

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("Encyclopedia error: {0}")]
    Encyclopedia(String),

    #[error("Ambiguous encyclopedia title: {0}")]
    Disambiguation(String),

    #[error("No encyclopedia page for: {0}")]
    PageNotFound(String),

    #[error("Corpus error: {0}")]
    Corpus(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GuideError {
    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        GuideError::Provider {
            provider,
            message: message.into(),
        }
    }
}
