//! Wayfinder configuration loaded from TOML and environment.
//!
//! Precedence: env `WAYFINDER_CONFIG` path > `config/wayfinder.toml` > defaults, then
//! `WAYFINDER__*` environment overrides. API keys are never read from the file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/wayfinder";

/// Runtime configuration for the gateway and the core services it wires up.
///
/// | Key | Default | Description |
/// |-----|---------|-------------|
/// | port | 5001 | Gateway HTTP port. |
/// | corpus_path | ./data/places.json | JSON seed for the place corpus. |
/// | storage_path | (unset) | Sled directory; when set the corpus is served from sled. |
/// | audio_dir | system temp dir | Where synthesized audio files are written. |
/// | provider_timeout_secs | 60 | Upper bound for every provider call. |
/// | audio_ttl_secs | 21600 | Audio cache entry lifetime (6 h). |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuideConfig {
    pub bind_address: String,
    pub port: u16,
    pub corpus_path: String,
    #[serde(default)]
    pub storage_path: Option<String>,
    #[serde(default)]
    pub audio_dir: Option<String>,
    pub openrouter_base_url: String,
    pub openrouter_model: String,
    /// OpenAI-compatible embeddings endpoint. Unset → local hashing embedder.
    #[serde(default)]
    pub embedding_base_url: Option<String>,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub tts_base_url: String,
    pub tts_model: String,
    pub provider_timeout_secs: u64,
    pub embedding_cache_capacity: u64,
    pub audio_ttl_secs: u64,
    pub session_idle_ttl_secs: u64,
    pub max_sessions: usize,
}

impl Default for GuideConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5001,
            corpus_path: "./data/places.json".to_string(),
            storage_path: None,
            audio_dir: None,
            openrouter_base_url: "https://openrouter.ai/api/v1".to_string(),
            openrouter_model: "meta-llama/llama-3.3-70b-instruct".to_string(),
            embedding_base_url: None,
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: 384,
            tts_base_url: "https://api.openai.com/v1".to_string(),
            tts_model: "tts-1".to_string(),
            provider_timeout_secs: 60,
            embedding_cache_capacity: 10_000,
            audio_ttl_secs: 6 * 60 * 60,
            session_idle_ttl_secs: 2 * 60 * 60,
            max_sessions: 10_000,
        }
    }
}

impl GuideConfig {
    /// Load config from file and environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("WAYFINDER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let d = Self::default();
        let builder = config::Config::builder()
            .set_default("bind_address", d.bind_address)?
            .set_default("port", d.port as i64)?
            .set_default("corpus_path", d.corpus_path)?
            .set_default("openrouter_base_url", d.openrouter_base_url)?
            .set_default("openrouter_model", d.openrouter_model)?
            .set_default("embedding_model", d.embedding_model)?
            .set_default("embedding_dimensions", d.embedding_dimensions as i64)?
            .set_default("tts_base_url", d.tts_base_url)?
            .set_default("tts_model", d.tts_model)?
            .set_default("provider_timeout_secs", d.provider_timeout_secs as i64)?
            .set_default("embedding_cache_capacity", d.embedding_cache_capacity as i64)?
            .set_default("audio_ttl_secs", d.audio_ttl_secs as i64)?
            .set_default("session_idle_ttl_secs", d.session_idle_ttl_secs as i64)?
            .set_default("max_sessions", d.max_sessions as i64)?;

        // config::File::with_name resolves the extension (wayfinder.toml).
        let builder = if Path::new(&config_path).exists()
            || Path::new(&format!("{}.toml", config_path)).exists()
        {
            builder.add_source(config::File::with_name(&config_path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("WAYFINDER").separator("__"))
            .build()?;

        built.try_deserialize()
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn audio_ttl(&self) -> Duration {
        Duration::from_secs(self.audio_ttl_secs)
    }

    pub fn session_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.session_idle_ttl_secs)
    }

    /// Directory for synthesized audio; falls back to the system temp dir.
    pub fn audio_dir(&self) -> std::path::PathBuf {
        self.audio_dir
            .as_ref()
            .map(std::path::PathBuf::from)
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// Reads a non-empty, trimmed environment variable.
pub fn env_opt_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = GuideConfig::default();
        assert_eq!(c.port, 5001);
        assert_eq!(c.provider_timeout(), Duration::from_secs(60));
        assert_eq!(c.audio_ttl(), Duration::from_secs(21_600));
        assert!(c.embedding_base_url.is_none());
    }

    #[test]
    fn audio_dir_falls_back_to_temp() {
        let c = GuideConfig::default();
        assert_eq!(c.audio_dir(), std::env::temp_dir());
    }
}
