//! Speech synthesis backends.

use super::SpeechSynthesizer;
use crate::config::env_opt_string;
use crate::error::{GuideError, GuideResult};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Voices the `/audio/speech` endpoint accepts by name.
const API_VOICES: &[&str] = &["alloy", "ash", "coral", "echo", "fable", "nova", "onyx", "sage", "shimmer"];
/// Encodings the endpoint can return.
const API_FORMATS: &[&str] = &["mp3", "opus", "aac", "flac", "wav", "pcm"];

/// Returns empty audio so nothing plays. Used when no TTS key is configured.
#[derive(Debug, Default)]
pub struct SilentSpeech;

#[async_trait]
impl SpeechSynthesizer for SilentSpeech {
    async fn synthesize(&self, _text: &str, _voice: &str, _format: &str) -> GuideResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// OpenAI-compatible `/audio/speech` backend. Key: `TTS_API_KEY` (or `OPENROUTER_API_KEY`).
#[derive(Debug, Clone)]
pub struct OpenAiSpeech {
    base_url: String,
    api_key: String,
    model: String,
    fallback_voice: String,
    client: reqwest::Client,
}

impl OpenAiSpeech {
    /// Returns `None` when no key is available.
    pub fn from_env(base_url: &str, model: &str) -> Option<Self> {
        let key = env_opt_string("TTS_API_KEY").or_else(|| env_opt_string("OPENROUTER_API_KEY"))?;
        Some(Self::new(base_url, key, model))
    }

    pub fn new(base_url: &str, api_key: String, model: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            fallback_voice: "shimmer".to_string(),
            client,
        }
    }

    /// Requested voice when the API knows it by name, else the fallback.
    fn api_voice<'a>(&'a self, requested: &'a str) -> &'a str {
        if API_VOICES.contains(&requested) {
            requested
        } else {
            &self.fallback_voice
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeech {
    async fn synthesize(&self, text: &str, voice: &str, format: &str) -> GuideResult<Vec<u8>> {
        if !API_FORMATS.contains(&format) {
            return Err(GuideError::provider("tts", format!("unsupported audio format: {}", format)));
        }
        let url = format!("{}/audio/speech", self.base_url);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&SpeechRequest {
                model: &self.model,
                input: text,
                voice: self.api_voice(voice),
                response_format: format,
            })
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(GuideError::provider("tts", format!("API error {}: {}", status, body)));
        }
        Ok(res.bytes().await?.to_vec())
    }
}
