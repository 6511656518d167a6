//! Speech output: synthesizes text to an audio file in the audio directory and
//! remembers it for the cache TTL.

use crate::cache::{audio_key, AudioCache, SpeechRecord};
use crate::error::{GuideError, GuideResult};
use crate::providers::{bounded, SpeechSynthesizer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_VOICE: &str = "female_en_in";
pub const DEFAULT_STYLE: &str = "neutral";
pub const DEFAULT_FORMAT: &str = "mp3";

/// Length of the key prefix used as the audio file stem.
const FILE_STEM_LEN: usize = 12;

pub struct SpeechService {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    cache: Arc<AudioCache>,
    audio_dir: PathBuf,
    timeout: Duration,
}

impl SpeechService {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        cache: Arc<AudioCache>,
        audio_dir: PathBuf,
        timeout: Duration,
    ) -> Self {
        Self {
            synthesizer,
            cache,
            audio_dir,
            timeout,
        }
    }

    /// Returns the cached record for (text, voice, style, format) if still
    /// valid and its file is present; otherwise synthesizes and writes a new
    /// file. `format` doubles as the file extension, so it must be a short
    /// alphanumeric token.
    pub async fn speak(
        &self,
        text: &str,
        voice: &str,
        style: &str,
        format: &str,
    ) -> GuideResult<SpeechRecord> {
        if !is_extension(format) {
            return Err(GuideError::provider("tts", format!("invalid audio format: {:?}", format)));
        }
        let key = audio_key(text, voice, style, format);
        if let Some(record) = self.cache.get(&key) {
            if tokio::fs::try_exists(&record.audio_file).await.unwrap_or(false) {
                debug!(audio = %record.audio_url, "audio cache hit");
                return Ok(record);
            }
            self.cache.remove(&key);
        }

        let audio = bounded(
            "tts",
            self.timeout,
            self.synthesizer.synthesize(text, voice, format),
        )
        .await?;
        if audio.is_empty() {
            return Err(GuideError::provider("tts", "synthesizer returned no audio"));
        }

        let filename = format!("{}.{}", &key[..FILE_STEM_LEN], format);
        let path = self.audio_dir.join(&filename);
        tokio::fs::create_dir_all(&self.audio_dir).await?;
        tokio::fs::write(&path, &audio).await?;

        let record = SpeechRecord {
            audio_file: path.to_string_lossy().into_owned(),
            audio_url: format!("/static/{}", filename),
            voice: voice.to_string(),
            style: style.to_string(),
        };
        info!(audio = %record.audio_url, bytes = audio.len(), "synthesized speech");
        self.cache.insert(key, record.clone());
        Ok(record)
    }
}

fn is_extension(format: &str) -> bool {
    !format.is_empty() && format.len() <= 8 && format.bytes().all(|b| b.is_ascii_alphanumeric())
}
