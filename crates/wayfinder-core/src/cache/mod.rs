//! Process-wide caches: content-addressed embeddings and TTL-bound audio files.

mod audio;
mod embedding;

pub use audio::{audio_key, AudioCache, SpeechRecord};
pub use embedding::{content_key, EmbeddingCache};
