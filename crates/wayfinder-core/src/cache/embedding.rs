//! Content-addressed embedding cache.
//!
//! Keys are blake3 hashes of the input text; values are the provider's vectors.
//! Bounded with TinyLFU admission and a 1 hour idle TTL. Concurrent misses for
//! the same text are coalesced into one provider call.

use crate::error::{GuideError, GuideResult};
use crate::providers::{bounded, Embedder};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const IDLE_TTL: Duration = Duration::from_secs(3600);

/// Hex blake3 digest of `text`.
pub fn content_key(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

pub struct EmbeddingCache {
    provider: Arc<dyn Embedder>,
    cache: Cache<String, Arc<Vec<f32>>>,
    timeout: Duration,
}

impl EmbeddingCache {
    pub fn new(provider: Arc<dyn Embedder>, max_entries: u64, timeout: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_idle(IDLE_TTL)
            .build();
        Self {
            provider,
            cache,
            timeout,
        }
    }

    /// Embeds `text`, calling the provider only on a cache miss.
    pub async fn embed(&self, text: &str) -> GuideResult<Vec<f32>> {
        let key = content_key(text);
        if let Some(hit) = self.cache.get(&key).await {
            debug!(key = %&key[..12], "embedding cache hit");
            return Ok(hit.as_ref().clone());
        }

        let provider = Arc::clone(&self.provider);
        let timeout = self.timeout;
        let owned = text.to_string();
        let vector = self
            .cache
            .try_get_with(key, async move {
                bounded("embedder", timeout, provider.embed(&owned))
                    .await
                    .map(Arc::new)
            })
            .await
            .map_err(|shared| match Arc::try_unwrap(shared) {
                Ok(err) => err,
                Err(shared) => GuideError::provider("embedder", shared.to_string()),
            })?;
        Ok(vector.as_ref().clone())
    }

    /// Cached vector for `text` without calling the provider.
    pub async fn peek(&self, text: &str) -> Option<Vec<f32>> {
        self.cache
            .get(&content_key(text))
            .await
            .map(|v| v.as_ref().clone())
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }
}
