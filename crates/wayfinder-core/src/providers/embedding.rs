//! Embedding providers: OpenAI-compatible HTTP endpoint and a local hashing
//! embedder that runs on the blocking pool.

use super::Embedder;
use crate::error::{GuideError, GuideResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A synchronous (CPU-bound) embedder. Wrap in [`BlockingEmbedder`] so calls
/// never stall the async runtime.
pub trait SyncEmbedder: Send + Sync + 'static {
    fn embed_sync(&self, text: &str) -> GuideResult<Vec<f32>>;

    fn name(&self) -> &str;
}

/// Off-loads a [`SyncEmbedder`] to tokio's bounded blocking pool.
pub struct BlockingEmbedder<E> {
    inner: Arc<E>,
}

impl<E: SyncEmbedder> BlockingEmbedder<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }
}

#[async_trait]
impl<E: SyncEmbedder> Embedder for BlockingEmbedder<E> {
    async fn embed(&self, text: &str) -> GuideResult<Vec<f32>> {
        let inner = Arc::clone(&self.inner);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || inner.embed_sync(&text))
            .await
            .map_err(|e| GuideError::provider("embedder", format!("worker failed: {}", e)))?
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Deterministic feature-hashing embedder. Terms are hashed (FNV-1a) into a
/// fixed number of buckets, weighted by frequency and L2-normalized.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(term: &str, dims: usize) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h as usize) % dims
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|s| s.len() >= 2)
            .map(|s| s.to_lowercase())
            .collect()
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let tokens = Self::tokenize(text);
        let mut vec = vec![0.0f32; self.dimensions];
        if tokens.is_empty() {
            return vec;
        }

        let mut tf: HashMap<&str, f32> = HashMap::new();
        for tok in &tokens {
            *tf.entry(tok.as_str()).or_default() += 1.0;
        }

        let total = tokens.len() as f32;
        for (term, count) in tf {
            // Longer terms carry more signal than short function words.
            let weight = 1.0 + (term.len() as f32).ln();
            vec[Self::bucket(term, self.dimensions)] += (count / total) * weight;
        }

        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }
}

impl SyncEmbedder for HashingEmbedder {
    fn embed_sync(&self, text: &str) -> GuideResult<Vec<f32>> {
        Ok(self.vector(text))
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// OpenAI-compatible `/embeddings` client. Key: `EMBEDDING_API_KEY`.
pub struct HttpEmbedder {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl HttpEmbedder {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            client,
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> GuideResult<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);
        let mut req = self.client.post(&url).json(&EmbeddingRequest {
            model: &self.model,
            input: text,
        });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            return Err(GuideError::provider(
                "embeddings",
                format!("API error {}", res.status()),
            ));
        }
        let parsed: EmbeddingResponse = res.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| GuideError::provider("embeddings", "empty embedding response"))
    }

    fn name(&self) -> &str {
        "http"
    }
}
