//! Hybrid retrieval: content and relation similarity over the corpus index,
//! with an encyclopedia fallback when local evidence is weak or sparse.

mod fallback;
mod similarity;

pub use fallback::{pick_image, EncyclopediaFallback};
pub use similarity::cosine;

use crate::cache::EmbeddingCache;
use crate::error::GuideResult;
use crate::knowledge::{CorpusIndex, KnowledgeEntry, Location};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub const MAIN_WEIGHT: f32 = 0.7;
pub const RELATION_WEIGHT: f32 = 0.3;
/// Below this best local score the fallback is consulted.
pub const CONFIDENCE_THRESHOLD: f32 = 0.65;
pub const EXTERNAL_SCORE: f32 = 0.5;
pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Local,
    External,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub id: String,
    pub name: String,
    pub excerpt: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub score: f32,
    pub provenance: Provenance,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl RetrievalResult {
    fn local(entry: &KnowledgeEntry, score: f32) -> Self {
        Self {
            id: entry.id.clone(),
            name: entry.name.clone(),
            excerpt: entry.body.clone(),
            category: entry.category.clone(),
            location: entry.location.clone(),
            image_url: entry.image_url.clone(),
            score,
            provenance: Provenance::Local,
            images: Vec::new(),
        }
    }
}

/// `0.7 * main + 0.3 * relation`.
pub fn hybrid_score(query: &[f32], entry: &KnowledgeEntry) -> f32 {
    MAIN_WEIGHT * cosine(query, &entry.embedding) + RELATION_WEIGHT * cosine(query, &entry.relation_embedding)
}

/// Top `k` entries by hybrid score, highest first, ties in corpus order.
/// Also returns the best score over the whole corpus.
pub fn rank<'a>(query: &[f32], entries: &'a [KnowledgeEntry], k: usize) -> (Vec<(f32, &'a KnowledgeEntry)>, f32) {
    let mut scored: Vec<(usize, f32)> = entries
        .iter()
        .enumerate()
        .map(|(pos, entry)| (pos, hybrid_score(query, entry)))
        .collect();
    let best = scored.iter().map(|(_, s)| *s).fold(f32::NEG_INFINITY, f32::max);
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    let top = scored
        .into_iter()
        .take(k)
        .map(|(pos, score)| (score, &entries[pos]))
        .collect();
    (top, if best.is_finite() { best } else { 0.0 })
}

pub struct HybridRetriever {
    index: Arc<CorpusIndex>,
    embeddings: Arc<EmbeddingCache>,
    fallback: Option<EncyclopediaFallback>,
}

impl HybridRetriever {
    pub fn new(index: Arc<CorpusIndex>, embeddings: Arc<EmbeddingCache>) -> Self {
        Self {
            index,
            embeddings,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: EncyclopediaFallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Ranks the corpus against `query`. When `allow_fallback` is set and the
    /// best local score is under the threshold (or fewer than `k` local
    /// results exist), one external result is appended if the lookup succeeds.
    pub async fn retrieve(&self, query: &str, k: usize, allow_fallback: bool) -> GuideResult<Vec<RetrievalResult>> {
        let query_vec = self.embeddings.embed(query).await?;
        let snapshot = self.index.ensure_built().await;

        let (top, best) = rank(&query_vec, &snapshot.entries, k);
        let mut results: Vec<RetrievalResult> = top
            .into_iter()
            .map(|(score, entry)| RetrievalResult::local(entry, score))
            .collect();
        debug!(query, local = results.len(), best, "local retrieval");

        let weak = best < CONFIDENCE_THRESHOLD || results.len() < k;
        if allow_fallback && weak {
            if let Some(fallback) = &self.fallback {
                info!(query, best, "local evidence weak; consulting encyclopedia");
                if let Some(external) = fallback.lookup(query).await {
                    results.push(external);
                }
            }
        }
        Ok(results)
    }
}
