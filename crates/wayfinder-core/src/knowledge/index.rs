//! The embedded corpus index.
//!
//! Readers take an `Arc` snapshot and score against it without holding any
//! lock. A refresh builds a complete new snapshot and swaps it in.

use super::{content_text, relation_text, CorpusSource, KnowledgeEntry};
use crate::cache::EmbeddingCache;
use crate::error::GuideResult;
use chrono::{DateTime, Utc};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct CorpusSnapshot {
    pub entries: Vec<KnowledgeEntry>,
    pub built_at: Option<DateTime<Utc>>,
}

impl CorpusSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct CorpusIndex {
    source: Arc<dyn CorpusSource>,
    embeddings: Arc<EmbeddingCache>,
    current: RwLock<Arc<CorpusSnapshot>>,
    rebuild: tokio::sync::Mutex<()>,
}

impl CorpusIndex {
    pub fn new(source: Arc<dyn CorpusSource>, embeddings: Arc<EmbeddingCache>) -> Self {
        Self {
            source,
            embeddings,
            current: RwLock::new(Arc::new(CorpusSnapshot::default())),
            rebuild: tokio::sync::Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<CorpusSnapshot> {
        Arc::clone(&*self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Rebuilds the whole index from the source. Entries whose embeddings
    /// cannot be computed are left out. Returns the new entry count.
    pub async fn refresh(&self) -> GuideResult<usize> {
        let _rebuilding = self.rebuild.lock().await;
        self.rebuild_locked().await
    }

    /// Caller holds `self.rebuild`.
    async fn rebuild_locked(&self) -> GuideResult<usize> {
        let records = self.source.load().await?;
        let total = records.len();

        let mut entries = Vec::with_capacity(total);
        for record in &records {
            let id = record.resolved_id();
            let main = self.embeddings.embed(&content_text(record)).await;
            let rel = self
                .embeddings
                .embed(&relation_text(&id, record.category.as_deref(), &record.related))
                .await;
            match (main, rel) {
                (Ok(main), Ok(rel)) if !main.is_empty() && !rel.is_empty() => {
                    entries.push(KnowledgeEntry::from_record(record, main, rel));
                }
                (Err(e), _) | (_, Err(e)) => {
                    warn!(entry = %id, error = %e, "skipping entry: embedding failed");
                }
                _ => warn!(entry = %id, "skipping entry: empty embedding"),
            }
        }

        let count = entries.len();
        let snapshot = Arc::new(CorpusSnapshot {
            entries,
            built_at: Some(Utc::now()),
        });
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
        info!(
            source = %self.source.describe(),
            embedder = self.embeddings.provider_name(),
            indexed = count,
            skipped = total - count,
            "corpus index rebuilt"
        );
        Ok(count)
    }

    /// Current snapshot, rebuilding once first if the index is empty.
    /// Concurrent callers that find it empty share a single rebuild.
    pub async fn ensure_built(&self) -> Arc<CorpusSnapshot> {
        let snapshot = self.snapshot();
        if !snapshot.is_empty() {
            return snapshot;
        }
        let _rebuilding = self.rebuild.lock().await;
        let snapshot = self.snapshot();
        if !snapshot.is_empty() {
            return snapshot;
        }
        info!("corpus index empty; reseeding from source");
        if let Err(e) = self.rebuild_locked().await {
            warn!(error = %e, "corpus reseed failed");
        }
        self.snapshot()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}
