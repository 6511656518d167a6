//! Corpus sources: where raw place records come from at index build.

use super::PlaceRecord;
use crate::error::{GuideError, GuideResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::warn;

const PLACE_PREFIX: &str = "place_";

#[async_trait]
pub trait CorpusSource: Send + Sync {
    /// Every record, in corpus order.
    async fn load(&self) -> GuideResult<Vec<PlaceRecord>>;

    fn describe(&self) -> String;
}

/// Fixed in-memory list.
#[derive(Debug, Clone, Default)]
pub struct StaticCorpus {
    records: Vec<PlaceRecord>,
}

impl StaticCorpus {
    pub fn new(records: Vec<PlaceRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl CorpusSource for StaticCorpus {
    async fn load(&self) -> GuideResult<Vec<PlaceRecord>> {
        Ok(self.records.clone())
    }

    fn describe(&self) -> String {
        format!("static({} records)", self.records.len())
    }
}

/// A JSON array of place records on disk, re-read on every load.
#[derive(Debug, Clone)]
pub struct JsonFileCorpus {
    path: PathBuf,
}

impl JsonFileCorpus {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

pub(crate) fn parse_records(raw: &str) -> GuideResult<Vec<PlaceRecord>> {
    serde_json::from_str::<Vec<PlaceRecord>>(raw)
        .map_err(|e| GuideError::Corpus(format!("invalid place records: {}", e)))
}

#[async_trait]
impl CorpusSource for JsonFileCorpus {
    async fn load(&self) -> GuideResult<Vec<PlaceRecord>> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            GuideError::Corpus(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        parse_records(&raw)
    }

    fn describe(&self) -> String {
        format!("json({})", self.path.display())
    }
}

/// Sled-backed catalogue. Records are JSON values under `place_<id>` keys;
/// load order is key order. Bulk reads and writes run on the blocking pool.
pub struct SledCorpus {
    db: sled::Db,
    path: PathBuf,
}

impl SledCorpus {
    pub fn open(path: impl AsRef<Path>) -> GuideResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = sled::open(&path)?;
        Ok(Self { db, path })
    }

    /// Stores `record` (id resolved from the name if absent); returns its key.
    pub fn put(&self, record: &PlaceRecord) -> GuideResult<String> {
        put_record(&self.db, record)
    }

    pub fn get(&self, id: &str) -> GuideResult<Option<PlaceRecord>> {
        let key = format!("{}{}", PLACE_PREFIX, id);
        match self.db.get(key.as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Copies every record from `source` into the store.
    pub async fn seed_from(&self, source: &dyn CorpusSource) -> GuideResult<usize> {
        let records = source.load().await?;
        let count = records.len();
        let db = self.db.clone();
        blocking(move || {
            for record in &records {
                put_record(&db, record)?;
            }
            Ok(())
        })
        .await?;
        self.db.flush_async().await?;
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.db.scan_prefix(PLACE_PREFIX.as_bytes()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CorpusSource for SledCorpus {
    async fn load(&self) -> GuideResult<Vec<PlaceRecord>> {
        let db = self.db.clone();
        blocking(move || scan_records(&db)).await
    }

    fn describe(&self) -> String {
        format!("sled({})", self.path.display())
    }
}

fn put_record(db: &sled::Db, record: &PlaceRecord) -> GuideResult<String> {
    let mut record = record.clone();
    let id = record.resolved_id();
    record.id = Some(id.clone());
    let key = format!("{}{}", PLACE_PREFIX, id);
    db.insert(key.as_bytes(), serde_json::to_vec(&record)?)?;
    Ok(key)
}

fn scan_records(db: &sled::Db) -> GuideResult<Vec<PlaceRecord>> {
    let mut records = Vec::new();
    for item in db.scan_prefix(PLACE_PREFIX.as_bytes()) {
        let (key, value) = item?;
        match serde_json::from_slice::<PlaceRecord>(&value) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                key = %String::from_utf8_lossy(&key),
                error = %e,
                "skipping unreadable place record"
            ),
        }
    }
    Ok(records)
}

async fn blocking<T, F>(work: F) -> GuideResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> GuideResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| GuideError::Corpus(format!("sled worker failed: {}", e)))?
}
