//! Audio cache: (text, voice, style, format) → synthesized file, valid until expiry.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where a synthesized utterance lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechRecord {
    pub audio_file: String,
    pub audio_url: String,
    pub voice: String,
    pub style: String,
}

#[derive(Debug, Clone)]
struct AudioEntry {
    record: SpeechRecord,
    expires_at: DateTime<Utc>,
}

/// Hex blake3 digest of `text|voice|style|format`.
pub fn audio_key(text: &str, voice: &str, style: &str, format: &str) -> String {
    blake3::hash(format!("{}|{}|{}|{}", text, voice, style, format).as_bytes())
        .to_hex()
        .to_string()
}

pub struct AudioCache {
    entries: DashMap<String, AudioEntry>,
    ttl: chrono::Duration,
}

impl AudioCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(6)),
        }
    }

    /// Returns the record for `key` unless it has expired. Expired entries are
    /// dropped on the way out.
    pub fn get(&self, key: &str) -> Option<SpeechRecord> {
        let now = Utc::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Some(entry.record.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, e| e.expires_at <= now);
        }
        None
    }

    pub fn insert(&self, key: String, record: SpeechRecord) {
        let expires_at = Utc::now() + self.ttl;
        self.insert_expiring(key, record, expires_at);
    }

    pub(crate) fn insert_expiring(&self, key: String, record: SpeechRecord, expires_at: DateTime<Utc>) {
        self.entries.insert(key, AudioEntry { record, expires_at });
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drops every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> SpeechRecord {
        SpeechRecord {
            audio_file: format!("/tmp/{}.mp3", name),
            audio_url: format!("/static/{}.mp3", name),
            voice: "female_en_in".to_string(),
            style: "neutral".to_string(),
        }
    }

    #[test]
    fn key_depends_on_voice_style_and_format() {
        let a = audio_key("hello", "v1", "neutral", "mp3");
        assert_ne!(a, audio_key("hello", "v2", "neutral", "mp3"));
        assert_ne!(a, audio_key("hello", "v1", "cheerful", "mp3"));
        assert_ne!(a, audio_key("hello", "v1", "neutral", "wav"));
        assert_eq!(a, audio_key("hello", "v1", "neutral", "mp3"));
    }

    #[test]
    fn fresh_entry_hits() {
        let cache = AudioCache::new(Duration::from_secs(60));
        cache.insert("k".to_string(), record("a"));
        assert_eq!(cache.get("k"), Some(record("a")));
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let cache = AudioCache::new(Duration::from_secs(60));
        cache.insert_expiring(
            "k".to_string(),
            record("a"),
            Utc::now() - chrono::Duration::seconds(1),
        );
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn purge_removes_only_expired() {
        let cache = AudioCache::new(Duration::from_secs(60));
        cache.insert("live".to_string(), record("live"));
        cache.insert_expiring(
            "old".to_string(),
            record("old"),
            Utc::now() - chrono::Duration::minutes(5),
        );
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("live").is_some());
    }
}
