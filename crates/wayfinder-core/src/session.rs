//! Per-conversation session store.
//!
//! Sessions live in a `DashMap` keyed by conversation id. Each one sits behind
//! its own async mutex: a request holds the guard from its user turn to its
//! assistant turn, so requests on the same conversation run one at a time.
//! Idle sessions are evicted after a TTL and the map is capped.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Turns kept per conversation; older ones are dropped first.
pub const MAX_SESSION_TURNS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ConversationSession {
    id: String,
    turns: VecDeque<Turn>,
    embedding: Option<Vec<f32>>,
}

impl ConversationSession {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            turns: VecDeque::with_capacity(MAX_SESSION_TURNS + 1),
            embedding: None,
        }
    }

    pub fn push(&mut self, role: Role, text: &str) {
        self.turns.push_back(Turn {
            role,
            text: text.to_string(),
            timestamp: Utc::now(),
        });
        while self.turns.len() > MAX_SESSION_TURNS {
            self.turns.pop_front();
        }
        debug!(conversation = %self.id, turns = self.turns.len(), "turn recorded");
    }

    /// Oldest first.
    pub fn history(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref()
    }

    pub fn set_embedding(&mut self, embedding: Vec<f32>) {
        self.embedding = Some(embedding);
    }
}

struct SessionSlot {
    session: Arc<Mutex<ConversationSession>>,
    touched: DateTime<Utc>,
}

/// Per-conversation sessions. `max_sessions` is a soft cap: a session that
/// is currently held is never evicted, so while every session is in use the
/// store grows past the cap until one is released.
pub struct SessionStore {
    sessions: DashMap<String, SessionSlot>,
    max_sessions: usize,
    idle_ttl: chrono::Duration,
}

impl SessionStore {
    pub fn new(max_sessions: usize, idle_ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            max_sessions: max_sessions.max(1),
            idle_ttl: chrono::Duration::from_std(idle_ttl).unwrap_or_else(|_| chrono::Duration::hours(2)),
        }
    }

    /// Locks the session for `conversation_id`, creating it on first use.
    /// Hold the guard for as long as the conversation must not interleave.
    pub async fn acquire(&self, conversation_id: &str) -> OwnedMutexGuard<ConversationSession> {
        if !self.sessions.contains_key(conversation_id) && self.sessions.len() >= self.max_sessions {
            self.make_room();
        }
        let session = {
            let mut slot = self
                .sessions
                .entry(conversation_id.to_string())
                .or_insert_with(|| SessionSlot {
                    session: Arc::new(Mutex::new(ConversationSession::new(conversation_id))),
                    touched: Utc::now(),
                });
            slot.touched = Utc::now();
            Arc::clone(&slot.session)
        };
        session.lock_owned().await
    }

    pub async fn history(&self, conversation_id: &str) -> Vec<Turn> {
        match self.sessions.get(conversation_id).map(|s| Arc::clone(&s.session)) {
            Some(session) => session.lock().await.history(),
            None => Vec::new(),
        }
    }

    /// Drops sessions idle longer than the TTL that nobody currently holds.
    pub fn evict_idle(&self) -> usize {
        let cutoff = Utc::now() - self.idle_ttl;
        let before = self.sessions.len();
        self.sessions
            .retain(|_, slot| slot.touched > cutoff || Arc::strong_count(&slot.session) > 1);
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            debug!(evicted, "evicted idle sessions");
        }
        evicted
    }

    /// Frees one slot if any session is idle or unheld. Returns false when
    /// nothing could be evicted.
    fn make_room(&self) -> bool {
        if self.evict_idle() > 0 && self.sessions.len() < self.max_sessions {
            return true;
        }
        let oldest = self
            .sessions
            .iter()
            .filter(|e| Arc::strong_count(&e.session) == 1)
            .min_by_key(|e| e.touched)
            .map(|e| e.key().clone());
        match oldest {
            Some(id) => {
                debug!(conversation = %id, "session cap reached; evicting least recently used");
                self.sessions.remove(&id);
                true
            }
            None => {
                warn!(
                    sessions = self.sessions.len(),
                    cap = self.max_sessions,
                    "session cap reached but every session is in use; exceeding cap"
                );
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.sessions.contains_key(conversation_id)
    }
}
