//! Conversation sessions behind an injectable store.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sciqa_core::config::SessionSettings;
use sciqa_core::types::{AnswerResult, HistoryTurn, Role};
use sciqa_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_response: Option<AnswerResult>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), rag_response: None, timestamp: Utc::now() }
    }

    pub fn assistant(result: AnswerResult) -> Self {
        Self {
            role: Role::Assistant,
            content: result.answer_markdown.clone(),
            rag_response: Some(result),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    pub messages: Vec<ChatMessage>,
    pub context: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn history(&self) -> Vec<HistoryTurn> {
        self.messages
            .iter()
            .map(|m| HistoryTurn { role: m.role, content: m.content.clone() })
            .collect()
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, context: Map<String, Value>) -> Session;
    /// A live session; reading it counts as access.
    async fn get(&self, id: &str) -> Option<Session>;
    async fn append(&self, id: &str, message: ChatMessage) -> Result<()>;
    async fn update_context(&self, id: &str, context: Map<String, Value>) -> Result<Session>;
    async fn delete(&self, id: &str) -> bool;
    async fn len(&self) -> usize;
}

struct Entry {
    session: Session,
    last_access: Instant,
}

/// Sessions in process memory. Entries expire `ttl` after their last access;
/// when full, creating a session evicts the least recently used one.
pub struct MemorySessionStore {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self { ttl, capacity: capacity.max(1), entries: Mutex::new(HashMap::new()) }
    }

    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self::new(Duration::from_secs(settings.ttl_secs), settings.max_sessions)
    }

    fn purge_expired(&self, entries: &mut HashMap<String, Entry>, now: Instant) {
        let before = entries.len();
        entries.retain(|_, e| now.duration_since(e.last_access) < self.ttl);
        let expired = before - entries.len();
        if expired > 0 {
            debug!(expired, "expired sessions");
        }
    }

    fn live<'a>(&self, entries: &'a mut HashMap<String, Entry>, id: &str) -> Option<&'a mut Entry> {
        let now = Instant::now();
        self.purge_expired(entries, now);
        let entry = entries.get_mut(id)?;
        entry.last_access = now;
        Some(entry)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, context: Map<String, Value>) -> Session {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        self.purge_expired(&mut entries, now);
        while entries.len() >= self.capacity {
            let Some(oldest) = entries.iter().min_by_key(|(_, e)| e.last_access).map(|(id, _)| id.clone()) else {
                break;
            };
            debug!(session = %oldest, "evicting least recently used session");
            entries.remove(&oldest);
        }
        let session = Session {
            id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
            context,
            created_at: Utc::now(),
        };
        entries.insert(session.id.clone(), Entry { session: session.clone(), last_access: now });
        session
    }

    async fn get(&self, id: &str) -> Option<Session> {
        let mut entries = self.entries.lock().await;
        self.live(&mut entries, id).map(|e| e.session.clone())
    }

    async fn append(&self, id: &str, message: ChatMessage) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let entry = self.live(&mut entries, id).ok_or_else(|| Error::NotFound(format!("session {id}")))?;
        entry.session.messages.push(message);
        Ok(())
    }

    async fn update_context(&self, id: &str, context: Map<String, Value>) -> Result<Session> {
        let mut entries = self.entries.lock().await;
        let entry = self.live(&mut entries, id).ok_or_else(|| Error::NotFound(format!("session {id}")))?;
        entry.session.context.extend(context);
        Ok(entry.session.clone())
    }

    async fn delete(&self, id: &str) -> bool {
        self.entries.lock().await.remove(id).is_some()
    }

    async fn len(&self) -> usize {
        let mut entries = self.entries.lock().await;
        self.purge_expired(&mut entries, Instant::now());
        entries.len()
    }
}
