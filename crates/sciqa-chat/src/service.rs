//! One chat turn: session create-or-resume, answer, record both messages.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sciqa_core::types::AnswerResult;
use sciqa_core::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::orchestrator::Orchestrator;
use crate::session::{ChatMessage, SessionStore};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub context: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub message: String,
    pub rag_response: Option<AnswerResult>,
    pub context: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

pub struct ChatService {
    orchestrator: Arc<Orchestrator>,
    sessions: Arc<dyn SessionStore>,
}

impl ChatService {
    pub fn new(orchestrator: Arc<Orchestrator>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { orchestrator, sessions }
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// A session evicted mid-turn loses the message; the turn still completes.
    async fn record(&self, session_id: &str, message: ChatMessage) {
        if let Err(e) = self.sessions.append(session_id, message).await {
            warn!(session = %session_id, error = %e, "could not record chat message");
        }
    }

    /// Unknown or expired session ids start a fresh session with the request context.
    pub async fn handle(&self, request: ChatRequest) -> Result<ChatResponse> {
        let resumed = match request.session_id.as_deref() {
            Some(id) => self.sessions.get(id).await,
            None => None,
        };
        let session = match resumed {
            Some(session) => session,
            None => self.sessions.create(request.context).await,
        };

        let history = session.history();
        self.record(&session.id, ChatMessage::user(request.message.clone())).await;
        let result = self.orchestrator.answer(&request.message, &session.context, &history).await;
        info!(session = %session.id, turns = history.len() + 2, outcome = ?result.outcome, "chat turn");
        self.record(&session.id, ChatMessage::assistant(result.clone())).await;

        Ok(ChatResponse {
            session_id: session.id,
            message: result.answer_markdown.clone(),
            rag_response: Some(result),
            context: session.context,
            timestamp: Utc::now(),
        })
    }
}
