//! Conversation layer: routing, fallback ladder, sessions and the chat turn.

pub mod orchestrator;
pub mod router;
pub mod service;
pub mod session;
pub mod strategy;

pub use orchestrator::{contextualize, Orchestrator};
pub use router::{Route, Router};
pub use service::{ChatRequest, ChatResponse, ChatService};
pub use session::{ChatMessage, MemorySessionStore, Session, SessionStore};
pub use strategy::{AnswerStrategy, ApologyStrategy, DirectStrategy, RagStrategy, Turn};
