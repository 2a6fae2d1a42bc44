//! Ways to answer a turn, tried in order by the orchestrator.

use std::sync::Arc;

use async_trait::async_trait;
use sciqa_answer::{GenerationRequest, LanguageModel, Synthesizer};
use sciqa_core::types::{AnswerResult, HistoryTurn, Outcome};
use sciqa_core::{Error, Result};
use sciqa_hybrid::HybridRetriever;

/// A question with its context prefix applied, plus the recent history.
#[derive(Debug, Clone, Default)]
pub struct Turn {
    pub question: String,
    pub history: Vec<HistoryTurn>,
}

#[async_trait]
pub trait AnswerStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn answer(&self, turn: &Turn) -> Result<AnswerResult>;
}

/// Retrieve from the corpus, then synthesize a cited answer.
pub struct RagStrategy {
    retriever: Arc<HybridRetriever>,
    synthesizer: Arc<Synthesizer>,
    k: usize,
}

impl RagStrategy {
    pub fn new(retriever: Arc<HybridRetriever>, synthesizer: Arc<Synthesizer>) -> Self {
        let k = retriever.default_k();
        Self { retriever, synthesizer, k }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }
}

#[async_trait]
impl AnswerStrategy for RagStrategy {
    fn name(&self) -> &'static str {
        "rag"
    }

    async fn answer(&self, turn: &Turn) -> Result<AnswerResult> {
        let docs = self.retriever.retrieve(&turn.question, self.k).await?;
        self.synthesizer.synthesize(&turn.question, &docs).await
    }
}

pub const DIRECT_SYSTEM_PROMPT: &str = "You are a Space Biology Research Assistant. You help researchers with questions about space biology, including effects of microgravity, space radiation, life support systems, and biological experiments in space.
Answer from your general scientific knowledge. Provide complete but concise answers in markdown. Do not invent citations or URLs.";

/// Confidence reported for uncited answers from general knowledge.
pub const DIRECT_CONFIDENCE: u8 = 85;

/// Uncited answer from the model's general knowledge.
pub struct DirectStrategy {
    llm: Arc<dyn LanguageModel>,
}

impl DirectStrategy {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl AnswerStrategy for DirectStrategy {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn answer(&self, turn: &Turn) -> Result<AnswerResult> {
        let request = GenerationRequest {
            system: Some(DIRECT_SYSTEM_PROMPT.to_string()),
            history: turn.history.clone(),
            prompt: turn.question.clone(),
            ..Default::default()
        };
        let text = self.llm.generate(&request).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::llm(self.llm.name(), "empty direct answer"));
        }
        let mut result = AnswerResult::bare(text, Outcome::DirectKnowledge);
        result.confidence_score = DIRECT_CONFIDENCE;
        Ok(result)
    }
}

pub const APOLOGY_ANSWER: &str =
    "I apologize, but I'm having trouble generating a response right now. Please try again later.";

/// Last rung: always answers, with nothing cited.
pub struct ApologyStrategy;

#[async_trait]
impl AnswerStrategy for ApologyStrategy {
    fn name(&self) -> &'static str {
        "apology"
    }

    async fn answer(&self, _turn: &Turn) -> Result<AnswerResult> {
        Ok(AnswerResult::bare(APOLOGY_ANSWER, Outcome::Unavailable))
    }
}
