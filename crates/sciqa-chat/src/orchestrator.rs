use std::sync::Arc;

use sciqa_answer::{LanguageModel, Synthesizer};
use sciqa_core::types::{AnswerResult, HistoryTurn};
use sciqa_hybrid::HybridRetriever;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::router::{Route, Router};
use crate::strategy::{AnswerStrategy, ApologyStrategy, DirectStrategy, RagStrategy, Turn};

pub const DEFAULT_HISTORY_WINDOW: usize = 5;

/// `[Focus: f] [Context: organism] question`, each prefix only when set.
pub fn contextualize(question: &str, context: &Map<String, Value>) -> String {
    let value = |key: &str| {
        context
            .get(key)
            .and_then(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
    };
    let mut out = question.to_string();
    if let Some(organism) = value("organism") {
        out = format!("[Context: {organism}] {out}");
    }
    if let Some(focus) = value("focus") {
        out = format!("[Focus: {focus}] {out}");
    }
    out
}

/// The last `window` turns of `history`.
pub fn recent(history: &[HistoryTurn], window: usize) -> &[HistoryTurn] {
    &history[history.len().saturating_sub(window)..]
}

/// Routes a turn and walks its fallback ladder until a strategy answers.
pub struct Orchestrator {
    router: Option<Router>,
    rag: Arc<dyn AnswerStrategy>,
    direct: Arc<dyn AnswerStrategy>,
    apology: Arc<dyn AnswerStrategy>,
    history_window: usize,
}

impl Orchestrator {
    pub fn new(rag: Arc<dyn AnswerStrategy>, direct: Arc<dyn AnswerStrategy>) -> Self {
        Self {
            router: None,
            rag,
            direct,
            apology: Arc::new(ApologyStrategy),
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }

    /// Retrieval-augmented strategy plus a direct strategy and router sharing one model.
    pub fn with_model(
        llm: Arc<dyn LanguageModel>,
        retriever: Arc<HybridRetriever>,
        synthesizer: Arc<Synthesizer>,
    ) -> Self {
        Self::new(Arc::new(RagStrategy::new(retriever, synthesizer)), Arc::new(DirectStrategy::new(Arc::clone(&llm))))
            .with_router(Router::new(llm))
    }

    pub fn with_router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    fn ladder(&self, route: Route) -> Vec<&Arc<dyn AnswerStrategy>> {
        match route {
            Route::Search => vec![&self.rag, &self.direct, &self.apology],
            Route::Direct => vec![&self.direct, &self.apology],
        }
    }

    /// Always produces an answer; strategy failures are logged and the next rung tried.
    pub async fn answer(&self, question: &str, context: &Map<String, Value>, history: &[HistoryTurn]) -> AnswerResult {
        let turn = Turn {
            question: contextualize(question, context),
            history: recent(history, self.history_window).to_vec(),
        };
        let route = match &self.router {
            Some(router) => router.route(&turn.question, &turn.history).await,
            None => Route::Search,
        };

        for strategy in self.ladder(route) {
            match strategy.answer(&turn).await {
                Ok(result) => {
                    info!(?route, strategy = strategy.name(), outcome = ?result.outcome, "answered turn");
                    return result;
                }
                Err(e) => warn!(strategy = strategy.name(), kind = ?e.kind(), error = %e, "strategy failed"),
            }
        }
        AnswerResult::bare(crate::strategy::APOLOGY_ANSWER, sciqa_core::types::Outcome::Unavailable)
    }
}
