//! Decides whether a question needs the corpus or can be answered directly.

use std::sync::Arc;

use sciqa_answer::{GenerationRequest, LanguageModel};
use sciqa_core::types::HistoryTurn;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Retrieve from the corpus and answer with citations.
    Search,
    /// Answer from general knowledge.
    Direct,
}

const ROUTER_PROMPT: &str = "You route questions for a space biology research assistant backed by a corpus of peer-reviewed publications.

Reply SEARCH when the question needs specific research findings, experimental data, methods, organisms or studies, or citations from published work.
Reply DIRECT for general scientific concepts, basic definitions, general space exploration or NASA history, and follow-ups already answered in the conversation.

Reply with exactly one word: SEARCH or DIRECT.";

/// Reply text to a route. Anything other than a clear `DIRECT` searches.
pub fn parse_route(reply: &str) -> Route {
    let reply = reply.trim().to_ascii_uppercase();
    if reply.contains("DIRECT") && !reply.contains("SEARCH") {
        Route::Direct
    } else {
        Route::Search
    }
}

pub struct Router {
    llm: Arc<dyn LanguageModel>,
}

impl Router {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    pub async fn route(&self, question: &str, history: &[HistoryTurn]) -> Route {
        let request = GenerationRequest {
            system: Some(ROUTER_PROMPT.to_string()),
            history: history.to_vec(),
            prompt: question.to_string(),
            max_output_tokens: Some(8),
            temperature: Some(0.0),
        };
        match self.llm.generate(&request).await {
            Ok(reply) => {
                let route = parse_route(&reply);
                debug!(?route, reply = %reply.trim(), "routed question");
                route
            }
            Err(e) => {
                warn!(kind = ?e.kind(), error = %e, "router failed, searching");
                Route::Search
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_a_clear_direct_skips_search() {
        assert_eq!(parse_route("DIRECT"), Route::Direct);
        assert_eq!(parse_route(" direct.\n"), Route::Direct);
        assert_eq!(parse_route("SEARCH"), Route::Search);
        assert_eq!(parse_route("DIRECT or SEARCH"), Route::Search);
        assert_eq!(parse_route("maybe"), Route::Search);
        assert_eq!(parse_route(""), Route::Search);
    }
}
